//! Status Translator
//!
//! The one canonical table mapping carrier vocabulary to our statuses.
//! Both the webhook handlers and the manual-resync path go through these
//! functions — there is deliberately no second copy anywhere.
//!
//! Both tables are total over the known code range and carry an explicit
//! `Unmapped` branch. An unmapped code still gets its tracking history
//! recorded, but the status fields are never guessed.

use shared::models::{OrderStatus, ReturnStatus, ShippingStatus};

/// Result of translating a carrier numeric shipment status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipmentTranslation {
    Mapped {
        shipping: ShippingStatus,
        order: OrderStatus,
    },
    /// Unrecognized code: record history, touch nothing else
    Unmapped,
}

/// Carrier numeric status code → canonical `(ShippingStatus, OrderStatus)`.
pub fn translate_shipment_code(code: i64) -> ShipmentTranslation {
    use OrderStatus as O;
    use ShippingStatus as S;

    let (shipping, order) = match code {
        // pre-dispatch paperwork
        1 => (S::Processing, O::Processing),  // AWB assigned
        2 => (S::Processing, O::Processing),  // label generated
        3 => (S::Processing, O::Processing),  // pickup scheduled
        4 => (S::Processing, O::Processing),  // pickup queued
        5 => (S::Processing, O::Processing),  // manifest generated
        // moving
        6 => (S::Shipped, O::Shipped),        // shipped
        18 => (S::Shipped, O::Shipped),       // in transit
        17 => (S::Shipped, O::Shipped),       // out for delivery
        38 => (S::Shipped, O::Shipped),       // reached destination hub
        42 => (S::Shipped, O::Shipped),       // picked up
        21 => (S::Shipped, O::Shipped),       // undelivered, still with courier
        22 => (S::Shipped, O::Shipped),       // delayed
        // done
        7 => (S::Delivered, O::Delivered),
        // dead ends
        8 => (S::Cancelled, O::Cancelled),    // cancelled
        9 => (S::Cancelled, O::Cancelled),    // RTO initiated
        10 => (S::Cancelled, O::Cancelled),   // RTO delivered
        12 => (S::Cancelled, O::Cancelled),   // lost
        25 => (S::Cancelled, O::Cancelled),   // destroyed
        // pickup-side hiccups, order keeps processing
        13 => (S::Processing, O::Processing), // pickup error
        15 => (S::Processing, O::Processing), // pickup rescheduled
        19 => (S::Processing, O::Processing), // out for pickup
        20 => (S::Processing, O::Processing), // pickup exception
        _ => return ShipmentTranslation::Unmapped,
    };
    ShipmentTranslation::Mapped { shipping, order }
}

/// Result of translating a carrier return status string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTranslation {
    Mapped(ReturnStatus),
    Unmapped,
}

/// Carrier return status string → canonical `ReturnStatus`
/// (case-insensitive).
///
/// "delivered" on a return shipment means delivered back to us —
/// that is the `received` trigger the refund orchestrator fires on.
pub fn translate_return_label(label: &str) -> ReturnTranslation {
    use ReturnStatus as R;

    let status = match label.trim().to_lowercase().as_str() {
        "return pickup scheduled" | "pickup scheduled" | "return pickup queued"
        | "pickup generated" => R::PickupScheduled,
        "picked up" | "return picked up" | "pickup done" => R::PickedUp,
        "in transit" | "return in transit" | "out for delivery" => R::InTransit,
        "delivered" | "return delivered" | "delivered to origin" => R::Received,
        "cancelled" | "canceled" | "return cancelled" => R::Cancelled,
        "pickup failed" | "return pickup failed" | "pickup error" | "pickup exception" => {
            R::PickupFailed
        }
        _ => return ReturnTranslation::Unmapped,
    };
    ReturnTranslation::Mapped(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivered_code_maps_to_both_statuses() {
        assert_eq!(
            translate_shipment_code(7),
            ShipmentTranslation::Mapped {
                shipping: ShippingStatus::Delivered,
                order: OrderStatus::Delivered,
            }
        );
    }

    #[test]
    fn transit_family_maps_to_shipped() {
        for code in [6, 17, 18, 38, 42] {
            assert_eq!(
                translate_shipment_code(code),
                ShipmentTranslation::Mapped {
                    shipping: ShippingStatus::Shipped,
                    order: OrderStatus::Shipped,
                },
                "code {code}"
            );
        }
    }

    #[test]
    fn rto_and_loss_map_to_cancelled() {
        for code in [8, 9, 10, 12, 25] {
            assert!(matches!(
                translate_shipment_code(code),
                ShipmentTranslation::Mapped {
                    order: OrderStatus::Cancelled,
                    ..
                }
            ));
        }
    }

    #[test]
    fn unknown_codes_are_never_guessed() {
        assert_eq!(translate_shipment_code(0), ShipmentTranslation::Unmapped);
        assert_eq!(translate_shipment_code(999), ShipmentTranslation::Unmapped);
        assert_eq!(translate_shipment_code(-3), ShipmentTranslation::Unmapped);
    }

    #[test]
    fn return_labels_are_case_insensitive() {
        assert_eq!(
            translate_return_label("Return Pickup Scheduled"),
            ReturnTranslation::Mapped(ReturnStatus::PickupScheduled)
        );
        assert_eq!(
            translate_return_label("DELIVERED"),
            ReturnTranslation::Mapped(ReturnStatus::Received)
        );
        assert_eq!(
            translate_return_label("pickup failed"),
            ReturnTranslation::Mapped(ReturnStatus::PickupFailed)
        );
    }

    #[test]
    fn unknown_return_labels_are_unmapped() {
        assert_eq!(
            translate_return_label("Handed To Alien Overlords"),
            ReturnTranslation::Unmapped
        );
    }
}
