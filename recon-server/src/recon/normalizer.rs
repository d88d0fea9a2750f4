//! Event Normalizer
//!
//! Parses an inbound webhook body of unknown/variable shape into a
//! canonical [`ShipmentEvent`] or [`RefundEvent`].
//!
//! The carrier pushes at least four distinct payload shapes for the same
//! logical event: a direct object, an array-wrapped object, an object
//! keyed by one of its own identifiers, and flat fields vs. a nested
//! `tracking_data` sub-object. [`PayloadShape`] models these explicitly;
//! the scan-all-keys branch is the last resort and is tested as such.
//!
//! Unknown extra fields are dropped, never errored on — the carrier adds
//! fields without notice. Absent fields stay `None`; nothing is defaulted
//! to a valid-looking value.

use serde_json::{Map, Value};
use thiserror::Error;

use shared::event::{RefundEvent, RefundEventKind, ShipmentEvent, TrackingScan, WebhookSource};
use shared::util::parse_carrier_datetime;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("webhook body is not a JSON object")]
    NotAnObject,

    #[error("no recognizable status field in payload")]
    MissingStatus,

    #[error("refund payload missing required field `{0}`")]
    MissingRefundField(&'static str),

    #[error("unrecognized refund event `{0}`")]
    UnknownRefundEvent(String),
}

const TRACKING_KEY: &str = "tracking_data";

/// Known carrier payload shapes, in the order they are tried
#[derive(Debug)]
enum PayloadShape<'a> {
    /// `{ "tracking_data": {...}, ... }`
    Nested {
        top: &'a Map<String, Value>,
        tracking: &'a Map<String, Value>,
    },
    /// `{ "shipment_id": "X", "X": { "tracking_data": {...} } }` —
    /// the sub-object is addressed by shipment ID, order ID, or AWB
    KeyedByIdentifier {
        top: &'a Map<String, Value>,
        inner: &'a Map<String, Value>,
        tracking: &'a Map<String, Value>,
    },
    /// Last resort: the first top-level value that is an object
    /// containing a `tracking_data` sub-object
    ScanFallback {
        top: &'a Map<String, Value>,
        inner: &'a Map<String, Value>,
        tracking: &'a Map<String, Value>,
    },
    /// Tracking fields directly at the top level
    Flat { top: &'a Map<String, Value> },
}

impl<'a> PayloadShape<'a> {
    fn classify(top: &'a Map<String, Value>) -> Self {
        if let Some(tracking) = top.get(TRACKING_KEY).and_then(Value::as_object) {
            return PayloadShape::Nested { top, tracking };
        }

        // addressed by one of the payload's own identifier fields
        for id_field in ["shipment_id", "order_id", "awb"] {
            if let Some(key) = top.get(id_field).and_then(string_value)
                && let Some(inner) = top.get(&key).and_then(Value::as_object)
                && let Some(tracking) = inner.get(TRACKING_KEY).and_then(Value::as_object)
            {
                return PayloadShape::KeyedByIdentifier { top, inner, tracking };
            }
        }

        // scan every top-level key for the first qualifying object
        for value in top.values() {
            if let Some(inner) = value.as_object()
                && let Some(tracking) = inner.get(TRACKING_KEY).and_then(Value::as_object)
            {
                return PayloadShape::ScanFallback { top, inner, tracking };
            }
        }

        PayloadShape::Flat { top }
    }

    /// Field lookup layers, most specific first
    fn layers(&self) -> Vec<&'a Map<String, Value>> {
        match *self {
            PayloadShape::Nested { top, tracking } => vec![tracking, top],
            PayloadShape::KeyedByIdentifier { top, inner, tracking }
            | PayloadShape::ScanFallback { top, inner, tracking } => vec![tracking, inner, top],
            PayloadShape::Flat { top } => vec![top],
        }
    }
}

/// Accept strings and bare numbers where the carrier flip-flops
fn string_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First match wins, closest layer first
fn str_field(layers: &[&Map<String, Value>], keys: &[&str]) -> Option<String> {
    for layer in layers {
        for key in keys {
            if let Some(v) = layer.get(*key).and_then(string_value) {
                return Some(v);
            }
        }
    }
    None
}

fn int_field(layers: &[&Map<String, Value>], keys: &[&str]) -> Option<i64> {
    for layer in layers {
        for key in keys {
            if let Some(v) = layer.get(*key).and_then(int_value) {
                return Some(v);
            }
        }
    }
    None
}

fn array_field<'a>(layers: &[&'a Map<String, Value>], keys: &[&str]) -> Option<&'a Vec<Value>> {
    for layer in layers {
        for key in keys {
            if let Some(v) = layer.get(*key).and_then(Value::as_array) {
                return Some(v);
            }
        }
    }
    None
}

/// Unwrap the array-wrapped shape: `[ { ... } ]`
fn unwrap_array(body: &Value) -> &Value {
    match body.as_array() {
        Some(arr) if arr.len() == 1 => &arr[0],
        _ => body,
    }
}

/// Non-numeric string only — numeric "labels" are status codes in disguise
fn label_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.parse::<i64>().is_ok() {
                None
            } else {
                Some(s.to_string())
            }
        }
        _ => None,
    }
}

fn label_field(layers: &[&Map<String, Value>], keys: &[&str]) -> Option<String> {
    for layer in layers {
        for key in keys {
            if let Some(v) = layer.get(*key).and_then(label_value) {
                return Some(v);
            }
        }
    }
    None
}

/// Parse a carrier shipment/return push into a canonical event.
pub fn normalize_shipment(
    source: WebhookSource,
    body: &Value,
) -> Result<ShipmentEvent, NormalizationError> {
    let body = unwrap_array(body);
    let top = body.as_object().ok_or(NormalizationError::NotAnObject)?;

    let shape = PayloadShape::classify(top);
    let mut layers = shape.layers();

    // the carrier's query API nests per-shipment fields one level deeper
    if let Some(track) = array_field(&layers, &["shipment_track"])
        && let Some(first) = track.first().and_then(Value::as_object)
    {
        layers.insert(1.min(layers.len()), first);
    }

    let status_code = int_field(
        &layers,
        &[
            "shipment_status_id",
            "current_status_id",
            "shipment_status",
            "status_code",
            "status_id",
        ],
    );
    let status_label = label_field(&layers, &["current_status", "shipment_status", "status"]);

    if status_code.is_none() && status_label.is_none() {
        return Err(NormalizationError::MissingStatus);
    }

    let timestamp = str_field(&layers, &["timestamp", "updated_date", "event_time", "date"])
        .and_then(|s| parse_carrier_datetime(&s))
        .or_else(|| int_field(&layers, &["timestamp"]));

    let scans = array_field(&layers, &["scans", "scan", "shipment_track_activities"])
        .map(|arr| arr.iter().filter_map(normalize_scan).collect())
        .unwrap_or_default();

    Ok(ShipmentEvent {
        source: Some(source),
        shipment_id: str_field(&layers, &["shipment_id", "sr_shipment_id"]),
        carrier_order_id: str_field(&layers, &["order_id", "sr_order_id"]),
        awb: str_field(&layers, &["awb", "awb_code"]),
        order_number_hint: str_field(&layers, &["channel_order_id", "order_number"]),
        status_code,
        status_label,
        timestamp,
        location: str_field(&layers, &["location", "current_location"]),
        courier_name: str_field(&layers, &["courier_name", "courier"]),
        etd: str_field(&layers, &["etd", "expected_delivery_date"]),
        scans,
    })
}

fn normalize_scan(v: &Value) -> Option<TrackingScan> {
    let obj = v.as_object()?;
    let layer = [obj];
    Some(TrackingScan {
        date: str_field(&layer, &["date", "timestamp"]),
        activity: str_field(&layer, &["activity", "sr-status-label", "status"]),
        location: str_field(&layer, &["location"]),
        status_code: int_field(&layer, &["sr-status", "status_code", "status_id"]),
    })
}

/// Parse a gateway refund push (`refund.processed` / `refund.failed`).
pub fn normalize_refund(body: &Value) -> Result<RefundEvent, NormalizationError> {
    let top = body.as_object().ok_or(NormalizationError::NotAnObject)?;

    let event = top.get("event").and_then(Value::as_str).unwrap_or_default();

    let entity = top
        .get("payload")
        .and_then(|p| p.get("refund"))
        .and_then(|r| r.get("entity"))
        .and_then(Value::as_object)
        .ok_or(NormalizationError::MissingRefundField("payload.refund.entity"))?;

    let gateway_status = entity
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let kind = match event {
        "refund.processed" => RefundEventKind::Processed,
        "refund.failed" => RefundEventKind::Failed,
        // some gateway configurations omit the event name; fall back to
        // the entity's own status
        _ => match gateway_status.as_str() {
            "processed" => RefundEventKind::Processed,
            "failed" => RefundEventKind::Failed,
            _ => {
                return Err(NormalizationError::UnknownRefundEvent(format!(
                    "{event}/{gateway_status}"
                )));
            }
        },
    };

    let refund_id = entity
        .get("id")
        .and_then(string_value)
        .ok_or(NormalizationError::MissingRefundField("id"))?;

    Ok(RefundEvent {
        kind,
        refund_id,
        payment_id: entity.get("payment_id").and_then(string_value),
        gateway_status,
        speed: entity
            .get("speed_processed")
            .or_else(|| entity.get("speed_requested"))
            .and_then(string_value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shipment(body: &Value) -> Result<ShipmentEvent, NormalizationError> {
        normalize_shipment(WebhookSource::CarrierShipment, body)
    }

    #[test]
    fn direct_flat_shape() {
        let body = json!({
            "shipment_id": "S1",
            "awb": "AWB123",
            "shipment_status_id": 7,
            "courier_name": "BlueDart",
            "scans": [
                { "date": "14 10 2025 10:00:00", "location": "Mumbai", "activity": "Delivered" }
            ],
            "some_future_field": { "the_carrier": "added this" }
        });
        let ev = shipment(&body).unwrap();
        assert_eq!(ev.shipment_id.as_deref(), Some("S1"));
        assert_eq!(ev.awb.as_deref(), Some("AWB123"));
        assert_eq!(ev.status_code, Some(7));
        assert_eq!(ev.scans.len(), 1);
        assert_eq!(ev.scans[0].location.as_deref(), Some("Mumbai"));
    }

    #[test]
    fn array_wrapped_shape() {
        let body = json!([{ "shipment_id": "S1", "shipment_status_id": 6 }]);
        let ev = shipment(&body).unwrap();
        assert_eq!(ev.status_code, Some(6));
    }

    #[test]
    fn nested_tracking_data_shape() {
        let body = json!({
            "shipment_id": "S1",
            "tracking_data": {
                "shipment_status": 18,
                "current_status": "In Transit",
                "shipment_track": [
                    { "awb_code": "AWB9", "courier_name": "Delhivery", "edd": "irrelevant" }
                ]
            }
        });
        let ev = shipment(&body).unwrap();
        assert_eq!(ev.status_code, Some(18));
        assert_eq!(ev.status_label.as_deref(), Some("In Transit"));
        // identifier pulled out of the shipment_track layer
        assert_eq!(ev.awb.as_deref(), Some("AWB9"));
        assert_eq!(ev.courier_name.as_deref(), Some("Delhivery"));
    }

    #[test]
    fn keyed_by_identifier_shape() {
        let body = json!({
            "shipment_id": "16091904",
            "16091904": {
                "tracking_data": { "shipment_status_id": 42, "current_status": "Picked Up" }
            }
        });
        let ev = shipment(&body).unwrap();
        assert_eq!(ev.status_code, Some(42));
        assert_eq!(ev.shipment_id.as_deref(), Some("16091904"));
    }

    #[test]
    fn scan_all_keys_fallback_shape() {
        // no identifier field points at the sub-object — only the
        // last-resort scan finds it
        let body = json!({
            "meta": "noise",
            "result": {
                "awb": "AWB55",
                "tracking_data": { "current_status_id": 17 }
            }
        });
        let ev = shipment(&body).unwrap();
        assert_eq!(ev.status_code, Some(17));
        assert_eq!(ev.awb.as_deref(), Some("AWB55"));
    }

    #[test]
    fn numeric_strings_and_numeric_ids_are_accepted() {
        let body = json!({ "shipment_id": 16091904, "shipment_status": "7" });
        let ev = shipment(&body).unwrap();
        assert_eq!(ev.shipment_id.as_deref(), Some("16091904"));
        assert_eq!(ev.status_code, Some(7));
        // a numeric string is a code, not a label
        assert_eq!(ev.status_label, None);
    }

    #[test]
    fn status_label_alone_is_enough() {
        // return pushes often carry only a textual status
        let body = json!({ "awb": "AWB1", "current_status": "Return Pickup Scheduled" });
        let ev = normalize_shipment(WebhookSource::CarrierReturn, &body).unwrap();
        assert_eq!(ev.status_code, None);
        assert_eq!(
            ev.status_label.as_deref(),
            Some("Return Pickup Scheduled")
        );
    }

    #[test]
    fn missing_status_is_an_error() {
        let body = json!({ "shipment_id": "S1", "awb": "AWB123" });
        assert_eq!(shipment(&body), Err(NormalizationError::MissingStatus));
        assert_eq!(shipment(&json!("text")), Err(NormalizationError::NotAnObject));
    }

    #[test]
    fn event_timestamp_parses_carrier_format() {
        let body = json!({
            "shipment_id": "S1",
            "shipment_status_id": 6,
            "updated_date": "14 10 2025 10:00:00"
        });
        let ev = shipment(&body).unwrap();
        assert!(ev.timestamp.is_some());
    }

    #[test]
    fn refund_processed_event() {
        let body = json!({
            "event": "refund.processed",
            "payload": { "refund": { "entity": {
                "id": "rfnd_9", "payment_id": "pay_4",
                "status": "processed", "speed_processed": "normal"
            }}}
        });
        let ev = normalize_refund(&body).unwrap();
        assert_eq!(ev.kind, RefundEventKind::Processed);
        assert_eq!(ev.refund_id, "rfnd_9");
        assert_eq!(ev.payment_id.as_deref(), Some("pay_4"));
        assert_eq!(ev.speed.as_deref(), Some("normal"));
    }

    #[test]
    fn refund_kind_falls_back_to_entity_status() {
        let body = json!({
            "payload": { "refund": { "entity": { "id": "rfnd_9", "status": "failed" }}}
        });
        let ev = normalize_refund(&body).unwrap();
        assert_eq!(ev.kind, RefundEventKind::Failed);
    }

    #[test]
    fn malformed_refund_payloads_are_rejected() {
        assert_eq!(
            normalize_refund(&json!({ "event": "refund.processed" })),
            Err(NormalizationError::MissingRefundField("payload.refund.entity"))
        );
        assert_eq!(
            normalize_refund(&json!({
                "payload": { "refund": { "entity": { "id": "r", "status": "queued" }}}
            })),
            Err(NormalizationError::UnknownRefundEvent("/queued".into()))
        );
    }
}
