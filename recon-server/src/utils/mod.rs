//! Utility Module
//!
//! - [`error`] - unified application error and response envelope
//! - [`logger`] - tracing subscriber setup

pub mod error;
pub mod logger;

pub use error::{AppError, AppResponse, AppResult};
pub use logger::init_logger;
