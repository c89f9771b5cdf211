//! Structured error channel.
//!
//! A [`StructuredError`] pairs a human-readable message with a caller-defined
//! payload and an optional cause. Layers that catch one either pass the same
//! instance upward or wrap it, so the payload raised at the bottom of a call
//! stack can always be recovered at the top.

pub mod payload;
pub mod report;
pub mod structured;

pub use payload::{HasPayload, ResultExt};
pub use report::ErrorReport;
pub use structured::{BoxError, Chain, SharedCause, StructuredError};
