//! Serialisable snapshot of a structured error for structured logs.

use std::fmt;

use serde::Serialize;

use crate::structured::StructuredError;

#[derive(Debug, Serialize)]
pub struct ErrorReport<'a, P> {
    pub message: &'a str,
    pub payload: &'a P,
    /// Display text of every cause, nearest first.
    pub causes: Vec<String>,
}

impl<P: fmt::Debug + 'static> StructuredError<P> {
    pub fn report(&self) -> ErrorReport<'_, P> {
        ErrorReport {
            message: self.message(),
            payload: self.payload(),
            causes: self.chain().skip(1).map(|cause| cause.to_string()).collect(),
        }
    }
}

impl<P: Serialize> ErrorReport<'_, P> {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
