use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A cause shared between every clone of the error that wraps it.
pub type SharedCause = Arc<dyn Error + Send + Sync + 'static>;

/// An error pairing a display message with an inspectable payload, optionally
/// raised in response to another error.
///
/// The payload is held behind an [`Arc`] and is never copied once raised,
/// including when the error is cloned or wrapped. Nothing on this type takes
/// `&mut self`.
///
/// The default payload type is [`serde_json::Value`] for callers that want an
/// untyped key-value payload. Collaborators with an agreed schema use their
/// own payload type instead.
#[derive(Debug)]
pub struct StructuredError<P = Value> {
    message: String,
    payload: Arc<P>,
    cause: Option<SharedCause>,
}

impl<P> StructuredError<P> {
    /// Raise a new error. The message is not validated; pass something a
    /// human can read.
    pub fn new(message: impl Into<String>, payload: P) -> Self {
        Self::from_shared(message, Arc::new(payload))
    }

    /// Raise a new error around a payload the caller keeps a handle to.
    pub fn from_shared(message: impl Into<String>, payload: Arc<P>) -> Self {
        Self {
            message: message.into(),
            payload,
            cause: None,
        }
    }

    /// Raise a new error in response to `cause`.
    pub fn wrap<E>(message: impl Into<String>, payload: P, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap_shared(message, Arc::new(payload), Arc::new(cause))
    }

    pub fn wrap_shared(message: impl Into<String>, payload: Arc<P>, cause: SharedCause) -> Self {
        Self {
            message: message.into(),
            payload,
            cause: Some(cause),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Another handle to the payload allocation this error was raised with.
    pub fn shared_payload(&self) -> Arc<P> {
        Arc::clone(&self.payload)
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn shared_cause(&self) -> Option<SharedCause> {
        self.cause.clone()
    }

    pub fn has_cause(&self) -> bool {
        self.cause.is_some()
    }

    /// True when both errors point at the same payload allocation.
    pub fn same_payload(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    pub fn payload_eq(&self, other: &Self) -> bool
    where
        P: PartialEq,
    {
        *self.payload == *other.payload
    }

    pub fn into_parts(self) -> (String, Arc<P>, Option<SharedCause>) {
        (self.message, self.payload, self.cause)
    }
}

impl<P: fmt::Debug + 'static> StructuredError<P> {
    /// This error followed by each successive `source()`.
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }

    pub fn root_cause(&self) -> &(dyn Error + 'static) {
        let mut root: &(dyn Error + 'static) = self;
        for err in self.chain() {
            root = err;
        }
        root
    }

    /// First `StructuredError<Q>` in the chain, starting with `self`.
    pub fn find_error<Q: fmt::Debug + 'static>(&self) -> Option<&StructuredError<Q>> {
        self.chain()
            .find_map(|err| err.downcast_ref::<StructuredError<Q>>())
    }

    /// Payload of the first `StructuredError<Q>` in the chain.
    pub fn find_payload<Q: fmt::Debug + 'static>(&self) -> Option<&Q> {
        self.find_error::<Q>().map(StructuredError::payload)
    }
}

impl<P> Clone for StructuredError<P> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            payload: Arc::clone(&self.payload),
            cause: self.cause.clone(),
        }
    }
}

impl<P> fmt::Display for StructuredError<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if f.alternate() {
            let mut next = self
                .cause
                .as_deref()
                .map(|cause| cause as &(dyn Error + 'static));
            while let Some(cause) = next {
                write!(f, ": {cause}")?;
                next = cause.source();
            }
        }
        Ok(())
    }
}

impl<P: fmt::Debug> Error for StructuredError<P> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Iterator over an error and its sources.
pub struct Chain<'a> {
    next: Option<&'a (dyn Error + 'static)>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a (dyn Error + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.source();
        Some(current)
    }
}
