use std::error::Error;

use crate::structured::StructuredError;

/// An error that carries a payload of a known type.
pub trait HasPayload {
    type Payload;

    fn payload(&self) -> &Self::Payload;
}

impl<P> HasPayload for StructuredError<P> {
    type Payload = P;

    fn payload(&self) -> &P {
        StructuredError::payload(self)
    }
}

/// Catch-and-wrap for any `Result` whose error can become a cause.
pub trait ResultExt<T, E> {
    fn wrap_err<P>(self, message: impl Into<String>, payload: P) -> Result<T, StructuredError<P>>;

    /// Like [`ResultExt::wrap_err`], with message and payload computed from
    /// the caught error.
    fn wrap_err_with<P, F>(self, f: F) -> Result<T, StructuredError<P>>
    where
        F: FnOnce(&E) -> (String, P);
}

impl<T, E> ResultExt<T, E> for Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn wrap_err<P>(self, message: impl Into<String>, payload: P) -> Result<T, StructuredError<P>> {
        self.map_err(|err| StructuredError::wrap(message, payload, err))
    }

    fn wrap_err_with<P, F>(self, f: F) -> Result<T, StructuredError<P>>
    where
        F: FnOnce(&E) -> (String, P),
    {
        self.map_err(|err| {
            let (message, payload) = f(&err);
            StructuredError::wrap(message, payload, err)
        })
    }
}
