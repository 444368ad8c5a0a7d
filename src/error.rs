//! Crate-wide error type and status translation.

use crate::metadata::Metadata;
use crate::status::{Status, StatusError};

use std::error::Error as StdError;

/// Errors produced while driving a call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A remote status, or a local failure expressed as one.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// An operation was attempted in a state that does not allow it.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// A failure reported by the call transport.
    #[error("transport failure: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl Error {
    /// Wrap any transport failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Error::Transport(err.into())
    }

    /// Translate into the status error reported by blocking calls.
    ///
    /// The first error in the cause chain that carries a status is reused
    /// verbatim. Otherwise the result is `UNKNOWN` with `self` as the cause.
    pub fn into_status_error(self) -> StatusError {
        if let Error::Status(err) = self {
            return err;
        }
        if let Some(err) = find_status(&self) {
            return err.clone();
        }
        Status::unknown("unexpected exception")
            .with_cause(self)
            .into_error(Metadata::new())
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Status(status.into())
    }
}

/// Walk the cause chain looking for an error that carries a status.
pub(crate) fn find_status<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a StatusError> {
    let mut cause = Some(err);
    while let Some(err) = cause {
        if let Some(status) = err.downcast_ref::<StatusError>() {
            return Some(status);
        }
        if let Some(Error::Status(status)) = err.downcast_ref::<Error>() {
            return Some(status);
        }
        cause = err.source();
    }
    None
}
