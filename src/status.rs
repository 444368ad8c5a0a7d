//! gRPC status codes and the error form of a remote status.

use crate::metadata::Metadata;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// gRPC status codes (different from HTTP status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    /// The operation completed successfully.
    Ok = 0,
    /// The operation was cancelled.
    Cancelled = 1,
    /// Unknown error.
    Unknown = 2,
    /// Invalid argument was provided.
    InvalidArgument = 3,
    /// Deadline expired before operation could complete.
    DeadlineExceeded = 4,
    /// Requested entity was not found.
    NotFound = 5,
    /// Entity already exists.
    AlreadyExists = 6,
    /// Permission denied.
    PermissionDenied = 7,
    /// Resource has been exhausted.
    ResourceExhausted = 8,
    /// Operation was rejected because the system is not in a state required for execution.
    FailedPrecondition = 9,
    /// Operation was aborted.
    Aborted = 10,
    /// Operation was attempted past the valid range.
    OutOfRange = 11,
    /// Operation is not implemented or supported.
    Unimplemented = 12,
    /// Internal error.
    Internal = 13,
    /// Service is currently unavailable.
    Unavailable = 14,
    /// Unrecoverable data loss or corruption.
    DataLoss = 15,
    /// Request does not have valid authentication credentials.
    Unauthenticated = 16,
}

impl Code {
    /// Create a Code from its numeric value.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// Get the numeric value of this code.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check if this is a successful status.
    pub fn is_ok(self) -> bool {
        self == Code::Ok
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        };
        write!(f, "{}", name)
    }
}

/// Shared, type-erased cause attached to a [`Status`].
type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// gRPC status of a finished (or failed) call.
///
/// A status is the terminal signal of every call, for success as well as
/// failure. It may carry a cause, which is exposed as the error source.
#[derive(Clone)]
pub struct Status {
    code: Code,
    description: Option<String>,
    cause: Option<Cause>,
}

impl Status {
    /// Create a new status.
    pub fn new(code: Code, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
            cause: None,
        }
    }

    /// Create an OK status.
    pub fn ok() -> Self {
        Self::from_code(Code::Ok)
    }

    /// Create a status from just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            description: None,
            cause: None,
        }
    }

    /// Get the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the cause, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Check if this is a successful status.
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// Replace the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Convert into an error carrying the given trailing metadata.
    pub fn into_error(self, trailers: Metadata) -> StatusError {
        StatusError::new(self, trailers)
    }

    /// Create a cancelled status.
    pub fn cancelled(description: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, description)
    }

    /// Create an unknown error status.
    pub fn unknown(description: impl Into<String>) -> Self {
        Self::new(Code::Unknown, description)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded(description: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, description)
    }

    /// Create an internal error status.
    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(Code::Internal, description)
    }

    /// Create an unavailable status.
    pub fn unavailable(description: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, description)
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Status")
            .field("code", &self.code)
            .field("description", &self.description)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(description) = &self.description {
            write!(f, ": {}", description)?;
        }
        Ok(())
    }
}

impl StdError for Status {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

/// A [`Status`] together with the trailing metadata of the call.
///
/// This is the error value that "carries a remote status": error translation
/// reuses it verbatim whenever it appears in a cause chain.
#[derive(Debug, Clone)]
pub struct StatusError {
    status: Status,
    trailers: Metadata,
}

impl StatusError {
    pub fn new(status: Status, trailers: Metadata) -> Self {
        Self { status, trailers }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn code(&self) -> Code {
        self.status.code()
    }

    pub fn description(&self) -> Option<&str> {
        self.status.description()
    }

    pub fn trailers(&self) -> &Metadata {
        &self.trailers
    }

    pub fn into_parts(self) -> (Status, Metadata) {
        (self.status, self.trailers)
    }
}

impl From<Status> for StatusError {
    fn from(status: Status) -> Self {
        Self::new(status, Metadata::new())
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.status.fmt(f)
    }
}

impl StdError for StatusError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.status.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for i in 0..=16 {
            let code = Code::from_u32(i);
            assert_eq!(code.as_u32(), i);
        }
    }

    #[test]
    fn test_code_from_u32_unknown() {
        // Values > 16 should return Unknown
        assert_eq!(Code::from_u32(17), Code::Unknown);
        assert_eq!(Code::from_u32(u32::MAX), Code::Unknown);
    }

    #[test]
    fn test_code_display() {
        assert_eq!(format!("{}", Code::Ok), "OK");
        assert_eq!(format!("{}", Code::Cancelled), "CANCELLED");
        assert_eq!(format!("{}", Code::Internal), "INTERNAL");
        assert_eq!(format!("{}", Code::Unavailable), "UNAVAILABLE");
        assert_eq!(
            format!("{}", Code::FailedPrecondition),
            "FAILED_PRECONDITION"
        );
    }

    #[test]
    fn test_status_ok() {
        let status = Status::ok();
        assert!(status.is_ok());
        assert_eq!(status.code(), Code::Ok);
        assert!(status.description().is_none());
        assert!(status.cause().is_none());
    }

    #[test]
    fn test_status_with_description() {
        let status = Status::from_code(Code::Unavailable).with_description("down");
        assert!(!status.is_ok());
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.description(), Some("down"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", Status::ok()), "OK");
        assert_eq!(
            format!("{}", Status::internal("boom")),
            "INTERNAL: boom"
        );
    }

    #[test]
    fn test_status_cause_is_source() {
        let cause = std::io::Error::other("socket closed");
        let status = Status::unknown("unexpected exception").with_cause(cause);

        let source = status.source().expect("cause");
        assert_eq!(source.to_string(), "socket closed");
        assert!(format!("{:?}", status).contains("socket closed"));
    }

    #[test]
    fn test_status_clone_shares_cause() {
        let status = Status::cancelled("stop").with_cause(std::io::Error::other("io"));
        let cloned = status.clone();
        assert_eq!(cloned.code(), Code::Cancelled);
        assert_eq!(cloned.cause().map(|c| c.to_string()), Some("io".into()));
    }

    #[test]
    fn test_status_error_keeps_trailers() {
        let mut trailers = Metadata::new();
        trailers.insert("x-request-id", "abc");

        let err = Status::unavailable("down").into_error(trailers);
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.description(), Some("down"));
        assert_eq!(err.trailers().get("x-request-id"), Some("abc"));
        assert_eq!(err.to_string(), "UNAVAILABLE: down");
    }

    #[test]
    fn test_status_error_from_status() {
        let err: StatusError = Status::deadline_exceeded("late").into();
        assert!(err.trailers().is_empty());
        let (status, _) = err.into_parts();
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }
}
