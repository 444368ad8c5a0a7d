//! The call transport seam.
//!
//! The transport (connection management, framing, flow control) lives
//! outside this crate. It is consumed through the traits in this module:
//! a [`Channel`] creates [`ClientCall`]s, each of which reports progress to
//! a [`Listener`] on the [`Executor`] named in its [`CallOptions`].

use crate::error::Error;
use crate::metadata::Metadata;
use crate::status::Status;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A unit of work submitted to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs listener callbacks for a call.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Receives the events of one call.
///
/// For one call the transport delivers, in order: `on_headers` at most once,
/// zero or more `on_message` (bounded by the credit granted through
/// [`ClientCall::request`]) and exactly one `on_close`. `on_ready` may be
/// interleaved whenever the call becomes writable.
pub trait Listener<Resp>: Send {
    /// Response headers were received.
    fn on_headers(&mut self, headers: Metadata) {
        let _ = headers;
    }

    /// A response message was received.
    ///
    /// An `Err` means the listener refuses the message. The transport must
    /// answer it by cancelling the call, which still ends in `on_close`.
    fn on_message(&mut self, message: Resp) -> Result<(), Error>;

    /// The call finished. No other event follows.
    fn on_close(&mut self, status: Status, trailers: Metadata);

    /// The call can accept more outbound messages without buffering.
    fn on_ready(&mut self) {}
}

/// One in-flight call.
///
/// Handles are shared (`Arc<dyn ClientCall<..>>`) between the code driving
/// the call, the response future and the request stream, so every operation
/// takes `&self`.
pub trait ClientCall<Req, Resp>: Send + Sync {
    /// Start the call, delivering events to `listener`.
    fn start(&self, listener: Box<dyn Listener<Resp>>, headers: Metadata) -> Result<(), Error>;

    /// Grant credit for `count` more inbound messages.
    fn request(&self, count: u32) -> Result<(), Error>;

    /// Abort the call. The listener still receives `on_close`.
    fn cancel(&self, message: Option<&str>, cause: Option<&Error>) -> Result<(), Error>;

    /// Close the outbound side of the call.
    fn half_close(&self) -> Result<(), Error>;

    /// Send one request message.
    fn send_message(&self, message: Req) -> Result<(), Error>;

    /// Whether the transport can accept a message without buffering.
    fn is_ready(&self) -> bool {
        true
    }

    /// Enable or disable compression of outbound messages.
    fn set_message_compression(&self, enabled: bool) -> Result<(), Error> {
        let _ = enabled;
        Ok(())
    }
}

/// Creates calls.
pub trait Channel {
    fn new_call<Req, Resp>(
        &self,
        method: &MethodDescriptor<Req, Resp>,
        options: CallOptions,
    ) -> Arc<dyn ClientCall<Req, Resp>>
    where
        Req: Send + 'static,
        Resp: Send + 'static;
}

/// Shape of a method's request and response streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodType {
    Unary,
    ClientStreaming,
    ServerStreaming,
    BidiStreaming,
}

/// Describes a remote method.
pub struct MethodDescriptor<Req, Resp> {
    /// Full method name (e.g., "/package.Service/Method").
    full_name: String,
    method_type: MethodType,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> MethodDescriptor<Req, Resp> {
    /// Create a descriptor.
    ///
    /// The name should be in format "/package.Service/Method".
    pub fn new(full_name: impl Into<String>, method_type: MethodType) -> Self {
        Self {
            full_name: full_name.into(),
            method_type,
            _marker: PhantomData,
        }
    }

    pub fn unary(full_name: impl Into<String>) -> Self {
        Self::new(full_name, MethodType::Unary)
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn method_type(&self) -> MethodType {
        self.method_type
    }

    /// The service part of the name ("package.Service").
    pub fn service_name(&self) -> Option<&str> {
        let trimmed = self.full_name.strip_prefix('/').unwrap_or(&self.full_name);
        trimmed.rsplit_once('/').map(|(service, _)| service)
    }
}

impl<Req, Resp> Clone for MethodDescriptor<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            full_name: self.full_name.clone(),
            method_type: self.method_type,
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp> fmt::Debug for MethodDescriptor<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("full_name", &self.full_name)
            .field("method_type", &self.method_type)
            .finish()
    }
}

/// Per-call options passed to [`Channel::new_call`].
#[derive(Clone, Default)]
pub struct CallOptions {
    executor: Option<Arc<dyn Executor>>,
    deadline: Option<Duration>,
    compressor: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run listener callbacks on `executor`.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Fail the call if it has not finished within `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Compress outbound messages with the named compressor.
    pub fn with_compression(mut self, compressor: impl Into<String>) -> Self {
        self.compressor = Some(compressor.into());
        self
    }

    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn compressor(&self) -> Option<&str> {
        self.compressor.as_deref()
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("executor", &self.executor.is_some())
            .field("deadline", &self.deadline)
            .field("compressor", &self.compressor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inline;

    impl Executor for Inline {
        fn execute(&self, task: Task) {
            task();
        }
    }

    #[test]
    fn test_method_descriptor() {
        let method = MethodDescriptor::<String, String>::unary("/echo.Echo/Say");
        assert_eq!(method.full_name(), "/echo.Echo/Say");
        assert_eq!(method.method_type(), MethodType::Unary);
        assert_eq!(method.service_name(), Some("echo.Echo"));
        assert!(format!("{:?}", method.clone()).contains("/echo.Echo/Say"));
    }

    #[test]
    fn test_method_descriptor_without_service() {
        let method = MethodDescriptor::<(), ()>::new("Say", MethodType::BidiStreaming);
        assert_eq!(method.service_name(), None);
    }

    #[test]
    fn test_call_options() {
        let options = CallOptions::new();
        assert!(options.executor().is_none());
        assert!(options.deadline().is_none());

        let options = options
            .with_executor(Arc::new(Inline))
            .with_deadline(Duration::from_millis(250))
            .with_compression("gzip");
        assert!(options.executor().is_some());
        assert_eq!(options.deadline(), Some(Duration::from_millis(250)));
        assert_eq!(options.compressor(), Some("gzip"));
        assert!(format!("{:?}", options).contains("gzip"));
    }
}
