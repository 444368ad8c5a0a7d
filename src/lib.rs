//! Client call adapters.
//!
//! Bridges a callback-driven remote call ([`ClientCall`] plus [`Listener`])
//! to a single-shot [`ResponseFuture`], to push-style [`StreamObserver`]s,
//! and to a blocking path that runs the call's callbacks on the waiting
//! thread through a [`DrainQueue`].

pub mod call;
pub mod calls;
pub mod config;
pub mod drain;
pub mod error;
pub mod future;
pub mod logging;
pub mod metadata;
pub mod observer;
pub mod status;
pub mod unary;

#[cfg(test)]
mod testing;

pub use call::{
    CallOptions, Channel, ClientCall, Executor, Listener, MethodDescriptor, MethodType, Task,
};
pub use calls::{
    async_bidi_streaming_call, async_client_streaming_call, async_server_streaming_call,
    async_unary_call, blocking_unary_call, blocking_unary_call_in, blocking_unary_call_on,
    cancel_throw, future_unary_call,
};
pub use config::{Config, ConfigError};
pub use drain::{DrainQueue, Interrupted, Interrupter};
pub use error::Error;
pub use future::{Completer, ResponseFuture};
pub use metadata::Metadata;
pub use observer::{
    ClientResponseObserver, FlowSettings, ObserverListener, RequestStream, ResponseObserver,
    StreamObserver,
};
pub use status::{Code, Status, StatusError};
pub use unary::UnaryResponseListener;
