//! Push-style observers over call events.
//!
//! [`ObserverListener`] turns listener callbacks into [`StreamObserver`]
//! calls. [`RequestStream`] is the send side of the same call, handed to
//! request producers and to observers that ask for it before the call
//! starts.

use crate::call::{ClientCall, Listener};
use crate::error::Error;
use crate::metadata::Metadata;
use crate::status::{Status, StatusError};

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Receives the values of a stream.
///
/// `on_error` and `on_completed` are terminal and mutually exclusive.
pub trait StreamObserver<T>: Send {
    fn on_next(&mut self, value: T);
    fn on_error(&mut self, error: StatusError);
    fn on_completed(&mut self);
}

/// An observer that wants the call's [`RequestStream`] before any message
/// flows, e.g. to install an on-ready handler or to take over inbound flow
/// control.
pub trait ClientResponseObserver<Req, Resp>: StreamObserver<Resp> {
    fn before_start(&mut self, stream: &RequestStream<Req, Resp>);
}

/// A response observer, tagged with the capabilities it offers.
pub enum ResponseObserver<Req, Resp> {
    Plain(Box<dyn StreamObserver<Resp>>),
    WithBeforeStart(Box<dyn ClientResponseObserver<Req, Resp>>),
}

impl<Req, Resp> ResponseObserver<Req, Resp> {
    pub fn new<O>(observer: O) -> Self
    where
        O: StreamObserver<Resp> + 'static,
    {
        ResponseObserver::Plain(Box::new(observer))
    }

    pub fn with_before_start<O>(observer: O) -> Self
    where
        O: ClientResponseObserver<Req, Resp> + 'static,
    {
        ResponseObserver::WithBeforeStart(Box::new(observer))
    }

    fn get(&mut self) -> &mut dyn StreamObserver<Resp> {
        match self {
            ResponseObserver::Plain(observer) => observer.as_mut(),
            ResponseObserver::WithBeforeStart(observer) => observer.as_mut(),
        }
    }
}

type OnReady = Box<dyn FnMut() + Send>;

/// Flow settings of a call, fixed when the call starts.
pub struct FlowSettings {
    on_ready: Option<OnReady>,
    auto_inbound_flow_control: bool,
}

impl FlowSettings {
    pub fn auto_inbound_flow_control(&self) -> bool {
        self.auto_inbound_flow_control
    }

    pub fn has_on_ready_handler(&self) -> bool {
        self.on_ready.is_some()
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            on_ready: None,
            auto_inbound_flow_control: true,
        }
    }
}

impl fmt::Debug for FlowSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowSettings")
            .field("on_ready", &self.on_ready.is_some())
            .field("auto_inbound_flow_control", &self.auto_inbound_flow_control)
            .finish()
    }
}

/// Settings that may still change, until the call starts.
struct PreStart {
    frozen: bool,
    settings: FlowSettings,
}

struct StreamInner<Req, Resp> {
    call: Arc<dyn ClientCall<Req, Resp>>,
    pre_start: Mutex<PreStart>,
}

/// Send side of a call.
///
/// Cheap to clone; all clones drive the same call.
pub struct RequestStream<Req, Resp> {
    inner: Arc<StreamInner<Req, Resp>>,
}

impl<Req, Resp> Clone for RequestStream<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Req, Resp> RequestStream<Req, Resp> {
    pub fn new(call: Arc<dyn ClientCall<Req, Resp>>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                call,
                pre_start: Mutex::new(PreStart {
                    frozen: false,
                    settings: FlowSettings::default(),
                }),
            }),
        }
    }

    /// Send a request message.
    pub fn on_next(&self, value: Req) -> Result<(), Error> {
        self.inner.call.send_message(value)
    }

    /// Abort the call with `cause`.
    pub fn on_error(&self, cause: Error) -> Result<(), Error> {
        self.inner.call.cancel(
            Some("Cancelled by client with StreamObserver.onError()"),
            Some(&cause),
        )
    }

    /// Finish sending.
    pub fn on_completed(&self) -> Result<(), Error> {
        self.inner.call.half_close()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.call.is_ready()
    }

    /// Run `handler` whenever the call becomes writable.
    ///
    /// Only allowed before the call starts.
    pub fn set_on_ready_handler<F>(&self, handler: F) -> Result<(), Error>
    where
        F: FnMut() + Send + 'static,
    {
        let mut pre_start = self.inner.pre_start.lock();
        if pre_start.frozen {
            return Err(Error::IllegalState(
                "cannot alter on-ready handler after call started",
            ));
        }
        pre_start.settings.on_ready = Some(Box::new(handler));
        Ok(())
    }

    /// Stop requesting the next response automatically after each one.
    ///
    /// Only allowed before the call starts; the caller then grants credit
    /// itself through [`request`](Self::request).
    pub fn disable_auto_inbound_flow_control(&self) -> Result<(), Error> {
        let mut pre_start = self.inner.pre_start.lock();
        if pre_start.frozen {
            return Err(Error::IllegalState(
                "cannot disable auto flow control after call started",
            ));
        }
        pre_start.settings.auto_inbound_flow_control = false;
        Ok(())
    }

    pub fn request(&self, count: u32) -> Result<(), Error> {
        self.inner.call.request(count)
    }

    pub fn set_message_compression(&self, enabled: bool) -> Result<(), Error> {
        self.inner.call.set_message_compression(enabled)
    }

    pub fn cancel(&self, message: Option<&str>, cause: Option<&Error>) -> Result<(), Error> {
        self.inner.call.cancel(message, cause)
    }

    /// A handle on the call that does not keep it alive.
    pub(crate) fn downgrade(&self) -> Weak<dyn ClientCall<Req, Resp>> {
        Arc::downgrade(&self.inner.call)
    }

    /// End the pre-start phase and take the settings it produced.
    pub(crate) fn freeze(&self) -> FlowSettings {
        let mut pre_start = self.inner.pre_start.lock();
        pre_start.frozen = true;
        std::mem::take(&mut pre_start.settings)
    }
}

/// Listener that forwards call events to a [`StreamObserver`].
///
/// The call owns its listener, so the listener only holds a weak handle on
/// the call.
pub struct ObserverListener<Req, Resp> {
    observer: ResponseObserver<Req, Resp>,
    call: Weak<dyn ClientCall<Req, Resp>>,
    settings: FlowSettings,
    streaming: bool,
    first_received: bool,
    terminated: bool,
}

impl<Req, Resp> ObserverListener<Req, Resp> {
    /// Bind `observer` to the call behind `stream`.
    ///
    /// An observer offering `before_start` is handed the stream first. The
    /// stream's configuration is frozen when this returns.
    pub fn new(
        observer: ResponseObserver<Req, Resp>,
        stream: RequestStream<Req, Resp>,
        streaming: bool,
    ) -> Self {
        let mut observer = observer;
        if let ResponseObserver::WithBeforeStart(observer) = &mut observer {
            observer.before_start(&stream);
        }
        let settings = stream.freeze();
        Self {
            observer,
            call: stream.downgrade(),
            settings,
            streaming,
            first_received: false,
            terminated: false,
        }
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }
}

impl<Req, Resp> Listener<Resp> for ObserverListener<Req, Resp>
where
    Req: 'static,
    Resp: Send + 'static,
{
    fn on_message(&mut self, message: Resp) -> Result<(), Error> {
        if self.terminated {
            debug!("dropping message after terminal signal");
            return Ok(());
        }
        if self.first_received && !self.streaming {
            let err = Status::internal(
                "More than one responses received for unary or client-streaming call",
            )
            .into_error(Metadata::new());
            self.terminated = true;
            self.observer.get().on_error(err.clone());
            return Err(err.into());
        }
        self.first_received = true;
        self.observer.get().on_next(message);

        if self.streaming && self.settings.auto_inbound_flow_control {
            match self.call.upgrade() {
                Some(call) => call.request(1)?,
                None => debug!("call dropped, not requesting more messages"),
            }
        }
        Ok(())
    }

    fn on_close(&mut self, status: Status, trailers: Metadata) {
        if self.terminated {
            debug!(status = %status, "ignoring close after terminal signal");
            return;
        }
        self.terminated = true;
        if status.is_ok() {
            self.observer.get().on_completed();
        } else {
            self.observer.get().on_error(status.into_error(trailers));
        }
    }

    fn on_ready(&mut self) {
        if let Some(handler) = self.settings.on_ready.as_mut() {
            handler();
        }
    }
}
