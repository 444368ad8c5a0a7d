//! In-memory call double for unit tests.

use crate::call::{ClientCall, Listener};
use crate::error::Error;
use crate::metadata::Metadata;
use crate::status::Status;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// An operation observed by [`RecordingCall`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op<Req> {
    Start(Metadata),
    Request(u32),
    SendMessage(Req),
    HalfClose,
    Cancel {
        message: Option<String>,
        cause: Option<String>,
    },
    SetCompression(bool),
}

type Responder<Resp> = Box<dyn FnOnce(&mut dyn Listener<Resp>) + Send>;

/// Records every operation and lets the test deliver listener events.
///
/// Events are delivered inline on the calling thread. A responder, if set,
/// runs when the call is half-closed, like a server answering a request.
pub(crate) struct RecordingCall<Req, Resp> {
    ops: Mutex<Vec<Op<Req>>>,
    listener: Mutex<Option<Box<dyn Listener<Resp>>>>,
    responder: Mutex<Option<Responder<Resp>>>,
    fail_send: AtomicBool,
    fail_cancel: AtomicBool,
    ready: AtomicBool,
}

impl<Req, Resp> RecordingCall<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            responder: Mutex::new(None),
            fail_send: AtomicBool::new(false),
            fail_cancel: AtomicBool::new(false),
            ready: AtomicBool::new(true),
        }
    }

    pub(crate) fn responding<F>(self, responder: F) -> Self
    where
        F: FnOnce(&mut dyn Listener<Resp>) + Send + 'static,
    {
        *self.responder.lock() = Some(Box::new(responder));
        self
    }

    pub(crate) fn failing_send(self) -> Self {
        self.fail_send.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_cancel(self) -> Self {
        self.fail_cancel.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub(crate) fn ops(&self) -> Vec<Op<Req>> {
        self.ops.lock().clone()
    }

    pub(crate) fn cancels(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, Op::Cancel { .. }))
            .count()
    }

    pub(crate) fn deliver_message(&self, message: Resp) -> Result<(), Error> {
        match self.listener.lock().as_mut() {
            Some(listener) => listener.on_message(message),
            None => Err(Error::IllegalState("call not started")),
        }
    }

    pub(crate) fn deliver_close(&self, status: Status, trailers: Metadata) {
        if let Some(listener) = self.listener.lock().as_mut() {
            listener.on_close(status, trailers);
        }
    }

    fn record(&self, op: Op<Req>) {
        self.ops.lock().push(op);
    }
}

impl<Req, Resp> ClientCall<Req, Resp> for RecordingCall<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    fn start(&self, listener: Box<dyn Listener<Resp>>, headers: Metadata) -> Result<(), Error> {
        self.record(Op::Start(headers));
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn request(&self, count: u32) -> Result<(), Error> {
        self.record(Op::Request(count));
        Ok(())
    }

    fn cancel(&self, message: Option<&str>, cause: Option<&Error>) -> Result<(), Error> {
        self.record(Op::Cancel {
            message: message.map(String::from),
            cause: cause.map(|c| c.to_string()),
        });
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(Error::transport(std::io::Error::other("cancel exploded")));
        }
        Ok(())
    }

    fn half_close(&self) -> Result<(), Error> {
        self.record(Op::HalfClose);
        let responder = self.responder.lock().take();
        if let Some(responder) = responder {
            if let Some(listener) = self.listener.lock().as_mut() {
                responder(listener.as_mut());
            }
        }
        Ok(())
    }

    fn send_message(&self, message: Req) -> Result<(), Error> {
        self.record(Op::SendMessage(message));
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::transport(std::io::Error::other("stream reset")));
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn set_message_compression(&self, enabled: bool) -> Result<(), Error> {
        self.record(Op::SetCompression(enabled));
        Ok(())
    }
}
