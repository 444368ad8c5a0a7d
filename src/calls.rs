//! Entry points that drive a call to completion.
//!
//! Every entry point starts the call, grants initial inbound credit, sends
//! what it has to send and then either hands back something to wait on or
//! waits itself. Failures on the synchronous paths go through
//! [`cancel_throw`] so the call is always cancelled before the error reaches
//! the caller.

use crate::call::{CallOptions, Channel, ClientCall, Listener, MethodDescriptor};
use crate::drain::DrainQueue;
use crate::error::Error;
use crate::future::{CANCELLED_DESCRIPTION, ResponseFuture};
use crate::metadata::Metadata;
use crate::observer::{ObserverListener, RequestStream, ResponseObserver};
use crate::status::{Status, StatusError};
use crate::unary::UnaryResponseListener;

use std::sync::Arc;
use tracing::{error, warn};

/// Initial credit for calls with a single response. Asking for two lets a
/// second, illegal response reach the listener so it can be rejected.
const UNARY_INITIAL_REQUEST: u32 = 2;

/// Initial credit for streaming responses, pulled one at a time.
const STREAMING_INITIAL_REQUEST: u32 = 1;

/// Start a unary call and return a future for its response.
///
/// Does not block. Cancelling the future cancels the call.
pub fn future_unary_call<Req, Resp>(
    call: Arc<dyn ClientCall<Req, Resp>>,
    request: Req,
    headers: Metadata,
) -> Result<ResponseFuture<Resp>, Error>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let cancel_on = call.clone();
    let (future, completer) = ResponseFuture::new(move || {
        if let Err(e) = cancel_on.cancel(Some(CANCELLED_DESCRIPTION), None) {
            warn!(error = %e, "failed to cancel call for cancelled future");
        }
    });
    let listener = Box::new(UnaryResponseListener::new(completer));
    unary_request_call(&*call, request, listener, false, headers)?;
    Ok(future)
}

/// Run a unary call on an existing call handle and wait for the response.
///
/// The call's listener events must be delivered by some other thread. The
/// wait cannot be interrupted; it ends only when the call closes. Use
/// [`blocking_unary_call_in`] for a wait that an [`Interrupter`] can break.
///
/// [`Interrupter`]: crate::drain::Interrupter
pub fn blocking_unary_call<Req, Resp>(
    call: Arc<dyn ClientCall<Req, Resp>>,
    request: Req,
    headers: Metadata,
) -> Result<Resp, StatusError>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    future_unary_call(call.clone(), request, headers)
        .and_then(|future| future.wait())
        .map_err(|e| cancel_throw(&*call, e).into_status_error())
}

/// Run a unary call on a fresh call from `channel`, delivering its events on
/// the calling thread.
pub fn blocking_unary_call_on<C, Req, Resp>(
    channel: &C,
    method: &MethodDescriptor<Req, Resp>,
    options: CallOptions,
    request: Req,
    headers: Metadata,
) -> Result<Resp, StatusError>
where
    C: Channel,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let queue = DrainQueue::new();
    blocking_unary_call_in(&queue, channel, method, options, request, headers)
}

/// Like [`blocking_unary_call_on`], draining the events of the call through
/// `queue`.
///
/// Interrupting the queue cancels the call and fails with `CANCELLED`. The
/// queue stays interrupted afterwards.
pub fn blocking_unary_call_in<C, Req, Resp>(
    queue: &DrainQueue,
    channel: &C,
    method: &MethodDescriptor<Req, Resp>,
    options: CallOptions,
    request: Req,
    headers: Metadata,
) -> Result<Resp, StatusError>
where
    C: Channel,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let call = channel.new_call(method, options.with_executor(queue.executor()));

    let result = future_unary_call(call.clone(), request, headers).and_then(|future| {
        while !future.is_done() {
            if let Err(interrupted) = queue.wait_and_drain() {
                return Err(Status::cancelled("Call was interrupted")
                    .with_cause(interrupted)
                    .into());
            }
        }
        future.wait()
    });

    result.map_err(|e| cancel_throw(&*call, e).into_status_error())
}

/// Send a single request and deliver the single response to `observer`.
pub fn async_unary_call<Req, Resp>(
    call: Arc<dyn ClientCall<Req, Resp>>,
    request: Req,
    observer: ResponseObserver<Req, Resp>,
    headers: Metadata,
) -> Result<(), Error>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async_observer_call(call, request, observer, false, headers)
}

/// Send a single request and stream the responses to `observer`.
pub fn async_server_streaming_call<Req, Resp>(
    call: Arc<dyn ClientCall<Req, Resp>>,
    request: Req,
    observer: ResponseObserver<Req, Resp>,
    headers: Metadata,
) -> Result<(), Error>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async_observer_call(call, request, observer, true, headers)
}

/// Start a call whose requests are produced through the returned stream and
/// whose single response goes to `observer`.
pub fn async_client_streaming_call<Req, Resp>(
    call: Arc<dyn ClientCall<Req, Resp>>,
    observer: ResponseObserver<Req, Resp>,
    headers: Metadata,
) -> Result<RequestStream<Req, Resp>, Error>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async_stream_call(call, observer, false, headers)
}

/// Start a call with streams in both directions.
pub fn async_bidi_streaming_call<Req, Resp>(
    call: Arc<dyn ClientCall<Req, Resp>>,
    observer: ResponseObserver<Req, Resp>,
    headers: Metadata,
) -> Result<RequestStream<Req, Resp>, Error>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async_stream_call(call, observer, true, headers)
}

fn async_observer_call<Req, Resp>(
    call: Arc<dyn ClientCall<Req, Resp>>,
    request: Req,
    observer: ResponseObserver<Req, Resp>,
    streaming: bool,
    headers: Metadata,
) -> Result<(), Error>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let stream = RequestStream::new(call.clone());
    let listener = Box::new(ObserverListener::new(observer, stream, streaming));
    unary_request_call(&*call, request, listener, streaming, headers)
}

fn async_stream_call<Req, Resp>(
    call: Arc<dyn ClientCall<Req, Resp>>,
    observer: ResponseObserver<Req, Resp>,
    streaming: bool,
    headers: Metadata,
) -> Result<RequestStream<Req, Resp>, Error>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let stream = RequestStream::new(call.clone());
    let listener = Box::new(ObserverListener::new(observer, stream.clone(), streaming));
    start_call(&*call, listener, streaming, headers)?;
    Ok(stream)
}

/// Start the call, then send `request` and half-close.
fn unary_request_call<Req, Resp>(
    call: &dyn ClientCall<Req, Resp>,
    request: Req,
    listener: Box<dyn Listener<Resp>>,
    streaming: bool,
    headers: Metadata,
) -> Result<(), Error> {
    start_call(call, listener, streaming, headers)?;
    call.send_message(request)
        .and_then(|()| call.half_close())
        .map_err(|e| cancel_throw(call, e))
}

fn start_call<Req, Resp>(
    call: &dyn ClientCall<Req, Resp>,
    listener: Box<dyn Listener<Resp>>,
    streaming: bool,
    headers: Metadata,
) -> Result<(), Error> {
    call.start(listener, headers)?;
    if streaming {
        call.request(STREAMING_INITIAL_REQUEST)
    } else {
        call.request(UNARY_INITIAL_REQUEST)
    }
}

/// Cancel `call` because of `err` and hand `err` back.
///
/// A failure to cancel is logged and dropped; `err` always wins.
pub fn cancel_throw<Req, Resp>(call: &dyn ClientCall<Req, Resp>, err: Error) -> Error {
    if let Err(e) = call.cancel(None, Some(&err)) {
        error!(error = %e, cause = %err, "failure encountered while cancelling call");
    }
    err
}
