//! Single-shot response future.
//!
//! [`ResponseFuture`] is the consumer half and [`Completer`] the producer
//! half of a result slot that resolves exactly once. The future can be
//! waited on from a thread or polled as a [`std::future::Future`].

use crate::error::Error;
use crate::status::Status;

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};
use tracing::debug;

/// Description of the status reported by a cancelled future.
pub const CANCELLED_DESCRIPTION: &str = "future was cancelled";

type CancelHook = Box<dyn FnOnce() + Send>;

enum State<T> {
    Pending,
    Ready(Result<T, Error>),
    Cancelled,
    Taken,
}

struct Inner<T> {
    state: State<T>,
    waker: Option<Waker>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    resolved: Condvar,
}

impl<T> Shared<T> {
    /// Move out of `Pending`. Returns false if already resolved.
    fn resolve(&self, state: State<T>) -> bool {
        let waker = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, State::Pending) {
                return false;
            }
            inner.state = state;
            inner.waker.take()
        };
        self.resolved.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }
}

/// The consumer half of a single-shot result.
pub struct ResponseFuture<T> {
    shared: Arc<Shared<T>>,
    on_cancel: Mutex<Option<CancelHook>>,
}

/// The producer half of a single-shot result.
pub struct Completer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ResponseFuture<T> {
    /// Create a pending future. `on_cancel` runs once if the future is
    /// cancelled before it resolves.
    pub fn new<F>(on_cancel: F) -> (ResponseFuture<T>, Completer<T>)
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: State::Pending,
                waker: None,
            }),
            resolved: Condvar::new(),
        });
        let future = ResponseFuture {
            shared: shared.clone(),
            on_cancel: Mutex::new(Some(Box::new(on_cancel))),
        };
        (future, Completer { shared })
    }

    /// Whether the future has left the pending state.
    pub fn is_done(&self) -> bool {
        !matches!(self.shared.inner.lock().state, State::Pending)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.shared.inner.lock().state, State::Cancelled)
    }

    /// Cancel a pending future.
    ///
    /// Returns false (and does nothing) if the future already resolved.
    pub fn cancel(&self) -> bool {
        if !self.shared.resolve(State::Cancelled) {
            return false;
        }
        if let Some(hook) = self.on_cancel.lock().take() {
            hook();
        }
        true
    }

    /// Block until the future resolves.
    pub fn wait(self) -> Result<T, Error> {
        let mut inner = self.shared.inner.lock();
        while matches!(inner.state, State::Pending) {
            self.shared.resolved.wait(&mut inner);
        }
        take(&mut inner.state)
    }

    /// Block until the future resolves or `timeout` elapses.
    ///
    /// On timeout the still pending future is handed back.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Result<T, Error>, Self> {
        let deadline = Instant::now() + timeout;
        {
            let mut inner = self.shared.inner.lock();
            while matches!(inner.state, State::Pending) {
                if self
                    .shared
                    .resolved
                    .wait_until(&mut inner, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            if !matches!(inner.state, State::Pending) {
                return Ok(take(&mut inner.state));
            }
        }
        Err(self)
    }
}

fn take<T>(state: &mut State<T>) -> Result<T, Error> {
    match std::mem::replace(state, State::Taken) {
        State::Ready(result) => result,
        State::Cancelled => Err(Status::cancelled(CANCELLED_DESCRIPTION).into()),
        State::Taken => Err(Error::IllegalState("response already taken")),
        State::Pending => Err(Error::IllegalState("response still pending")),
    }
}

impl<T> std::future::Future for ResponseFuture<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.shared.inner.lock();
        if matches!(inner.state, State::Pending) {
            inner.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        Poll::Ready(take(&mut inner.state))
    }
}

impl<T> fmt::Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T> Completer<T> {
    /// Resolve with a value. Returns false if already resolved.
    pub fn set(&self, value: T) -> bool {
        let set = self.shared.resolve(State::Ready(Ok(value)));
        if !set {
            debug!("redundant completion of response future");
        }
        set
    }

    /// Resolve with an error. Returns false if already resolved.
    pub fn set_error(&self, error: Error) -> bool {
        let set = self.shared.resolve(State::Ready(Err(error)));
        if !set {
            debug!("redundant failure of response future");
        }
        set
    }

    pub fn is_done(&self) -> bool {
        !matches!(self.shared.inner.lock().state, State::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting_future() -> (ResponseFuture<u32>, Completer<u32>, Arc<AtomicUsize>) {
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = cancels.clone();
        let (future, completer) = ResponseFuture::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (future, completer, cancels)
    }

    #[test]
    fn test_first_write_wins() {
        let (future, completer, _) = counting_future();
        assert!(!future.is_done());

        assert!(completer.set(1));
        assert!(!completer.set(2));
        assert!(!completer.set_error(Status::internal("late").into()));
        assert!(future.is_done());
        assert_eq!(future.wait().unwrap(), 1);
    }

    #[test]
    fn test_error_then_value_keeps_error() {
        let (future, completer, _) = counting_future();
        assert!(completer.set_error(Status::unavailable("down").into()));
        assert!(!completer.set(7));

        let err = future.wait().unwrap_err().into_status_error();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[test]
    fn test_cancel_runs_hook_once() {
        let (future, completer, cancels) = counting_future();
        assert!(future.cancel());
        assert!(!future.cancel());
        assert!(future.is_cancelled());
        assert!(!completer.set(3));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);

        let err = future.wait().unwrap_err().into_status_error();
        assert_eq!(err.code(), Code::Cancelled);
        assert_eq!(err.description(), Some(CANCELLED_DESCRIPTION));
    }

    #[test]
    fn test_cancel_after_resolution_is_noop() {
        let (future, completer, cancels) = counting_future();
        completer.set(5);
        assert!(!future.cancel());
        assert!(!future.is_cancelled());
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
        assert_eq!(future.wait().unwrap(), 5);
    }

    #[test]
    fn test_wait_across_threads() {
        let (future, completer, _) = counting_future();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            completer.set(42);
        });
        assert_eq!(future.wait().unwrap(), 42);
        producer.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_returns_pending_future() {
        let (future, completer, _) = counting_future();
        let future = future
            .wait_timeout(Duration::from_millis(5))
            .expect_err("still pending");
        completer.set(9);
        let result = future.wait_timeout(Duration::from_millis(5)).unwrap();
        assert_eq!(result.unwrap(), 9);
    }

    #[test]
    fn test_poll_as_future() {
        let (future, completer, _) = counting_future();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            completer.set(11);
        });
        assert_eq!(futures::executor::block_on(future).unwrap(), 11);
        producer.join().unwrap();
    }
}
