//! Blocking drain queue.
//!
//! A [`DrainQueue`] lets the thread that issued a blocking call act as the
//! executor for that call's listener callbacks. The transport submits tasks
//! from whatever thread it likes; the waiting thread picks them up in
//! [`DrainQueue::wait_and_drain`]. No worker thread is involved.

use crate::call::{Executor, Task};
use crate::config::DrainQueueConfig;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// Returned by [`DrainQueue::wait_and_drain`] once the queue was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interrupted while waiting for call events")]
pub struct Interrupted;

enum Job {
    Run(Task),
    Wake,
}

/// Tasks the draining thread submitted to itself while the channel was full.
///
/// The draining thread is the only consumer, so it must never block on its
/// own bounded channel.
struct Overflow {
    drainer: Mutex<ThreadId>,
    tasks: Mutex<VecDeque<Task>>,
}

/// Single-consumer task queue drained by a blocked caller.
pub struct DrainQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
    overflow: Arc<Overflow>,
    interrupted: Arc<AtomicBool>,
}

impl DrainQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::from_config(&DrainQueueConfig::default())
    }

    /// Create a queue, bounded if the config sets a capacity.
    pub fn from_config(config: &DrainQueueConfig) -> Self {
        let (tx, rx) = match config.capacity {
            Some(capacity) => crossbeam_channel::bounded(capacity),
            None => crossbeam_channel::unbounded(),
        };
        Self {
            tx,
            rx,
            overflow: Arc::new(Overflow {
                drainer: Mutex::new(thread::current().id()),
                tasks: Mutex::new(VecDeque::new()),
            }),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue a task. Callable from any thread.
    ///
    /// Other threads block while a bounded queue is full. The draining
    /// thread never does.
    pub fn submit(&self, task: Task) {
        submit(&self.tx, &self.overflow, task);
    }

    /// An executor handle that submits into this queue.
    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::new(QueueExecutor {
            tx: self.tx.clone(),
            overflow: self.overflow.clone(),
        })
    }

    /// A handle that can interrupt a blocked [`wait_and_drain`](Self::wait_and_drain).
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            tx: self.tx.clone(),
            interrupted: self.interrupted.clone(),
        }
    }

    /// Whether the queue has been interrupted. The flag is never cleared.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.rx.len() + self.overflow.tasks.lock().len()
    }

    /// Block until a task is available, then run it and every task that is
    /// queued before the queue runs empty.
    ///
    /// Returns the number of tasks run. A panicking task is logged and the
    /// drain continues. The calling thread becomes the draining thread.
    pub fn wait_and_drain(&self) -> Result<usize, Interrupted> {
        if self.is_interrupted() {
            return Err(Interrupted);
        }
        *self.overflow.drainer.lock() = thread::current().id();

        let mut ran = 0;
        let mut job = match self.overflow.pop() {
            Some(task) => Some(task),
            None => match self.rx.recv() {
                Ok(Job::Run(task)) => Some(task),
                Ok(Job::Wake) => {
                    if self.is_interrupted() {
                        return Err(Interrupted);
                    }
                    None
                }
                // unreachable while `self.tx` is alive
                Err(_) => return Ok(0),
            },
        };

        loop {
            if let Some(task) = job.take() {
                run(task);
                ran += 1;
            }
            match self.rx.try_recv() {
                Ok(Job::Run(task)) => job = Some(task),
                // interruption is observed by the next wait
                Ok(Job::Wake) => {}
                Err(_) => match self.overflow.pop() {
                    Some(task) => job = Some(task),
                    None => break,
                },
            }
        }

        Ok(ran)
    }
}

impl Default for DrainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Overflow {
    fn pop(&self) -> Option<Task> {
        self.tasks.lock().pop_front()
    }
}

/// Interrupts the thread blocked on a [`DrainQueue`].
#[derive(Clone)]
pub struct Interrupter {
    tx: Sender<Job>,
    interrupted: Arc<AtomicBool>,
}

impl Interrupter {
    /// Set the interrupted flag and wake the waiting thread.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        if self.tx.try_send(Job::Wake).is_err() {
            // a full queue already has work that will wake the waiter
            debug!("interrupt wake-up not queued");
        }
    }
}

struct QueueExecutor {
    tx: Sender<Job>,
    overflow: Arc<Overflow>,
}

impl Executor for QueueExecutor {
    fn execute(&self, task: Task) {
        submit(&self.tx, &self.overflow, task);
    }
}

fn submit(tx: &Sender<Job>, overflow: &Overflow, task: Task) {
    let sent = if *overflow.drainer.lock() == thread::current().id() {
        let mut tasks = overflow.tasks.lock();
        if !tasks.is_empty() {
            // keep the draining thread's own tasks in order
            tasks.push_back(task);
            return;
        }
        match tx.try_send(Job::Run(task)) {
            Err(TrySendError::Full(Job::Run(task))) => {
                tasks.push_back(task);
                Ok(())
            }
            other => other.map_err(|_| ()),
        }
    } else {
        tx.send(Job::Run(task)).map_err(|_| ())
    };
    if sent.is_err() {
        debug!("drain queue dropped, discarding task");
    }
}

fn run(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!(panic = %message, "task panicked while draining call events");
    }
}
