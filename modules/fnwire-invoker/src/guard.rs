//! Single-response latch shared by everything that can finish a request.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::HandlerFault;
use crate::response::{Outcome, Reply};

/// Lets exactly one outcome through per request.
///
/// The function's return value, its callback, a panic, a dispatch rejection
/// and a process crash all race to complete the same guard. The first one
/// wins and every later signal is logged and dropped.
#[derive(Debug)]
pub struct CompletionGuard {
    execution_id: String,
    finished: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl CompletionGuard {
    pub fn new(execution_id: impl Into<String>) -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let guard = Arc::new(Self {
            execution_id: execution_id.into(),
            finished: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        });
        (guard, rx)
    }

    /// Deliver `outcome` unless another one already has. Returns whether it won.
    pub fn complete(&self, outcome: Outcome) -> bool {
        if self.finished.swap(true, Ordering::AcqRel) {
            debug!(
                execution_id = %self.execution_id,
                signal = outcome.kind(),
                "response already sent, discarding signal"
            );
            return false;
        }

        let tx = match self.tx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = tx {
            if tx.send(outcome).is_err() {
                debug!(execution_id = %self.execution_id, "request abandoned before its outcome arrived");
            }
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }
}

const CALLBACK_DROPPED: u8 = 0b01;
const FUNCTION_RETURNED: u8 = 0b10;

/// Completion handle passed to callback-style functions.
///
/// Consumed on use. Dropping it without calling any method is a fault once
/// the function has also returned; a function that panics reports its panic
/// instead.
#[derive(Debug)]
pub struct Callback {
    guard: Arc<CompletionGuard>,
    state: Arc<AtomicU8>,
    invoked: bool,
}

/// The dispatcher's side of a [`Callback`], told when the function returns.
#[derive(Debug)]
pub(crate) struct CallbackWatch {
    guard: Arc<CompletionGuard>,
    state: Arc<AtomicU8>,
}

impl Callback {
    pub(crate) fn new(guard: Arc<CompletionGuard>) -> (Self, CallbackWatch) {
        let state = Arc::new(AtomicU8::new(0));
        let watch = CallbackWatch {
            guard: guard.clone(),
            state: state.clone(),
        };
        let callback = Self {
            guard,
            state,
            invoked: false,
        };
        (callback, watch)
    }

    pub fn done(mut self, result: anyhow::Result<Reply>) {
        self.invoked = true;
        self.guard.complete(Outcome::from_result(result));
    }

    pub fn ok(self, reply: impl Into<Reply>) {
        self.done(Ok(reply.into()));
    }

    pub fn err(self, error: impl Into<anyhow::Error>) {
        self.done(Err(error.into()));
    }
}

impl Drop for Callback {
    fn drop(&mut self) {
        if self.invoked {
            return;
        }
        // Whichever of drop and return comes second reports the fault.
        if self.state.fetch_or(CALLBACK_DROPPED, Ordering::AcqRel) & FUNCTION_RETURNED != 0 {
            self.guard
                .complete(Outcome::Fault(HandlerFault::CallbackDropped));
        }
    }
}

impl CallbackWatch {
    pub(crate) fn function_returned(self) {
        if self.state.fetch_or(FUNCTION_RETURNED, Ordering::AcqRel) & CALLBACK_DROPPED != 0 {
            self.guard
                .complete(Outcome::Fault(HandlerFault::CallbackDropped));
        }
    }
}
