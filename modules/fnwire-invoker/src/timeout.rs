//! Per-request timeout and cancellation.

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle a function receives with every invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    execution_id: Arc<str>,
    cancel: Option<CancellationToken>,
}

impl Invocation {
    pub fn new(execution_id: impl Into<Arc<str>>, cancel: Option<CancellationToken>) -> Self {
        Self {
            execution_id: execution_id.into(),
            cancel,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// `None` when the server runs without a timeout.
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Resolves once the request is cancelled. Never resolves without a token.
    pub async fn cancelled(&self) {
        match &self.cancel {
            Some(token) => token.cancelled().await,
            None => future::pending().await,
        }
    }
}

/// Why an execution was marked complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    TimedOut,
    ConnectionClosed,
    Finished,
}

/// Marks an execution complete exactly once and cancels its token when the
/// timer or a closed connection gets there first.
#[derive(Debug)]
pub struct TimeoutController {
    complete: AtomicBool,
    token: Option<CancellationToken>,
    timer: Mutex<Option<AbortHandle>>,
}

impl TimeoutController {
    /// Arm a token and timer when `timeout_ms > 0`. Must run inside a tokio runtime.
    pub fn arm(timeout_ms: u64) -> Arc<Self> {
        if timeout_ms == 0 {
            return Arc::new(Self {
                complete: AtomicBool::new(false),
                token: None,
                timer: Mutex::new(None),
            });
        }

        let controller = Arc::new(Self {
            complete: AtomicBool::new(false),
            token: Some(CancellationToken::new()),
            timer: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&controller);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            if let Some(controller) = weak.upgrade() {
                if controller.mark(Completion::TimedOut) {
                    info!(timeout_ms, "execution timed out, cancelling");
                }
            }
        });
        if let Ok(mut slot) = controller.timer.lock() {
            *slot = Some(handle.abort_handle());
        }
        controller
    }

    pub fn token(&self) -> Option<CancellationToken> {
        self.token.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Returns whether this call was the one that completed the execution.
    pub fn mark(&self, reason: Completion) -> bool {
        if self.complete.swap(true, Ordering::AcqRel) {
            return false;
        }

        if reason != Completion::TimedOut {
            let timer = match self.timer.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(timer) = timer {
                timer.abort();
            }
        }

        if let Some(token) = &self.token {
            if reason != Completion::Finished {
                debug!(?reason, "signalling cancellation");
                token.cancel();
            }
        }
        true
    }
}

/// Reports a closed connection when dropped before [`disarm`](Self::disarm).
///
/// Lives on the HTTP handler's stack, which hyper drops when the client goes away.
pub(crate) struct CloseWatch {
    controller: Arc<TimeoutController>,
    armed: bool,
}

impl CloseWatch {
    pub(crate) fn new(controller: Arc<TimeoutController>) -> Self {
        Self {
            controller,
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
        self.controller.mark(Completion::Finished);
    }
}

impl Drop for CloseWatch {
    fn drop(&mut self) {
        if self.armed && self.controller.mark(Completion::ConnectionClosed) {
            debug!("connection closed before the function completed");
        }
    }
}
