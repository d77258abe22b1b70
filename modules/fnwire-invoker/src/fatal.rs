//! Process-fatal conditions and the in-flight request registry.

use std::collections::HashMap;
use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::guard::CompletionGuard;
use crate::response::Outcome;

/// Exit status after a process-fatal condition.
pub const CRASH_EXIT_CODE: i32 = 16;

/// Time given to in-flight responses to flush before exiting.
pub const CRASH_FLUSH_GRACE: Duration = Duration::from_millis(250);

tokio::task_local! {
    /// Set for the lifetime of each function task. Holds the request id.
    pub(crate) static REQUEST_SCOPE: u64;
}

/// Whether the current task is running a function.
pub fn in_request_scope() -> bool {
    REQUEST_SCOPE.try_with(|_| ()).is_ok()
}

/// Requests that have not yet written a response.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    guards: Arc<Mutex<HashMap<u64, Arc<CompletionGuard>>>>,
    next_id: Arc<AtomicU64>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `guard` until the returned registration is dropped.
    pub fn register(&self, guard: Arc<CompletionGuard>) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.with_guards(|guards| {
            guards.insert(id, guard);
        });
        Registration {
            id,
            in_flight: self.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.with_guards(|guards| guards.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complete every in-flight request with a crash. Returns how many were reached.
    pub fn crash_all(&self, reason: &str) -> usize {
        let guards: Vec<_> = self.with_guards(|guards| guards.values().cloned().collect());
        guards
            .into_iter()
            .filter(|guard| guard.complete(Outcome::Crash(reason.to_string())))
            .count()
    }

    // Poisoning is ignored.
    fn with_guards<T>(&self, f: impl FnOnce(&mut HashMap<u64, Arc<CompletionGuard>>) -> T) -> T {
        let mut guards = match self.guards.lock() {
            Ok(guards) => guards,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guards)
    }
}

/// Removes its request from the registry on drop.
#[derive(Debug)]
pub struct Registration {
    id: u64,
    in_flight: InFlight,
}

impl Registration {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.in_flight.with_guards(|guards| {
            guards.remove(&self.id);
        });
    }
}

/// Treat panics outside the async runtime as process-fatal.
///
/// Panics on a runtime thread belong to some task, and the task's join handle
/// absorbs them: a function task turns its panic into that request's error
/// response, and a task a function spawned for itself fails alone. Serve loop
/// failures reach [`crash_and_exit`] through its own join handle.
pub fn install_panic_hook(in_flight: InFlight) {
    panic::set_hook(Box::new(move |info| {
        if in_request_scope() {
            debug!(panic = %info, "function panicked");
            return;
        }
        if on_runtime_thread() {
            warn!(panic = %info, "task panicked outside any request");
            return;
        }
        error!(panic = %info, "panic outside any request, shutting down");
        let crashed = in_flight.crash_all("the server crashed");
        warn!(crashed, "sent crash responses");
        std::thread::sleep(CRASH_FLUSH_GRACE);
        std::process::exit(CRASH_EXIT_CODE);
    }));
}

fn on_runtime_thread() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

/// Crash every in-flight request, give the responses a moment, then exit.
pub async fn crash_and_exit(in_flight: &InFlight, reason: &str) {
    let crashed = in_flight.crash_all(reason);
    error!(reason, crashed, "fatal condition, exiting");
    tokio::time::sleep(CRASH_FLUSH_GRACE).await;
    std::process::exit(CRASH_EXIT_CODE);
}

/// Resolves on SIGTERM or Ctrl-C with the signal's name.
pub async fn termination_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
