//! Function invocation over HTTP.
//!
//! Takes one registered [`Function`], classifies each inbound request with
//! `fnwire-events`, converts it to the function's format, and runs the
//! function in its own task. Every request gets exactly one response, whether
//! the function returns, calls back, fails, panics, or the process goes down.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fatal;
pub mod function;
pub mod guard;
pub mod response;
pub mod server;
pub mod timeout;

pub use config::InvokerConfig;
pub use dispatch::{InvokeOptions, Invoker, EXECUTION_ID_HEADER};
pub use error::{ConfigError, HandlerFault, RequestError};
pub use fatal::{InFlight, CRASH_EXIT_CODE};
pub use function::{
    CloudEventCallbackFunction, CloudEventFunction, EventCallbackFunction, EventFunction, Function,
    HttpFunction, SignatureType,
};
pub use guard::{Callback, CompletionGuard};
pub use response::{Outcome, Reply, STATUS_HEADER};
pub use server::{router, serve};
pub use timeout::Invocation;
