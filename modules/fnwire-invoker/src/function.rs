//! User function signatures.
//!
//! A function is registered as one variant of [`Function`], chosen by the
//! caller rather than guessed from the handler's shape.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use fnwire_events::{CloudEvent, EventContext};
use serde_json::Value;

use crate::error::ConfigError;
use crate::guard::Callback;
use crate::response::Reply;
use crate::timeout::Invocation;

/// Receives the raw HTTP request and builds its own response.
#[async_trait]
pub trait HttpFunction: Send + Sync + 'static {
    async fn call(&self, request: Request, invocation: Invocation) -> Result<Response>;
}

/// Receives legacy `(data, context)` and completes by returning.
#[async_trait]
pub trait EventFunction: Send + Sync + 'static {
    async fn call(&self, data: Value, context: EventContext, invocation: Invocation)
        -> Result<Reply>;
}

/// Receives legacy `(data, context)` and completes through its [`Callback`].
#[async_trait]
pub trait EventCallbackFunction: Send + Sync + 'static {
    async fn call(
        &self,
        data: Value,
        context: EventContext,
        invocation: Invocation,
        callback: Callback,
    );
}

/// Receives a CloudEvent and completes by returning.
#[async_trait]
pub trait CloudEventFunction: Send + Sync + 'static {
    async fn call(&self, event: CloudEvent, invocation: Invocation) -> Result<Reply>;
}

/// Receives a CloudEvent and completes through its [`Callback`].
#[async_trait]
pub trait CloudEventCallbackFunction: Send + Sync + 'static {
    async fn call(&self, event: CloudEvent, invocation: Invocation, callback: Callback);
}

#[async_trait]
impl<F, Fut> HttpFunction for F
where
    F: Fn(Request, Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send,
{
    async fn call(&self, request: Request, invocation: Invocation) -> Result<Response> {
        self(request, invocation).await
    }
}

#[async_trait]
impl<F, Fut> EventFunction for F
where
    F: Fn(Value, EventContext, Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply>> + Send,
{
    async fn call(
        &self,
        data: Value,
        context: EventContext,
        invocation: Invocation,
    ) -> Result<Reply> {
        self(data, context, invocation).await
    }
}

#[async_trait]
impl<F, Fut> EventCallbackFunction for F
where
    F: Fn(Value, EventContext, Invocation, Callback) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    async fn call(
        &self,
        data: Value,
        context: EventContext,
        invocation: Invocation,
        callback: Callback,
    ) {
        self(data, context, invocation, callback).await
    }
}

#[async_trait]
impl<F, Fut> CloudEventFunction for F
where
    F: Fn(CloudEvent, Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply>> + Send,
{
    async fn call(&self, event: CloudEvent, invocation: Invocation) -> Result<Reply> {
        self(event, invocation).await
    }
}

#[async_trait]
impl<F, Fut> CloudEventCallbackFunction for F
where
    F: Fn(CloudEvent, Invocation, Callback) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    async fn call(&self, event: CloudEvent, invocation: Invocation, callback: Callback) {
        self(event, invocation, callback).await
    }
}

struct SyncEvent<F>(F);

#[async_trait]
impl<F> EventFunction for SyncEvent<F>
where
    F: Fn(Value, EventContext) -> Result<Reply> + Send + Sync + 'static,
{
    async fn call(&self, data: Value, context: EventContext, _: Invocation) -> Result<Reply> {
        (self.0)(data, context)
    }
}

struct SyncCloudEvent<F>(F);

#[async_trait]
impl<F> CloudEventFunction for SyncCloudEvent<F>
where
    F: Fn(CloudEvent) -> Result<Reply> + Send + Sync + 'static,
{
    async fn call(&self, event: CloudEvent, _: Invocation) -> Result<Reply> {
        (self.0)(event)
    }
}

/// The registered function, tagged with its calling convention.
#[derive(Clone)]
pub enum Function {
    Http(Arc<dyn HttpFunction>),
    Event(Arc<dyn EventFunction>),
    EventWithCallback(Arc<dyn EventCallbackFunction>),
    CloudEvent(Arc<dyn CloudEventFunction>),
    CloudEventWithCallback(Arc<dyn CloudEventCallbackFunction>),
}

impl Function {
    pub fn http<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Function::Http(Arc::new(f))
    }

    pub fn event<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, EventContext, Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Function::Event(Arc::new(f))
    }

    /// A plain closure whose return value is the result.
    pub fn event_sync<F>(f: F) -> Self
    where
        F: Fn(Value, EventContext) -> Result<Reply> + Send + Sync + 'static,
    {
        Function::Event(Arc::new(SyncEvent(f)))
    }

    pub fn event_with_callback<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, EventContext, Invocation, Callback) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Function::EventWithCallback(Arc::new(f))
    }

    pub fn cloud_event<F, Fut>(f: F) -> Self
    where
        F: Fn(CloudEvent, Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Function::CloudEvent(Arc::new(f))
    }

    pub fn cloud_event_sync<F>(f: F) -> Self
    where
        F: Fn(CloudEvent) -> Result<Reply> + Send + Sync + 'static,
    {
        Function::CloudEvent(Arc::new(SyncCloudEvent(f)))
    }

    pub fn cloud_event_with_callback<F, Fut>(f: F) -> Self
    where
        F: Fn(CloudEvent, Invocation, Callback) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Function::CloudEventWithCallback(Arc::new(f))
    }

    pub fn signature(&self) -> SignatureType {
        match self {
            Function::Http(_) => SignatureType::Http,
            Function::Event(_) | Function::EventWithCallback(_) => SignatureType::Event,
            Function::CloudEvent(_) | Function::CloudEventWithCallback(_) => {
                SignatureType::CloudEvent
            }
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Function::Http(_) => "Http",
            Function::Event(_) => "Event",
            Function::EventWithCallback(_) => "EventWithCallback",
            Function::CloudEvent(_) => "CloudEvent",
            Function::CloudEventWithCallback(_) => "CloudEventWithCallback",
        };
        write!(f, "Function::{variant}")
    }
}

/// Calling convention family, as named by `FUNCTION_SIGNATURE_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Http,
    Event,
    CloudEvent,
}

impl SignatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureType::Http => "http",
            SignatureType::Event => "event",
            SignatureType::CloudEvent => "cloudevent",
        }
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(SignatureType::Http),
            "event" => Ok(SignatureType::Event),
            "cloudevent" => Ok(SignatureType::CloudEvent),
            _ => Err(ConfigError::Invalid {
                key: "FUNCTION_SIGNATURE_TYPE",
                expected: "one of http, event, cloudevent",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_type_parses() {
        assert_eq!("http".parse::<SignatureType>(), Ok(SignatureType::Http));
        assert_eq!("CloudEvent".parse::<SignatureType>(), Ok(SignatureType::CloudEvent));
        assert!("background".parse::<SignatureType>().is_err());
    }

    #[test]
    fn variants_report_their_signature() {
        let f = Function::event_sync(|_, _| Ok(Reply::Empty));
        assert_eq!(f.signature(), SignatureType::Event);

        let f = Function::cloud_event_with_callback(|_, _, callback: Callback| async move {
            callback.ok(());
        });
        assert_eq!(f.signature(), SignatureType::CloudEvent);
    }

    #[tokio::test]
    async fn sync_wrapper_returns_directly() {
        let f = Function::cloud_event_sync(|event| Ok(Reply::text(event.id)));
        let Function::CloudEvent(f) = f else {
            panic!("expected a CloudEvent function");
        };
        let event = CloudEvent::new("abc", "//svc/x", "t");
        let reply = f.call(event, Invocation::new("e", None)).await.unwrap();
        assert!(matches!(reply, Reply::Text(id) if id == "abc"));
    }
}
