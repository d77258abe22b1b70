//! Invocation dispatch: classify the request, shape it for the function,
//! run the function in its own task, and write exactly one response.

use std::any::Any;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use fnwire_events::{detect, CeHeaders, CloudEvent, EventContext, Inbound};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::error::{HandlerFault, RequestError};
use crate::fatal::{InFlight, REQUEST_SCOPE};
use crate::function::Function;
use crate::guard::{Callback, CompletionGuard};
use crate::response::Outcome;
use crate::timeout::{CloseWatch, Invocation, TimeoutController};

/// Request and response header carrying the execution id.
pub const EXECUTION_ID_HEADER: HeaderName = HeaderName::from_static("function-execution-id");

pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// `0` disables the timeout and cancellation token.
    pub timeout_ms: u64,
    /// Hide error messages from response bodies and stack traces from logs.
    pub production: bool,
    pub max_body_bytes: usize,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            production: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Runs one registered function for every request it is handed.
pub struct Invoker {
    function: Function,
    options: InvokeOptions,
    in_flight: InFlight,
}

type Work = BoxFuture<'static, Option<Outcome>>;

impl Invoker {
    pub fn new(function: Function, options: InvokeOptions) -> Self {
        Self {
            function,
            options,
            in_flight: InFlight::new(),
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Handle one request end to end. Always produces a response; the
    /// execution id is echoed on it.
    pub async fn handle(&self, request: Request) -> Response {
        let execution_id = execution_id(request.headers());
        let span = info_span!(
            "invocation",
            execution_id = %execution_id,
            signature = %self.function.signature(),
        );

        let mut response = self.invoke(request, &execution_id).instrument(span).await;
        if let Ok(value) = HeaderValue::from_str(&execution_id) {
            response.headers_mut().insert(EXECUTION_ID_HEADER, value);
        }
        response
    }

    async fn invoke(&self, request: Request, execution_id: &str) -> Response {
        if !matches!(self.function, Function::Http(_)) {
            if let Some(status) = reject_for_event_function(&request) {
                debug!(%status, method = %request.method(), path = request.uri().path(), "not an event delivery");
                return status.into_response();
            }
        }

        let (guard, outcome_rx) = CompletionGuard::new(execution_id);
        let registration = self.in_flight.register(guard.clone());
        let controller = TimeoutController::arm(self.options.timeout_ms);
        let close_watch = CloseWatch::new(controller.clone());
        let invocation = Invocation::new(execution_id, controller.token());

        match self.prepare(request, invocation, &guard).await {
            Ok(work) => spawn_isolated(registration.id(), guard.clone(), work),
            Err(err) => {
                guard.complete(Outcome::Rejected(err));
            }
        }

        let outcome = outcome_rx
            .await
            .unwrap_or(Outcome::Fault(HandlerFault::Aborted));
        close_watch.disarm();
        drop(registration);

        self.log_outcome(&outcome);
        outcome.into_response(self.options.production)
    }

    /// Shape the request for the function's signature. Nothing runs yet.
    async fn prepare(
        &self,
        request: Request,
        invocation: Invocation,
        guard: &Arc<CompletionGuard>,
    ) -> Result<Work, RequestError> {
        let work = match &self.function {
            Function::Http(f) => {
                let f = f.clone();
                async move {
                    Some(match f.call(request, invocation).await {
                        Ok(response) => Outcome::Http(response),
                        Err(e) => Outcome::Fault(HandlerFault::Failed(e)),
                    })
                }
                .boxed()
            }
            Function::Event(f) => {
                let (data, context) = self.legacy_input(request).await?;
                let f = f.clone();
                async move { Some(Outcome::from_result(f.call(data, context, invocation).await)) }
                    .boxed()
            }
            Function::EventWithCallback(f) => {
                let (data, context) = self.legacy_input(request).await?;
                let f = f.clone();
                let (callback, watch) = Callback::new(guard.clone());
                async move {
                    f.call(data, context, invocation, callback).await;
                    watch.function_returned();
                    None
                }
                .boxed()
            }
            Function::CloudEvent(f) => {
                let event = self.cloud_event_input(request).await?;
                let f = f.clone();
                async move { Some(Outcome::from_result(f.call(event, invocation).await)) }.boxed()
            }
            Function::CloudEventWithCallback(f) => {
                let event = self.cloud_event_input(request).await?;
                let f = f.clone();
                let (callback, watch) = Callback::new(guard.clone());
                async move {
                    f.call(event, invocation, callback).await;
                    watch.function_returned();
                    None
                }
                .boxed()
            }
        };
        Ok(work)
    }

    async fn legacy_input(&self, request: Request) -> Result<(Value, EventContext), RequestError> {
        let event = self.classify(request).await?.into_legacy()?;
        Ok((event.data.unwrap_or(Value::Null), event.context))
    }

    async fn cloud_event_input(&self, request: Request) -> Result<CloudEvent, RequestError> {
        Ok(self.classify(request).await?.into_cloud_event()?)
    }

    async fn classify(&self, request: Request) -> Result<Inbound, RequestError> {
        let (parts, body) = request.into_parts();
        let ce_headers: CeHeaders = parts
            .headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
            .collect();

        let bytes = axum::body::to_bytes(body, self.options.max_body_bytes)
            .await
            .map_err(|e| RequestError::Body(e.to_string()))?;
        let body = parse_body(&parts.headers, &bytes)?;

        let inbound = detect(&ce_headers, body, parts.uri.path())?;
        debug!(format = %inbound.format(), "classified event");
        Ok(inbound)
    }

    fn log_outcome(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Fault(fault) if self.options.production => {
                error!(error = %fault, "function failed")
            }
            Outcome::Fault(fault) => error!(error = ?fault, "function failed"),
            Outcome::Rejected(err) => warn!(error = %err, "request rejected"),
            Outcome::Crash(reason) => error!(reason = %reason, "request crashed"),
            Outcome::Reply(_) | Outcome::Http(_) => debug!("function completed"),
        }
    }
}

/// Run `work` in its own task so a panic only fails this request.
fn spawn_isolated(request_id: u64, guard: Arc<CompletionGuard>, work: Work) {
    let task = tokio::spawn(REQUEST_SCOPE.scope(request_id, work.instrument(Span::current())));
    tokio::spawn(async move {
        let outcome = match task.await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return,
            Err(e) if e.is_panic() => {
                Outcome::Fault(HandlerFault::Panicked(panic_message(e.into_panic())))
            }
            Err(_) => Outcome::Fault(HandlerFault::Aborted),
        };
        guard.complete(outcome);
    });
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn reject_for_event_function(request: &Request) -> Option<StatusCode> {
    let path = request.uri().path();
    if request.method() == Method::GET && matches!(path, "/favicon.ico" | "/robots.txt") {
        return Some(StatusCode::NOT_FOUND);
    }
    if request.method() != Method::POST {
        return Some(StatusCode::METHOD_NOT_ALLOWED);
    }
    None
}

fn execution_id(headers: &HeaderMap) -> String {
    headers
        .get(EXECUTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Empty ⇒ `None`; JSON ⇒ the value; otherwise UTF-8 text as a JSON string,
/// unless the request claimed to be JSON.
fn parse_body(headers: &HeaderMap, bytes: &[u8]) -> Result<Option<Value>, RequestError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) if declares_json(headers) => Err(RequestError::Body(format!("invalid JSON: {e}"))),
        Err(_) => String::from_utf8(bytes.to_vec())
            .map(|text| Some(Value::String(text)))
            .map_err(|_| RequestError::Body("body is neither JSON nor UTF-8 text".to_string())),
    }
}

fn declares_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde_json::json;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn empty_body_is_none() {
        assert_eq!(parse_body(&HeaderMap::new(), b"").unwrap(), None);
    }

    #[test]
    fn json_body_parses() {
        assert_eq!(
            parse_body(&json_headers(), br#"{"a":1}"#).unwrap(),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn text_body_becomes_a_string() {
        assert_eq!(
            parse_body(&HeaderMap::new(), b"hello").unwrap(),
            Some(Value::String("hello".into()))
        );
    }

    #[test]
    fn declared_json_must_parse() {
        assert!(matches!(
            parse_body(&json_headers(), b"{nope"),
            Err(RequestError::Body(_))
        ));
    }

    #[test]
    fn supplied_execution_id_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(EXECUTION_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(execution_id(&headers), "abc-123");
        assert_eq!(execution_id(&HeaderMap::new()).len(), 36);
    }

    #[test]
    fn event_functions_only_take_posts() {
        let request = |method: Method, path: &str| {
            axum::http::Request::builder()
                .method(method)
                .uri(path)
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(
            reject_for_event_function(&request(Method::GET, "/favicon.ico")),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            reject_for_event_function(&request(Method::GET, "/robots.txt")),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            reject_for_event_function(&request(Method::PUT, "/")),
            Some(StatusCode::METHOD_NOT_ALLOWED)
        );
        assert_eq!(reject_for_event_function(&request(Method::POST, "/")), None);
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42)), "non-string panic payload");
    }
}
