//! Outcomes of an invocation and how each one is written back over HTTP.

use std::fmt;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Number, Value};
use tracing::warn;

use crate::error::{HandlerFault, RequestError};

/// Carries `error` or `crash` on every failed response.
pub const STATUS_HEADER: HeaderName = HeaderName::from_static("x-google-status");

/// What an event or CloudEvent function produced on success.
pub enum Reply {
    /// `204 No Content`
    Empty,
    /// `200` with the JSON number as the body. Never read as a status code.
    Number(Number),
    /// `200` with a `text/plain` body
    Text(String),
    /// `200` with a JSON body, or `204` when serialization fails
    Json(Box<dyn erased_serde::Serialize + Send + Sync>),
}

impl Reply {
    pub fn json<T>(value: T) -> Self
    where
        T: serde::Serialize + Send + Sync + 'static,
    {
        Reply::Json(Box::new(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Reply::Text(value.into())
    }

    fn into_response(self) -> Response {
        match self {
            Reply::Empty => StatusCode::NO_CONTENT.into_response(),
            Reply::Number(n) => json_body(n.to_string().into_bytes()),
            Reply::Text(text) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response(),
            Reply::Json(value) => match serde_json::to_vec(value.as_ref()) {
                Ok(bytes) => json_body(bytes),
                Err(e) => {
                    warn!(error = %e, "could not serialize function result, replying without a body");
                    StatusCode::NO_CONTENT.into_response()
                }
            },
        }
    }
}

fn json_body(bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        bytes,
    )
        .into_response()
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Empty => f.write_str("Empty"),
            Reply::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Reply::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Reply::Json(_) => f.write_str("Json(..)"),
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Reply::Empty,
            Value::Number(n) => Reply::Number(n),
            other => Reply::Json(Box::new(other)),
        }
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Text(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Text(value.to_string())
    }
}

impl From<i64> for Reply {
    fn from(value: i64) -> Self {
        Reply::Number(value.into())
    }
}

impl From<u64> for Reply {
    fn from(value: u64) -> Self {
        Reply::Number(value.into())
    }
}

impl From<f64> for Reply {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Reply::Empty, Reply::Number)
    }
}

/// The single result the HTTP layer writes for one request.
#[derive(Debug)]
pub enum Outcome {
    Reply(Reply),
    /// HTTP functions build their own response
    Http(Response),
    Fault(HandlerFault),
    Rejected(RequestError),
    /// The process is going down
    Crash(String),
}

impl Outcome {
    pub fn from_result(result: anyhow::Result<Reply>) -> Self {
        match result {
            Ok(reply) => Outcome::Reply(reply),
            Err(e) => Outcome::Fault(HandlerFault::Failed(e)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Reply(_) | Outcome::Http(_) => "success",
            Outcome::Fault(_) => "fault",
            Outcome::Rejected(_) => "rejected",
            Outcome::Crash(_) => "crash",
        }
    }

    /// Encode the outcome. In production mode error bodies are left empty.
    pub fn into_response(self, production: bool) -> Response {
        match self {
            Outcome::Reply(reply) => reply.into_response(),
            Outcome::Http(response) => response,
            Outcome::Fault(fault) => {
                failure(StatusCode::INTERNAL_SERVER_ERROR, "error", fault.to_string(), production)
            }
            Outcome::Rejected(err) => failure(err.status(), "error", err.to_string(), production),
            Outcome::Crash(reason) => {
                failure(StatusCode::INTERNAL_SERVER_ERROR, "crash", reason, production)
            }
        }
    }
}

fn failure(status: StatusCode, marker: &'static str, message: String, production: bool) -> Response {
    let body = if production { String::new() } else { message };
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(STATUS_HEADER, HeaderValue::from_static(marker));
    response
}

impl From<Reply> for Outcome {
    fn from(reply: Reply) -> Self {
        Outcome::Reply(reply)
    }
}
