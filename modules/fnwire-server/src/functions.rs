//! Built-in functions, selected by `FUNCTION_TARGET`.

use std::time::Duration;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use fnwire_events::{CloudEvent, EventContext};
use fnwire_invoker::{Function, Invocation, Reply};
use serde_json::{json, Value};
use tracing::info;

pub const TARGETS: &[&str] = &[
    "helloHttp",
    "helloEvent",
    "helloCloudEvent",
    "echoEvent",
    "echoCloudEvent",
    "waitForCancel",
];

pub fn lookup(target: &str) -> Option<Function> {
    let function = match target {
        "helloHttp" => Function::http(hello_http),
        "helloEvent" => Function::event(hello_event),
        "helloCloudEvent" => Function::cloud_event(hello_cloud_event),
        "echoEvent" => Function::event_sync(|data, context| {
            Ok(Reply::json(json!({"data": data, "context": context})))
        }),
        "echoCloudEvent" => Function::cloud_event_sync(|event| Ok(Reply::json(event))),
        "waitForCancel" => Function::cloud_event(wait_for_cancel),
        _ => return None,
    };
    Some(function)
}

async fn hello_http(request: Request, _: Invocation) -> anyhow::Result<Response> {
    let name = request
        .uri()
        .query()
        .and_then(|q| q.split('&').find_map(|pair| pair.strip_prefix("name=")))
        .filter(|name| !name.is_empty())
        .unwrap_or("World");
    Ok(format!("Hello, {name}!").into_response())
}

async fn hello_event(data: Value, context: EventContext, _: Invocation) -> anyhow::Result<Reply> {
    info!(
        event_id = ?context.event_id,
        event_type = ?context.event_type,
        resource = ?context.resource.as_ref().and_then(|r| r.name()),
        has_data = !data.is_null(),
        "received event"
    );
    Ok(Reply::Empty)
}

async fn hello_cloud_event(event: CloudEvent, _: Invocation) -> anyhow::Result<Reply> {
    info!(id = %event.id, ce_type = %event.r#type, source = %event.source, "received CloudEvent");
    Ok(Reply::Empty)
}

async fn wait_for_cancel(_: CloudEvent, invocation: Invocation) -> anyhow::Result<Reply> {
    tokio::select! {
        _ = invocation.cancelled() => Ok(Reply::text("cancelled")),
        _ = tokio::time::sleep(Duration::from_secs(10)) => Ok(Reply::text("finished")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use fnwire_invoker::{router, InvokeOptions, Invoker};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn call(target: &str, request: axum::http::Request<Body>) -> (StatusCode, String) {
        let function = lookup(target).unwrap();
        let app = router(Arc::new(Invoker::new(function, InvokeOptions::default())));
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn every_target_resolves() {
        for target in TARGETS {
            assert!(lookup(target).is_some(), "{target}");
        }
        assert!(lookup("nope").is_none());
    }

    #[tokio::test]
    async fn hello_http_greets() {
        let request = axum::http::Request::builder()
            .uri("/?name=Ada")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call("helloHttp", request).await, (StatusCode::OK, "Hello, Ada!".into()));
    }

    #[tokio::test]
    async fn echo_cloud_event_returns_the_upcast_event() {
        let body = json!({
            "context": {
                "eventId": "7",
                "timestamp": "2020-09-24T10:57:28.453Z",
                "eventType": "providers/cloud.firestore/eventTypes/document.write",
                "resource": "projects/p/databases/(default)/documents/c/d"
            },
            "data": {"value": {}}
        });
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = call("echoCloudEvent", request).await;
        assert_eq!(status, StatusCode::OK);
        let event: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(event["type"], "google.cloud.firestore.document.v1.written");
        assert_eq!(
            event["source"],
            "//firestore.googleapis.com/projects/p/databases/(default)/documents/c/d"
        );
    }
}
