//! Raw Pub/Sub push payloads, rewritten into legacy background events.

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

use crate::model::{EventContext, LegacyEvent, Resource, ResourceObject};
use crate::tables::{PUBSUB_MESSAGE_TYPE, PUBSUB_PUBLISH_TYPE, PUBSUB_SERVICE};

static TOPIC_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"projects/[^/?]+/topics/[^/?]+").unwrap());

/// True when `body` has the shape of a Pub/Sub push subscription delivery.
pub fn is_push_payload(body: &Value) -> bool {
    let is_str = |v: Option<&Value>| v.is_some_and(Value::is_string);
    let message = body.get("message");
    is_str(body.get("subscription"))
        && is_str(message.and_then(|m| m.get("data")))
        && is_str(message.and_then(|m| m.get("messageId")))
}

/// Topic resource name recovered from the push endpoint's URL path.
pub fn topic_from_path(path: &str) -> Option<String> {
    TOPIC_PATH_RE.find(path).map(|m| m.as_str().to_string())
}

/// Rewrite a push payload into a legacy Pub/Sub publish event.
///
/// Returns `None` when `body` is not a push payload.
pub fn push_to_legacy(body: &Value, path: &str) -> Option<LegacyEvent> {
    if !is_push_payload(body) {
        return None;
    }
    let message = body.get("message")?;
    let message_id = message.get("messageId")?.as_str()?.to_string();

    let timestamp = message
        .get("publishTime")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

    let attributes = match message.get("attributes") {
        Some(Value::Object(attrs)) => Value::Object(attrs.clone()),
        _ => Value::Object(Map::new()),
    };

    let context = EventContext {
        event_id: Some(message_id),
        timestamp: Some(timestamp),
        event_type: Some(PUBSUB_PUBLISH_TYPE.to_string()),
        resource: Some(Resource::Structured(ResourceObject {
            service: Some(PUBSUB_SERVICE.to_string()),
            name: topic_from_path(path),
            r#type: Some(PUBSUB_MESSAGE_TYPE.to_string()),
        })),
        extra: Map::new(),
    };

    let data = json!({
        "@type": PUBSUB_MESSAGE_TYPE,
        "data": message.get("data").cloned().unwrap_or(Value::Null),
        "attributes": attributes,
    });

    Some(LegacyEvent::new(context, Some(data)))
}
