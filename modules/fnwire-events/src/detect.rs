//! Wire-format detection.
//!
//! Rules run in a fixed order: binary CloudEvent, structured CloudEvent, raw
//! Pub/Sub push, then legacy background event as the fallback. A request that
//! fits none of them is a [`DetectionError`], never a silent default.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::downcast::downcast;
use crate::error::{ConversionResult, DetectionError};
use crate::model::{CloudEvent, EventContext, LegacyEvent};
use crate::push::push_to_legacy;
use crate::upcast::upcast;

/// Headers that together mark a binary-mode CloudEvent.
pub const REQUIRED_CE_HEADERS: [&str; 4] = ["ce-type", "ce-specversion", "ce-source", "ce-id"];

const REQUIRED_CE_ATTRIBUTES: [&str; 4] = ["specversion", "type", "source", "id"];

/// The `ce-*` headers of a request, keyed by lowercased name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CeHeaders(BTreeMap<String, String>);

impl CeHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a header. Names are matched case-insensitively; anything not
    /// starting with `ce-` is ignored.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        if name.starts_with("ce-") {
            self.0.insert(name, value.into());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn attribute(&self, attr: &str) -> Option<String> {
        self.get(&format!("ce-{attr}")).map(str::to_string)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for CeHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = CeHeaders::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

/// Which encoding a request arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    BinaryCloudEvent,
    StructuredCloudEvent,
    PubsubPush,
    LegacyBackground,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::BinaryCloudEvent => "binary_cloudevent",
            WireFormat::StructuredCloudEvent => "structured_cloudevent",
            WireFormat::PubsubPush => "pubsub_push",
            WireFormat::LegacyBackground => "legacy_background",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request, already normalized to one of the two event shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    CloudEvent { event: CloudEvent, format: WireFormat },
    Legacy { event: LegacyEvent, format: WireFormat },
}

impl Inbound {
    pub fn format(&self) -> WireFormat {
        match self {
            Inbound::CloudEvent { format, .. } | Inbound::Legacy { format, .. } => *format,
        }
    }

    /// The event as a CloudEvent, upcasting a legacy event if needed.
    pub fn into_cloud_event(self) -> ConversionResult<CloudEvent> {
        match self {
            Inbound::CloudEvent { event, .. } => Ok(event),
            Inbound::Legacy { event, .. } => upcast(event),
        }
    }

    /// The event in legacy shape, downcasting a CloudEvent if needed.
    pub fn into_legacy(self) -> ConversionResult<LegacyEvent> {
        match self {
            Inbound::CloudEvent { event, .. } => downcast(event),
            Inbound::Legacy { event, .. } => Ok(event),
        }
    }
}

/// Classify a request from its `ce-*` headers, parsed body, and URL path.
pub fn detect(
    headers: &CeHeaders,
    body: Option<Value>,
    path: &str,
) -> Result<Inbound, DetectionError> {
    if let Some(mut event) = binary_cloud_event(headers)? {
        event.data = body;
        return Ok(Inbound::CloudEvent {
            event,
            format: WireFormat::BinaryCloudEvent,
        });
    }

    let Some(Value::Object(body)) = body else {
        return Err(DetectionError::NotAnObject);
    };

    if let Some(event) = structured_cloud_event(&body)? {
        return Ok(Inbound::CloudEvent {
            event,
            format: WireFormat::StructuredCloudEvent,
        });
    }

    let body = Value::Object(body);
    if let Some(event) = push_to_legacy(&body, path) {
        return Ok(Inbound::Legacy {
            event,
            format: WireFormat::PubsubPush,
        });
    }

    Ok(Inbound::Legacy {
        event: legacy_event(body)?,
        format: WireFormat::LegacyBackground,
    })
}

fn binary_cloud_event(headers: &CeHeaders) -> Result<Option<CloudEvent>, DetectionError> {
    let missing: Vec<&'static str> = REQUIRED_CE_HEADERS
        .into_iter()
        .filter(|h| headers.get(h).is_none())
        .collect();
    if missing.len() == REQUIRED_CE_HEADERS.len() {
        return Ok(None);
    }
    if !missing.is_empty() {
        return Err(DetectionError::IncompleteBinary { missing });
    }

    Ok(Some(CloudEvent {
        id: headers.attribute("id").unwrap_or_default(),
        source: headers.attribute("source").unwrap_or_default(),
        specversion: headers.attribute("specversion").unwrap_or_default(),
        r#type: headers.attribute("type").unwrap_or_default(),
        time: headers.attribute("time"),
        subject: headers.attribute("subject"),
        dataschema: headers.attribute("dataschema"),
        datacontenttype: headers.attribute("datacontenttype"),
        traceparent: headers.attribute("traceparent"),
        data: None,
    }))
}

fn structured_cloud_event(body: &Map<String, Value>) -> Result<Option<CloudEvent>, DetectionError> {
    let present: Vec<&str> = REQUIRED_CE_ATTRIBUTES
        .into_iter()
        .filter(|attr| body.contains_key(*attr))
        .collect();

    if present.len() < REQUIRED_CE_ATTRIBUTES.len() {
        if body.contains_key("specversion") {
            let missing: Vec<&str> = REQUIRED_CE_ATTRIBUTES
                .into_iter()
                .filter(|attr| !present.contains(attr))
                .collect();
            return Err(DetectionError::InvalidCloudEvent(format!(
                "missing {}",
                missing.join(", ")
            )));
        }
        return Ok(None);
    }

    let event: CloudEvent = serde_json::from_value(Value::Object(body.clone()))
        .map_err(|e| DetectionError::InvalidCloudEvent(e.to_string()))?;

    for (attr, value) in [
        ("id", &event.id),
        ("source", &event.source),
        ("specversion", &event.specversion),
        ("type", &event.r#type),
    ] {
        if value.is_empty() {
            return Err(DetectionError::InvalidCloudEvent(format!("empty {attr}")));
        }
    }
    Ok(Some(event))
}

fn legacy_event(body: Value) -> Result<LegacyEvent, DetectionError> {
    let Value::Object(mut body) = body else {
        return Err(DetectionError::NotAnObject);
    };
    let data = body.remove("data");
    let context = match body.remove("context") {
        Some(ctx @ Value::Object(_)) => ctx,
        Some(_) => {
            return Err(DetectionError::MalformedContext(
                "context must be an object".into(),
            ))
        }
        None => Value::Object(body),
    };
    let context: EventContext = serde_json::from_value(context)
        .map_err(|e| DetectionError::MalformedContext(e.to_string()))?;
    Ok(LegacyEvent::new(context, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resource;
    use serde_json::json;

    fn binary_headers() -> CeHeaders {
        [
            ("Ce-Type", "com.example.test"),
            ("ce-specversion", "1.0"),
            ("CE-SOURCE", "//example/source"),
            ("ce-id", "abc"),
            ("ce-subject", "things/1"),
            ("content-type", "application/json"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let headers = binary_headers();
        assert_eq!(headers.get("ce-type"), Some("com.example.test"));
        assert_eq!(headers.get("CE-ID"), Some("abc"));
        assert_eq!(headers.get("content-type"), None);
    }

    #[test]
    fn binary_mode_takes_body_as_data() {
        let inbound = detect(&binary_headers(), Some(json!({"hello": "world"})), "/").unwrap();
        assert_eq!(inbound.format(), WireFormat::BinaryCloudEvent);
        let Inbound::CloudEvent { event, .. } = inbound else {
            panic!("expected a CloudEvent");
        };
        assert_eq!(event.id, "abc");
        assert_eq!(event.subject.as_deref(), Some("things/1"));
        assert_eq!(event.time, None);
        assert_eq!(event.data, Some(json!({"hello": "world"})));
    }

    #[test]
    fn binary_mode_wins_over_a_structured_body() {
        let body = json!({"specversion": "1.0", "type": "t", "source": "s", "id": "body-id"});
        let inbound = detect(&binary_headers(), Some(body.clone()), "/").unwrap();
        let Inbound::CloudEvent { event, format } = inbound else {
            panic!("expected a CloudEvent");
        };
        assert_eq!(format, WireFormat::BinaryCloudEvent);
        assert_eq!(event.id, "abc");
        assert_eq!(event.data, Some(body));
    }

    #[test]
    fn partial_binary_headers_are_rejected() {
        let headers: CeHeaders = [("ce-type", "t"), ("ce-source", "s")].into_iter().collect();
        let err = detect(&headers, Some(json!({})), "/").unwrap_err();
        assert_eq!(
            err,
            DetectionError::IncompleteBinary {
                missing: vec!["ce-specversion", "ce-id"]
            }
        );
    }

    #[test]
    fn structured_mode_is_validated() {
        let body = json!({
            "specversion": "1.0",
            "type": "com.example.test",
            "source": "//example/source",
            "id": "1",
            "data": {"n": 1}
        });
        let inbound = detect(&CeHeaders::new(), Some(body), "/").unwrap();
        assert_eq!(inbound.format(), WireFormat::StructuredCloudEvent);

        let missing_id = json!({"specversion": "1.0", "type": "t", "source": "s"});
        assert!(matches!(
            detect(&CeHeaders::new(), Some(missing_id), "/"),
            Err(DetectionError::InvalidCloudEvent(_))
        ));

        let numeric_id = json!({"specversion": "1.0", "type": "t", "source": "s", "id": 5});
        assert!(matches!(
            detect(&CeHeaders::new(), Some(numeric_id), "/"),
            Err(DetectionError::InvalidCloudEvent(_))
        ));
    }

    #[test]
    fn push_payload_is_detected_before_legacy() {
        let body = json!({
            "subscription": "projects/p/subscriptions/s",
            "message": {"data": "e30=", "messageId": "9"}
        });
        let inbound = detect(&CeHeaders::new(), Some(body), "/projects/p/topics/t").unwrap();
        assert_eq!(inbound.format(), WireFormat::PubsubPush);
    }

    #[test]
    fn nested_and_flattened_legacy_normalize_alike() {
        let nested = json!({
            "context": {
                "eventId": "1",
                "timestamp": "2020-01-01T00:00:00.000Z",
                "eventType": "google.pubsub.topic.publish",
                "resource": "projects/p/topics/t"
            },
            "data": {"x": 1}
        });
        let flattened = json!({
            "eventId": "1",
            "timestamp": "2020-01-01T00:00:00.000Z",
            "eventType": "google.pubsub.topic.publish",
            "resource": "projects/p/topics/t",
            "data": {"x": 1}
        });
        let a = detect(&CeHeaders::new(), Some(nested), "/").unwrap();
        let b = detect(&CeHeaders::new(), Some(flattened), "/").unwrap();
        assert_eq!(a, b);
        let Inbound::Legacy { event, format } = a else {
            panic!("expected a legacy event");
        };
        assert_eq!(format, WireFormat::LegacyBackground);
        assert_eq!(
            event.context.resource,
            Some(Resource::Path("projects/p/topics/t".into()))
        );
        assert_eq!(event.data, Some(json!({"x": 1})));
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        assert_eq!(
            detect(&CeHeaders::new(), Some(json!([1, 2])), "/"),
            Err(DetectionError::NotAnObject)
        );
        assert_eq!(
            detect(&CeHeaders::new(), None, "/"),
            Err(DetectionError::NotAnObject)
        );
        assert!(matches!(
            detect(&CeHeaders::new(), Some(json!({"context": "nope"})), "/"),
            Err(DetectionError::MalformedContext(_))
        ));
    }
}
