//! In-memory event shapes. Built fresh per request and never shared.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CloudEvents spec version stamped on every event this crate produces.
pub const SPEC_VERSION: &str = "1.0";

/// The canonical event, in CloudEvents v1.0 structured JSON form.
///
/// Optional attributes are omitted when serialized rather than written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    pub id: String,
    pub source: String,
    pub specversion: String,
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataschema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CloudEvent {
    pub fn new(id: impl Into<String>, source: impl Into<String>, r#type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            specversion: SPEC_VERSION.to_string(),
            r#type: r#type.into(),
            time: None,
            subject: None,
            dataschema: None,
            datacontenttype: None,
            traceparent: None,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// A pre-CloudEvents background event, always in nested form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyEvent {
    pub context: EventContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LegacyEvent {
    pub fn new(context: EventContext, data: Option<Value>) -> Self {
        Self { context, data }
    }
}

/// Context half of a legacy event.
///
/// Fields a flattened body carried beyond the four known ones are kept in
/// `extra` so a legacy function sees the context it was sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Legacy `resource`: either a bare path or a `{service, name, type}` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resource {
    Path(String),
    Structured(ResourceObject),
}

impl Resource {
    /// The resource path, whichever shape carries it.
    pub fn name(&self) -> Option<&str> {
        match self {
            Resource::Path(path) => Some(path.as_str()),
            Resource::Structured(obj) => obj.name.as_deref(),
        }
    }

    /// The owning service, only known for the structured shape.
    pub fn service(&self) -> Option<&str> {
        match self {
            Resource::Path(_) => None,
            Resource::Structured(obj) => obj.service.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}
