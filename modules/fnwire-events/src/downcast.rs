//! CloudEvent → legacy background event.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{ConversionError, ConversionResult};
use crate::model::{CloudEvent, EventContext, LegacyEvent, Resource, ResourceObject};
use crate::tables::{
    self, FIREBASE_AUTH_METADATA_RENAMES, FIREBASE_AUTH_SERVICE, PUBSUB_MESSAGE_TYPE,
    PUBSUB_SERVICE, STORAGE_SERVICE,
};
use crate::upcast::rename_metadata;

static SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^//([^/]+)/(.+)$").unwrap());

/// Split a CloudEvent `source` into `(service, name)`.
pub fn parse_source(source: &str) -> ConversionResult<(&str, &str)> {
    SOURCE_RE
        .captures(source)
        .and_then(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .ok_or_else(|| ConversionError::MalformedSource(source.to_string()))
}

/// Convert a CloudEvent into the legacy `{context, data}` shape.
///
/// Only attributes with a legacy equivalent survive. `subject` is folded back
/// into the resource path for services with a resource pattern and dropped
/// for the rest.
pub fn downcast(event: CloudEvent) -> ConversionResult<LegacyEvent> {
    let legacy_type = tables::legacy_type(&event.r#type)
        .ok_or_else(|| ConversionError::UnknownCloudEventType(event.r#type.clone()))?;

    let (service, name) = parse_source(&event.source)?;
    let path = match (tables::resource_pattern(service), event.subject.as_deref()) {
        (Some(_), Some(subject)) if !subject.is_empty() => format!("{name}/{subject}"),
        _ => name.to_string(),
    };

    if let Some(None) = tables::split_resource(service, &path) {
        return Err(ConversionError::ResourceMismatch {
            service: service.to_string(),
            resource: path,
        });
    }

    let mut data = event.data;
    let resource = match service {
        PUBSUB_SERVICE => {
            data = match data {
                Some(Value::Object(mut wrapper)) if wrapper.contains_key("message") => {
                    match wrapper.remove("message") {
                        Some(Value::Null) | None => None,
                        message => message,
                    }
                }
                other => other,
            };
            Resource::Structured(ResourceObject {
                service: Some(service.to_string()),
                name: Some(path),
                r#type: Some(PUBSUB_MESSAGE_TYPE.to_string()),
            })
        }
        STORAGE_SERVICE => Resource::Structured(ResourceObject {
            service: Some(service.to_string()),
            name: Some(path),
            r#type: data
                .as_ref()
                .and_then(|d| d.get("kind"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        FIREBASE_AUTH_SERVICE => {
            if let Some(data) = data.as_mut() {
                let inverse = FIREBASE_AUTH_METADATA_RENAMES
                    .iter()
                    .map(|(legacy, ce)| (*ce, *legacy));
                rename_metadata(data, inverse);
            }
            Resource::Path(path)
        }
        _ => Resource::Path(path),
    };

    debug!(ce_type = %event.r#type, legacy_type, service, "downcast CloudEvent");

    Ok(LegacyEvent::new(
        EventContext {
            event_id: Some(event.id),
            timestamp: event.time,
            event_type: Some(legacy_type.to_string()),
            resource: Some(resource),
            extra: Map::new(),
        },
        data,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_source_splits_service_and_name() {
        assert_eq!(
            parse_source("//pubsub.googleapis.com/projects/p/topics/t").unwrap(),
            ("pubsub.googleapis.com", "projects/p/topics/t")
        );
        assert_eq!(
            parse_source("pubsub.googleapis.com/projects/p"),
            Err(ConversionError::MalformedSource(
                "pubsub.googleapis.com/projects/p".into()
            ))
        );
        assert!(parse_source("//pubsub.googleapis.com/").is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let event = CloudEvent::new("1", "//svc/x", "com.example.other");
        assert_eq!(
            downcast(event),
            Err(ConversionError::UnknownCloudEventType("com.example.other".into()))
        );
    }

    #[test]
    fn malformed_source_is_rejected() {
        let event = CloudEvent::new("1", "not-a-source", "google.cloud.pubsub.topic.v1.messagePublished");
        assert!(matches!(downcast(event), Err(ConversionError::MalformedSource(_))));
    }

    #[test]
    fn storage_path_must_fit_pattern() {
        let event = CloudEvent::new(
            "1",
            "//storage.googleapis.com/projects/_/buckets/b",
            "google.cloud.storage.object.v1.finalized",
        );
        assert_eq!(
            downcast(event),
            Err(ConversionError::ResourceMismatch {
                service: STORAGE_SERVICE.into(),
                resource: "projects/_/buckets/b".into(),
            })
        );
    }

    #[test]
    fn pubsub_message_is_unwrapped() {
        let event = CloudEvent::new(
            "1",
            "//pubsub.googleapis.com/projects/p/topics/t",
            "google.cloud.pubsub.topic.v1.messagePublished",
        )
        .with_data(json!({"message": {"data": "MTA="}}));
        let legacy = downcast(event).unwrap();
        assert_eq!(legacy.data, Some(json!({"data": "MTA="})));
        assert_eq!(
            legacy.context.event_type.as_deref(),
            Some("google.pubsub.topic.publish")
        );
        assert_eq!(
            legacy.context.resource,
            Some(Resource::Structured(ResourceObject {
                service: Some(PUBSUB_SERVICE.into()),
                name: Some("projects/p/topics/t".into()),
                r#type: Some(PUBSUB_MESSAGE_TYPE.into()),
            }))
        );
    }

    #[test]
    fn firebase_auth_drops_subject() {
        let event = CloudEvent::new(
            "1",
            "//firebaseauth.googleapis.com/projects/my-project",
            "google.firebase.auth.user.v1.created",
        )
        .with_subject("users/abc")
        .with_data(json!({"uid": "abc", "metadata": {"createTime": "t1", "lastSignInTime": "t2"}}));
        let legacy = downcast(event).unwrap();
        assert_eq!(
            legacy.context.resource,
            Some(Resource::Path("projects/my-project".into()))
        );
        assert_eq!(
            legacy.data,
            Some(json!({"uid": "abc", "metadata": {"createdAt": "t1", "lastSignedInAt": "t2"}}))
        );
    }
}
