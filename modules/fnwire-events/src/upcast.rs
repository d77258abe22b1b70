//! Legacy background event → CloudEvent.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ConversionError, ConversionResult};
use crate::model::{CloudEvent, LegacyEvent, SPEC_VERSION};
use crate::tables::{
    self, FIREBASE_AUTH_METADATA_RENAMES, FIREBASE_AUTH_SERVICE, PUBSUB_SERVICE,
};

/// Convert a normalized legacy event into a CloudEvent.
///
/// Every lookup happens before the event is assembled, so an error never
/// leaves a partially populated CloudEvent behind.
pub fn upcast(event: LegacyEvent) -> ConversionResult<CloudEvent> {
    let LegacyEvent { context, data } = event;
    let event_type = context.event_type.as_deref();

    let ce_type = event_type
        .and_then(tables::cloud_event_type)
        .ok_or_else(|| ConversionError::UnknownLegacyType(context.event_type.clone()))?;

    let resource = context.resource.as_ref();
    let service = resource
        .and_then(|r| r.service())
        .or_else(|| event_type.and_then(tables::service_for_legacy_type))
        .ok_or_else(|| ConversionError::UnknownService(context.event_type.clone()))?
        .to_string();

    let name = resource
        .and_then(|r| r.name())
        .ok_or(ConversionError::MissingResourceName)?;
    let source = format!("//{service}/{name}");

    let mut subject = None;
    let data = match service.as_str() {
        PUBSUB_SERVICE => Some(json!({ "message": data.unwrap_or(Value::Null) })),
        FIREBASE_AUTH_SERVICE => data.map(|mut data| {
            if let Some(uid) = data.get("uid").and_then(Value::as_str) {
                subject = Some(format!("users/{uid}"));
            }
            rename_metadata(&mut data, FIREBASE_AUTH_METADATA_RENAMES.iter().copied());
            data
        }),
        _ => data,
    };

    debug!(legacy_type = ?event_type, ce_type, %source, "upcast legacy event");

    Ok(CloudEvent {
        id: context.event_id.unwrap_or_default(),
        source,
        specversion: SPEC_VERSION.to_string(),
        r#type: ce_type.to_string(),
        time: context.timestamp,
        subject,
        dataschema: None,
        datacontenttype: Some("application/json".to_string()),
        traceparent: None,
        data,
    })
}

/// Rename keys of `data.metadata` in place, `(from, to)` pairs.
pub(crate) fn rename_metadata<'a>(
    data: &mut Value,
    renames: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    let Some(metadata) = data.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    for (from, to) in renames {
        if let Some(value) = metadata.remove(from) {
            metadata.insert(to.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventContext, Resource, ResourceObject};

    fn context(event_type: &str, resource: Resource) -> EventContext {
        EventContext {
            event_id: Some("1".into()),
            timestamp: Some("2020-09-29T11:32:00.000Z".into()),
            event_type: Some(event_type.into()),
            resource: Some(resource),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let event = LegacyEvent::new(
            context("com.example.nothing", Resource::Path("x".into())),
            None,
        );
        assert_eq!(
            upcast(event),
            Err(ConversionError::UnknownLegacyType(Some(
                "com.example.nothing".into()
            )))
        );
    }

    #[test]
    fn missing_type_is_rejected() {
        let event = LegacyEvent::new(EventContext::default(), None);
        assert_eq!(upcast(event), Err(ConversionError::UnknownLegacyType(None)));
    }

    #[test]
    fn service_from_prefix_when_resource_is_a_path() {
        let event = LegacyEvent::new(
            context(
                "providers/cloud.firestore/eventTypes/document.write",
                Resource::Path("projects/p/databases/(default)/documents/c/d".into()),
            ),
            Some(json!({"value": {}})),
        );
        let ce = upcast(event).unwrap();
        assert_eq!(
            ce.source,
            "//firestore.googleapis.com/projects/p/databases/(default)/documents/c/d"
        );
        assert_eq!(ce.r#type, "google.cloud.firestore.document.v1.written");
        assert_eq!(ce.data, Some(json!({"value": {}})));
        assert_eq!(ce.subject, None);
    }

    #[test]
    fn structured_resource_service_wins_over_prefix() {
        let event = LegacyEvent::new(
            context(
                "google.storage.object.finalize",
                Resource::Structured(ResourceObject {
                    service: Some("custom.googleapis.com".into()),
                    name: Some("things/1".into()),
                    r#type: None,
                }),
            ),
            None,
        );
        assert_eq!(upcast(event).unwrap().source, "//custom.googleapis.com/things/1");
    }

    #[test]
    fn resource_without_name_is_rejected() {
        let event = LegacyEvent::new(
            context(
                "google.pubsub.topic.publish",
                Resource::Structured(ResourceObject {
                    service: Some(PUBSUB_SERVICE.into()),
                    name: None,
                    r#type: None,
                }),
            ),
            Some(json!({})),
        );
        assert_eq!(upcast(event), Err(ConversionError::MissingResourceName));
    }

    #[test]
    fn rename_metadata_leaves_other_keys() {
        let mut data = json!({"metadata": {"createdAt": "a", "other": "b"}});
        rename_metadata(&mut data, FIREBASE_AUTH_METADATA_RENAMES.iter().copied());
        assert_eq!(data, json!({"metadata": {"createTime": "a", "other": "b"}}));
    }
}
