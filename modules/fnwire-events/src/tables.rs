//! Static mapping tables between legacy background events and CloudEvents.
//!
//! Lookups that depend on order are plain slices scanned front to back.

use regex::Regex;
use std::sync::LazyLock;

pub const PUBSUB_SERVICE: &str = "pubsub.googleapis.com";
pub const STORAGE_SERVICE: &str = "storage.googleapis.com";
pub const FIRESTORE_SERVICE: &str = "firestore.googleapis.com";
pub const FIREBASE_SERVICE: &str = "firebase.googleapis.com";
pub const FIREBASE_AUTH_SERVICE: &str = "firebaseauth.googleapis.com";
pub const FIREBASE_DB_SERVICE: &str = "firebasedatabase.googleapis.com";

pub const PUBSUB_MESSAGE_TYPE: &str = "type.googleapis.com/google.pubsub.v1.PubsubMessage";
pub const PUBSUB_PUBLISH_TYPE: &str = "google.pubsub.topic.publish";

/// Legacy event type and its CloudEvent counterpart.
#[derive(Debug, Clone, Copy)]
pub struct TypeMapping {
    pub legacy: &'static str,
    pub cloud_event: &'static str,
}

const fn map(legacy: &'static str, cloud_event: &'static str) -> TypeMapping {
    TypeMapping { legacy, cloud_event }
}

/// Legacy → CloudEvent types. Several legacy spellings share one CloudEvent
/// type; the first row for a CloudEvent type is the one a downcast produces.
pub static EVENT_TYPES: &[TypeMapping] = &[
    map(PUBSUB_PUBLISH_TYPE, "google.cloud.pubsub.topic.v1.messagePublished"),
    map(
        "providers/cloud.pubsub/eventTypes/topic.publish",
        "google.cloud.pubsub.topic.v1.messagePublished",
    ),
    map("google.storage.object.finalize", "google.cloud.storage.object.v1.finalized"),
    map("google.storage.object.delete", "google.cloud.storage.object.v1.deleted"),
    map("google.storage.object.archive", "google.cloud.storage.object.v1.archived"),
    map(
        "google.storage.object.metadataUpdate",
        "google.cloud.storage.object.v1.metadataUpdated",
    ),
    map(
        "providers/cloud.storage/eventTypes/object.change",
        "google.cloud.storage.object.v1.finalized",
    ),
    map(
        "providers/cloud.firestore/eventTypes/document.write",
        "google.cloud.firestore.document.v1.written",
    ),
    map(
        "providers/cloud.firestore/eventTypes/document.create",
        "google.cloud.firestore.document.v1.created",
    ),
    map(
        "providers/cloud.firestore/eventTypes/document.update",
        "google.cloud.firestore.document.v1.updated",
    ),
    map(
        "providers/cloud.firestore/eventTypes/document.delete",
        "google.cloud.firestore.document.v1.deleted",
    ),
    map(
        "providers/firebase.auth/eventTypes/user.create",
        "google.firebase.auth.user.v1.created",
    ),
    map(
        "providers/firebase.auth/eventTypes/user.delete",
        "google.firebase.auth.user.v1.deleted",
    ),
    map(
        "providers/google.firebase.analytics/eventTypes/event.log",
        "google.firebase.analytics.log.v1.written",
    ),
    map(
        "providers/google.firebase.database/eventTypes/ref.create",
        "google.firebase.database.ref.v1.created",
    ),
    map(
        "providers/google.firebase.database/eventTypes/ref.write",
        "google.firebase.database.ref.v1.written",
    ),
    map(
        "providers/google.firebase.database/eventTypes/ref.update",
        "google.firebase.database.ref.v1.updated",
    ),
    map(
        "providers/google.firebase.database/eventTypes/ref.delete",
        "google.firebase.database.ref.v1.deleted",
    ),
];

/// Legacy type prefix → CloudEvent service, scanned in order, first match wins.
/// `providers/cloud.pubsub/` must be tried before the bare `google.pubsub`.
pub static SERVICE_PREFIXES: &[(&str, &str)] = &[
    ("providers/cloud.firestore/", FIRESTORE_SERVICE),
    ("providers/google.firebase.analytics/", FIREBASE_SERVICE),
    ("providers/firebase.auth/", FIREBASE_AUTH_SERVICE),
    ("providers/google.firebase.database/", FIREBASE_DB_SERVICE),
    ("providers/cloud.pubsub/", PUBSUB_SERVICE),
    ("providers/cloud.storage/", STORAGE_SERVICE),
    ("google.pubsub", PUBSUB_SERVICE),
    ("google.storage", STORAGE_SERVICE),
];

/// Service → pattern splitting a resource path into (resource, subject).
static RESOURCE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            FIREBASE_SERVICE,
            Regex::new(r"^(projects/[^/]+)/(events/[^/]+)$").unwrap(),
        ),
        (
            FIREBASE_DB_SERVICE,
            Regex::new(r"^projects/_/(instances/[^/]+)/(refs/.+)$").unwrap(),
        ),
        (
            FIRESTORE_SERVICE,
            Regex::new(r"^(projects/[^/]+/databases/\(default\))/(documents/.+)$").unwrap(),
        ),
        (
            STORAGE_SERVICE,
            Regex::new(r"^(projects/[^/]+/buckets/[^/]+)/(objects/.+)$").unwrap(),
        ),
    ]
});

/// Firebase Auth `metadata` keys: legacy name → CloudEvent name.
pub static FIREBASE_AUTH_METADATA_RENAMES: &[(&str, &str)] = &[
    ("createdAt", "createTime"),
    ("lastSignedInAt", "lastSignInTime"),
];

pub fn cloud_event_type(legacy_type: &str) -> Option<&'static str> {
    EVENT_TYPES
        .iter()
        .find(|m| m.legacy == legacy_type)
        .map(|m| m.cloud_event)
}

pub fn legacy_type(cloud_event_type: &str) -> Option<&'static str> {
    EVENT_TYPES
        .iter()
        .find(|m| m.cloud_event == cloud_event_type)
        .map(|m| m.legacy)
}

pub fn service_for_legacy_type(legacy_type: &str) -> Option<&'static str> {
    SERVICE_PREFIXES
        .iter()
        .find(|(prefix, _)| legacy_type.starts_with(prefix))
        .map(|(_, service)| *service)
}

/// Pattern for `service`, if it has one.
pub fn resource_pattern(service: &str) -> Option<&'static Regex> {
    RESOURCE_PATTERNS
        .iter()
        .find(|(s, _)| *s == service)
        .map(|(_, re)| re)
}

/// Split `path` into (resource, subject) with the service's pattern.
///
/// `None` when the service has no pattern, `Some(None)` when it has one and
/// `path` does not fit.
pub fn split_resource<'a>(service: &str, path: &'a str) -> Option<Option<(&'a str, &'a str)>> {
    let re = resource_pattern(service)?;
    Some(re.captures(path).and_then(|caps| {
        let resource = caps.get(1)?.as_str();
        let subject = caps.get(2)?.as_str();
        Some((resource, subject))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_pubsub_spellings_map_forward() {
        assert_eq!(
            cloud_event_type("google.pubsub.topic.publish"),
            Some("google.cloud.pubsub.topic.v1.messagePublished")
        );
        assert_eq!(
            cloud_event_type("providers/cloud.pubsub/eventTypes/topic.publish"),
            Some("google.cloud.pubsub.topic.v1.messagePublished")
        );
    }

    #[test]
    fn reverse_lookup_prefers_first_spelling() {
        assert_eq!(
            legacy_type("google.cloud.pubsub.topic.v1.messagePublished"),
            Some("google.pubsub.topic.publish")
        );
        assert_eq!(
            legacy_type("google.cloud.storage.object.v1.finalized"),
            Some("google.storage.object.finalize")
        );
    }

    #[test]
    fn every_cloud_event_type_reverses_to_a_row_that_maps_back() {
        for row in EVENT_TYPES {
            let legacy = legacy_type(row.cloud_event).unwrap();
            assert_eq!(cloud_event_type(legacy), Some(row.cloud_event));
        }
    }

    #[test]
    fn prefix_scan_is_first_match() {
        assert_eq!(
            service_for_legacy_type("providers/cloud.pubsub/eventTypes/topic.publish"),
            Some(PUBSUB_SERVICE)
        );
        assert_eq!(
            service_for_legacy_type("google.storage.object.finalize"),
            Some(STORAGE_SERVICE)
        );
        assert_eq!(
            service_for_legacy_type("providers/firebase.auth/eventTypes/user.create"),
            Some(FIREBASE_AUTH_SERVICE)
        );
        assert_eq!(service_for_legacy_type("com.example.unknown"), None);
    }

    #[test]
    fn split_resource_outcomes() {
        assert_eq!(
            split_resource(STORAGE_SERVICE, "projects/_/buckets/b/objects/a/b.txt"),
            Some(Some(("projects/_/buckets/b", "objects/a/b.txt")))
        );
        assert_eq!(split_resource(STORAGE_SERVICE, "projects/_/buckets/b"), Some(None));
        assert_eq!(split_resource(PUBSUB_SERVICE, "projects/p/topics/t"), None);
        assert_eq!(
            split_resource(
                FIRESTORE_SERVICE,
                "projects/p/databases/(default)/documents/c/d"
            ),
            Some(Some(("projects/p/databases/(default)", "documents/c/d")))
        );
    }
}
