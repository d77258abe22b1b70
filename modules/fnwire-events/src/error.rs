//! Typed errors for detection and conversion.

use thiserror::Error;

/// The request matches none of the known wire formats.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// Some, but not all, of the required `ce-*` headers were sent
    #[error("incomplete binary CloudEvent: missing {}", .missing.join(", "))]
    IncompleteBinary { missing: Vec<&'static str> },

    /// Body looks like a structured CloudEvent but does not validate
    #[error("invalid CloudEvent: {0}")]
    InvalidCloudEvent(String),

    /// Body is not a JSON object
    #[error("event body must be a JSON object")]
    NotAnObject,

    /// Legacy context could not be read
    #[error("malformed event context: {0}")]
    MalformedContext(String),
}

/// A mapping-table miss while converting between event shapes.
///
/// Every site has its own variant so logs can tell them apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Upcast: the legacy `eventType` has no CloudEvent equivalent
    #[error("unable to find equivalent CloudEvent type for {0:?}")]
    UnknownLegacyType(Option<String>),

    /// Upcast: neither the resource nor the type prefix names a service
    #[error("unable to find equivalent CloudEvent service for {0:?}")]
    UnknownService(Option<String>),

    /// Upcast: the legacy resource carries no name to build a source from
    #[error("legacy event resource has no name")]
    MissingResourceName,

    /// Downcast: the CloudEvent type has no legacy equivalent
    #[error("unable to find equivalent legacy event type for {0}")]
    UnknownCloudEventType(String),

    /// Downcast: `source` is not `//service/name`
    #[error("failed to convert CloudEvent with invalid source: {0:?}")]
    MalformedSource(String),

    /// Downcast: the resource path does not fit the service's pattern
    #[error("resource string did not match expected format for {service}: {resource}")]
    ResourceMismatch { service: String, resource: String },
}

/// Result type alias for conversions.
pub type ConversionResult<T> = std::result::Result<T, ConversionError>;
