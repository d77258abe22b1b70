//! Event wire formats and the conversions between them.
//!
//! Classifies an inbound request as a binary or structured CloudEvent, a raw
//! Pub/Sub push payload, or a legacy background event, and converts between
//! the CloudEvent shape and the legacy `{context, data}` shape using the
//! static tables in [`tables`].
//!
//! Nothing here knows about HTTP servers or function invocation.

pub mod detect;
pub mod downcast;
pub mod error;
pub mod model;
pub mod push;
pub mod tables;
pub mod upcast;

pub use detect::{detect, CeHeaders, Inbound, WireFormat};
pub use downcast::downcast;
pub use error::{ConversionError, DetectionError};
pub use model::{CloudEvent, EventContext, LegacyEvent, Resource, ResourceObject};
pub use push::push_to_legacy;
pub use upcast::upcast;
