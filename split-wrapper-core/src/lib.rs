//! Pure building blocks of the Split wrapper: nothing in this crate performs
//! I/O or spawns tasks.

pub mod attributes;
pub mod event;
pub mod event_buffer;
pub mod flags;
pub mod readiness;
pub mod version;

pub use attributes::{AttributeBuilder, AttributeValue, Attributes, RuntimeFacts};
pub use event::{Event, Impression, TrackedEvent};
pub use event_buffer::EventBuffer;
pub use flags::{attribute, flag, CONTROL_TREATMENT, DEFAULT_TRAFFIC_TYPE};
pub use readiness::{ReadinessSnapshot, ReadinessState, ReadinessStateMachine, SdkEvent};
pub use version::{normalize, Version, VersionError};
