//! Inbound events and their normalized context.

pub mod context;
pub mod kind;

pub use context::{DEFAULT_POST_IMAGE, DEFAULT_PRE_IMAGE, EventContext, ImageSpec, RawEvent};
pub use kind::{EventKind, UnknownEventKind};
