//! Event handlers.
//!
//! Each handler receives a [`HandlerContext`] carrying the collaborators and
//! the event. Validation handlers answer with a [`Verdict`]; the dispatcher
//! turns conflicts into rejections.

pub mod dispatch;
pub mod duplicate;
pub mod entity_list;
pub mod rollup;
pub mod schedule;
pub mod validator;

use crate::event::EventContext;
use crate::store::{RecordStore, TimeZoneService};
use validator::ExternalValidator;

pub use dispatch::{
    Dispatcher, Outcome, PLACEHOLDER_EMAIL, Report, Services, Settings, SkipReason,
};

/// Everything a handler may touch while handling one event.
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub store: &'a dyn RecordStore,
    pub zones: &'a dyn TimeZoneService,
    pub validator: &'a dyn ExternalValidator,
    pub event: &'a EventContext,
}

/// Answer of a validation handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    ConflictFound,
    NoConflict,
}

impl Verdict {
    #[must_use]
    pub const fn is_conflict(self) -> bool {
        matches!(self, Self::ConflictFound)
    }
}
