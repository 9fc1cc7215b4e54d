//! Store-agnostic record model.

pub mod record;
pub mod state;

pub use record::{EntityRef, Fields, Record, Value, primary_key};
pub use state::{STATE_FIELD, StateCode, Transition};
