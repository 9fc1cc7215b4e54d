//! rollcall-core library.
//!
//! Change-event handlers for the training domain: every create, update or
//! delete of a watched record type is normalized into an
//! [`event::EventContext`], routed by [`handlers::dispatch::Dispatcher`] and
//! run through the validation phase (duplicate guard, schedule conflicts,
//! external validation) and the recompute phase (rollups onto the parent).
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per concern; the dispatcher boundary folds
//!   them into a single [`error::Rejection`]. Binaries use `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//! - **Store access**: every handler receives its collaborators explicitly via
//!   [`handlers::HandlerContext`]; nothing is resolved from global state.

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod handlers;
pub mod model;
pub mod query;
pub mod rules;
pub mod store;
