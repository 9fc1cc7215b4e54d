//! The dispatcher: routes one event through the pipeline of its entity.
//!
//! For guarded pipelines:
//!
//! | kind            | transition   | validation | rollup (parent from) |
//! |-----------------|--------------|------------|----------------------|
//! | create / update | activating   | yes        | post-image           |
//! | create / update | deactivating | no         | post-image           |
//! | delete          | -            | no         | pre-image            |
//!
//! A missing image or required field skips the whole event without writing.
//! Every handler failure is folded into one [`Rejection`] here; nothing else
//! crosses this boundary.

use serde::Serialize;
use std::fmt;
use tracing::{debug, info_span, warn};
use uuid::Uuid;

use super::validator::{self, ExternalValidator};
use super::{HandlerContext, duplicate, entity_list, rollup, schedule};
use crate::error::{HandlerError, Rejection};
use crate::event::{EventContext, EventKind, RawEvent};
use crate::model::{Record, Transition, Value};
use crate::rules::{EntityRule, GuardedPipeline, Pipeline, RuleCatalog, ValidationStep};
use crate::store::{RecordStore, TimeZoneService};

/// Address validated for registrants that have none on file.
pub const PLACEHOLDER_EMAIL: &str = "abc@xyz.com";

/// Deployment settings the handlers read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Run email validation steps at all.
    pub validate_email: bool,
    /// Sent instead of a registrant's missing email. `None` skips validation
    /// for such registrants.
    pub placeholder_email: Option<String>,
    /// List record whose filter document follows the active groups.
    pub entity_list_id: Option<Uuid>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            validate_email: true,
            placeholder_email: Some(PLACEHOLDER_EMAIL.to_string()),
            entity_list_id: None,
        }
    }
}

/// Collaborators supplied per event by the host.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub store: &'a dyn RecordStore,
    pub zones: &'a dyn TimeZoneService,
    pub validator: &'a dyn ExternalValidator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A required image or field was missing.
    InsufficientData(String),
    /// The message is not create, update or delete.
    Unsupported(String),
    /// No rule subscribes to this entity and kind.
    NotSubscribed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData(what) => write!(f, "insufficient data: {what}"),
            Self::Unsupported(message) => write!(f, "unsupported message '{message}'"),
            Self::NotSubscribed => f.write_str("not subscribed"),
        }
    }
}

/// What a completed dispatch did.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Report {
    /// Validation steps that ran, in order.
    pub validations: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollup: Option<rollup::RollupOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<entity_list::ListOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Completed(Report),
    Skipped { reason: SkipReason },
}

impl Outcome {
    fn skipped(reason: SkipReason) -> Self {
        debug!(reason = %reason, "event skipped");
        Self::Skipped { reason }
    }
}

pub struct Dispatcher {
    catalog: RuleCatalog,
    settings: Settings,
}

enum Step {
    Passed,
    Insufficient(String),
}

fn first_missing<'a>(image: &Record, required: &'a [String]) -> Option<&'a str> {
    required
        .iter()
        .find(|field| image.get(field).is_none_or(Value::is_null))
        .map(String::as_str)
}

impl Dispatcher {
    #[must_use]
    pub const fn new(catalog: RuleCatalog, settings: Settings) -> Self {
        Self { catalog, settings }
    }

    #[must_use]
    pub const fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// A [`Rejection`] whose message is shown to the user; the triggering
    /// operation must be aborted.
    pub fn dispatch(&self, services: Services<'_>, raw: &RawEvent) -> Result<Outcome, Rejection> {
        let span = info_span!(
            "dispatch",
            entity = %raw.primary_entity_name,
            id = %raw.primary_entity_id,
            kind = %raw.message_name,
            depth = raw.depth,
        );
        let _guard = span.enter();
        debug!(
            user = ?raw.user_id,
            initiating_user = ?raw.initiating_user_id,
            "event received"
        );

        let Some(rule) = self.catalog.get(&raw.primary_entity_name) else {
            return Ok(Outcome::skipped(SkipReason::NotSubscribed));
        };
        let event = match EventContext::build(raw, &rule.trigger.pre_image, &rule.trigger.post_image)
        {
            Ok(event) => event,
            Err(err) => return Ok(Outcome::skipped(SkipReason::Unsupported(err.raw))),
        };
        if !rule.trigger.subscribes(event.kind) {
            return Ok(Outcome::skipped(SkipReason::NotSubscribed));
        }

        let ctx = HandlerContext {
            store: services.store,
            zones: services.zones,
            validator: services.validator,
            event: &event,
        };
        self.run(&ctx, rule).map_err(|err| {
            let rejection = Rejection::from(err);
            warn!(
                error_code = rejection.code.code(),
                message = %rejection.message,
                "operation rejected"
            );
            rejection
        })
    }

    fn run(&self, ctx: &HandlerContext<'_>, rule: &EntityRule) -> Result<Outcome, HandlerError> {
        match &rule.pipeline {
            Pipeline::Guarded(pipeline) => self.run_guarded(ctx, &rule.entity, pipeline),
            Pipeline::EntityList(list) => {
                let outcome = entity_list::refresh(ctx, list, self.settings.entity_list_id)?;
                Ok(Outcome::Completed(Report {
                    list: Some(outcome),
                    ..Report::default()
                }))
            }
        }
    }

    fn run_guarded(
        &self,
        ctx: &HandlerContext<'_>,
        entity: &str,
        pipeline: &GuardedPipeline,
    ) -> Result<Outcome, HandlerError> {
        let event = ctx.event;
        let required = if event.kind.uses_post_image() {
            &pipeline.required_post
        } else {
            &pipeline.required_pre
        };
        let Some(image) = event.image() else {
            let side = if event.kind.uses_post_image() { "post" } else { "pre" };
            return Ok(Outcome::skipped(SkipReason::InsufficientData(format!(
                "no {side}-image"
            ))));
        };
        if let Some(field) = first_missing(image, required) {
            return Ok(Outcome::skipped(SkipReason::InsufficientData(format!(
                "{field} missing from image"
            ))));
        }

        let mut report = Report::default();

        if event.kind == EventKind::Delete {
            debug!("delete, validation skipped");
        } else if Transition::of(&event.target).is_activating() {
            for step in &pipeline.validations {
                if let Step::Insufficient(what) = self.validate(ctx, entity, image, step)? {
                    return Ok(Outcome::skipped(SkipReason::InsufficientData(what)));
                }
                report.validations.push(step.name());
            }
        } else {
            debug!("deactivation, validation skipped");
        }

        if let Some(spec) = &pipeline.rollup {
            let Some(parent) = image.reference(&spec.parent_link_field) else {
                return Ok(Outcome::skipped(SkipReason::InsufficientData(format!(
                    "{} is not a reference",
                    spec.parent_link_field
                ))));
            };
            report.rollup = Some(rollup::recompute(ctx, parent, spec)?);
        }

        Ok(Outcome::Completed(report))
    }

    fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        entity: &str,
        image: &Record,
        step: &ValidationStep,
    ) -> Result<Step, HandlerError> {
        let event = ctx.event;
        match step {
            ValidationStep::Email {
                registrant_field,
                email_field,
            } => {
                if !self.settings.validate_email {
                    debug!("email validation disabled");
                    return Ok(Step::Passed);
                }
                let Some(registrant) = image.reference(registrant_field) else {
                    return Ok(Step::Insufficient(format!(
                        "{registrant_field} is not a reference"
                    )));
                };
                let record = ctx
                    .store
                    .get(&registrant.entity, registrant.id, &[email_field.as_str()])?;
                let email = record
                    .get(email_field)
                    .and_then(Value::as_str)
                    .filter(|e| !e.trim().is_empty())
                    .map(str::to_owned)
                    .or_else(|| self.settings.placeholder_email.clone());
                let Some(email) = email else {
                    debug!(registrant = %registrant, "registrant has no email, not validated");
                    return Ok(Step::Passed);
                };
                let result = validator::validate(ctx.validator, &email)?;
                debug!(
                    email = %result.value,
                    answered = result.body.is_some(),
                    "email validated"
                );
                Ok(Step::Passed)
            }
            ValidationStep::Duplicate(rule) => {
                let Some(key) = duplicate::BusinessKey::from_image(image, &rule.key_fields) else {
                    return Ok(Step::Insufficient("business key incomplete".to_string()));
                };
                if duplicate::check(ctx, entity, rule, &key, event.id)?.is_conflict() {
                    return Err(HandlerError::ConflictDetected {
                        message: rule.message.clone(),
                    });
                }
                Ok(Step::Passed)
            }
            ValidationStep::Schedule(rule) => {
                let Some(parent) = image.reference(&rule.parent_field) else {
                    return Ok(Step::Insufficient(format!(
                        "{} is not a reference",
                        rule.parent_field
                    )));
                };
                let Some(utc) = image.get(&rule.timestamp_field).and_then(Value::as_timestamp)
                else {
                    return Ok(Step::Insufficient(format!(
                        "{} is not a timestamp",
                        rule.timestamp_field
                    )));
                };
                let local = schedule::local_timestamp(ctx, utc)?;
                debug!(utc = %utc, local = %local, "schedule normalized");
                if schedule::check(ctx, entity, rule, parent, local, event.id)?.is_conflict() {
                    return Err(HandlerError::ConflictDetected {
                        message: rule.message.clone(),
                    });
                }
                Ok(Step::Passed)
            }
        }
    }
}
