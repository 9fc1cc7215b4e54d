//! Which handlers run for which record type.
//!
//! Each [`EntityRule`] pairs a trigger registration (subscribed event kinds
//! and the images the platform delivers) with a pipeline. The built-in
//! catalog covers the training domain; configuration may replace the rule
//! of any entity or add new ones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::{DEFAULT_POST_IMAGE, DEFAULT_PRE_IMAGE, EventKind, ImageSpec};
use crate::handlers::duplicate::{DuplicateRule, ParentScope};
use crate::handlers::entity_list::EntityListRule;
use crate::handlers::rollup::{AggregateSpec, Ceiling};
use crate::handlers::schedule::ScheduleRule;
use crate::query::AggregateFunction;

pub const ALREADY_REGISTERED: &str = "You are already registered for the training!";
pub const HOUSEFUL: &str = "Looks like it is a houseful. Try again for a different slot!";
pub const ALREADY_RATED: &str = "Looks like you have already provided your rating!";
pub const SLOT_EXISTS: &str =
    "Similar Training Slot exists. Please try again with a different Schedule.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRegistration {
    pub kinds: Vec<EventKind>,
    #[serde(default = "default_pre_image")]
    pub pre_image: ImageSpec,
    #[serde(default = "default_post_image")]
    pub post_image: ImageSpec,
}

fn default_pre_image() -> ImageSpec {
    ImageSpec::new(DEFAULT_PRE_IMAGE, &[])
}

fn default_post_image() -> ImageSpec {
    ImageSpec::new(DEFAULT_POST_IMAGE, &[])
}

impl TriggerRegistration {
    #[must_use]
    pub fn subscribes(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// One step of the validation phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationStep {
    /// Validate the email of the record referenced by `registrant_field`.
    Email {
        registrant_field: String,
        email_field: String,
    },
    Duplicate(DuplicateRule),
    Schedule(ScheduleRule),
}

impl ValidationStep {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Email { .. } => "email",
            Self::Duplicate(_) => "duplicate",
            Self::Schedule(_) => "schedule",
        }
    }
}

/// Validation phase followed by an optional rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardedPipeline {
    /// Fields the post-image must carry on create and update.
    #[serde(default)]
    pub required_post: Vec<String>,
    /// Fields the pre-image must carry on delete.
    #[serde(default)]
    pub required_pre: Vec<String>,
    /// Run in order; the first conflict aborts.
    #[serde(default)]
    pub validations: Vec<ValidationStep>,
    #[serde(default)]
    pub rollup: Option<AggregateSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pipeline {
    Guarded(GuardedPipeline),
    EntityList(EntityListRule),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRule {
    pub entity: String,
    pub trigger: TriggerRegistration,
    pub pipeline: Pipeline,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleCatalog {
    rules: BTreeMap<String, EntityRule>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn registration_rule() -> EntityRule {
    EntityRule {
        entity: "ctail_registration".to_string(),
        trigger: TriggerRegistration {
            kinds: EventKind::ALL.to_vec(),
            pre_image: ImageSpec::new(DEFAULT_PRE_IMAGE, &["ctail_trainingslot"]),
            post_image: ImageSpec::new(
                DEFAULT_POST_IMAGE,
                &["ctail_trainingslot", "ctail_training", "ctail_registrant"],
            ),
        },
        pipeline: Pipeline::Guarded(GuardedPipeline {
            required_post: strings(&["ctail_trainingslot", "ctail_training", "ctail_registrant"]),
            required_pre: strings(&["ctail_trainingslot"]),
            validations: vec![
                ValidationStep::Email {
                    registrant_field: "ctail_registrant".to_string(),
                    email_field: "emailaddress1".to_string(),
                },
                ValidationStep::Duplicate(DuplicateRule {
                    key_fields: strings(&["ctail_trainingslot", "ctail_training", "ctail_registrant"]),
                    parent_scope: Some(ParentScope {
                        field: "ctail_trainingslot".to_string(),
                        entity: "ctail_trainingslot".to_string(),
                    }),
                    message: ALREADY_REGISTERED.to_string(),
                }),
            ],
            rollup: Some(AggregateSpec {
                child_entity: "ctail_registration".to_string(),
                parent_link_field: "ctail_trainingslot".to_string(),
                attribute: "ctail_registrationid".to_string(),
                function: AggregateFunction::Count,
                active_only: true,
                alias: "registration_count".to_string(),
                target_field: "ctail_filledupseats".to_string(),
                ceiling: Some(Ceiling {
                    field: "ctail_totalseats".to_string(),
                    message: HOUSEFUL.to_string(),
                }),
            }),
        }),
    }
}

fn rating_rule() -> EntityRule {
    EntityRule {
        entity: "ctail_rating".to_string(),
        trigger: TriggerRegistration {
            kinds: EventKind::ALL.to_vec(),
            pre_image: ImageSpec::new(DEFAULT_PRE_IMAGE, &["ctail_training"]),
            post_image: ImageSpec::new(DEFAULT_POST_IMAGE, &["ctail_training", "ctail_attendee"]),
        },
        pipeline: Pipeline::Guarded(GuardedPipeline {
            required_post: strings(&["ctail_training", "ctail_attendee"]),
            required_pre: strings(&["ctail_training"]),
            validations: vec![ValidationStep::Duplicate(DuplicateRule {
                key_fields: strings(&["ctail_training", "ctail_attendee"]),
                parent_scope: None,
                message: ALREADY_RATED.to_string(),
            })],
            rollup: Some(AggregateSpec {
                child_entity: "ctail_rating".to_string(),
                parent_link_field: "ctail_training".to_string(),
                attribute: "ctail_rating".to_string(),
                function: AggregateFunction::Avg,
                active_only: true,
                alias: "rating_avg".to_string(),
                target_field: "ctail_rating".to_string(),
                ceiling: None,
            }),
        }),
    }
}

fn training_slot_rule() -> EntityRule {
    EntityRule {
        entity: "ctail_trainingslot".to_string(),
        trigger: TriggerRegistration {
            kinds: vec![EventKind::Create, EventKind::Update],
            pre_image: default_pre_image(),
            post_image: ImageSpec::new(
                DEFAULT_POST_IMAGE,
                &["ctail_training", "ctail_scheduleddate"],
            ),
        },
        pipeline: Pipeline::Guarded(GuardedPipeline {
            required_post: strings(&["ctail_training", "ctail_scheduleddate"]),
            required_pre: Vec::new(),
            validations: vec![ValidationStep::Schedule(ScheduleRule {
                parent_field: "ctail_training".to_string(),
                timestamp_field: "ctail_scheduleddate".to_string(),
                message: SLOT_EXISTS.to_string(),
            })],
            rollup: None,
        }),
    }
}

fn group_rule() -> EntityRule {
    EntityRule {
        entity: "ctail_group".to_string(),
        trigger: TriggerRegistration {
            kinds: EventKind::ALL.to_vec(),
            pre_image: default_pre_image(),
            post_image: default_post_image(),
        },
        pipeline: Pipeline::EntityList(EntityListRule::default()),
    }
}

impl RuleCatalog {
    /// The training-domain rules.
    #[must_use]
    pub fn builtin() -> Self {
        Self::default().with_rules([
            registration_rule(),
            rating_rule(),
            training_slot_rule(),
            group_rule(),
        ])
    }

    /// Add `rules`, replacing any existing rule for the same entity.
    #[must_use]
    pub fn with_rules(mut self, rules: impl IntoIterator<Item = EntityRule>) -> Self {
        for rule in rules {
            self.rules.insert(rule.entity.clone(), rule);
        }
        self
    }

    #[must_use]
    pub fn get(&self, entity: &str) -> Option<&EntityRule> {
        self.rules.get(entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRule> {
        self.rules.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
