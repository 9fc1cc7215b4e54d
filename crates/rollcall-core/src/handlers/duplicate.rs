//! Duplicate guard: at most one active record per business key.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{HandlerContext, Verdict};
use crate::model::{EntityRef, Record, primary_key};
use crate::query::{LinkEntity, Query};
use crate::store::StoreError;

/// Restrict the search to children whose parent (through `field`) is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentScope {
    pub field: String,
    pub entity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRule {
    /// Reference fields forming the business key, in order.
    pub key_fields: Vec<String>,
    #[serde(default)]
    pub parent_scope: Option<ParentScope>,
    /// Rejection shown to the user when a duplicate exists.
    pub message: String,
}

/// Ordered `(field, reference)` pairs identifying a uniqueness scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessKey(Vec<(String, EntityRef)>);

impl BusinessKey {
    pub fn new(pairs: impl IntoIterator<Item = (String, EntityRef)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Read every key field from `image`; `None` when any of them is absent
    /// or not a reference.
    #[must_use]
    pub fn from_image(image: &Record, fields: &[String]) -> Option<Self> {
        fields
            .iter()
            .map(|f| image.reference(f).map(|r| (f.clone(), r.clone())))
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, EntityRef)] {
        &self.0
    }
}

/// Query for active `entity` rows sharing `key`, other than `exclude`.
#[must_use]
pub fn duplicate_query(
    entity: &str,
    rule: &DuplicateRule,
    key: &BusinessKey,
    exclude: Uuid,
) -> Query {
    let mut query = Query::new(entity).column(primary_key(entity));
    for (field, target) in key.pairs() {
        query = query.references(field, target);
    }
    query = query.active_only().excluding(exclude);

    if let Some(scope) = &rule.parent_scope {
        query = query.link(
            LinkEntity::new(&scope.entity, primary_key(&scope.entity), &scope.field).active_only(),
        );
    }
    query
}

/// Look for another active `entity` record sharing `key`.
///
/// # Errors
///
/// Returns the store's error when the query cannot be answered.
pub fn check(
    ctx: &HandlerContext<'_>,
    entity: &str,
    rule: &DuplicateRule,
    key: &BusinessKey,
    exclude: Uuid,
) -> Result<Verdict, StoreError> {
    let query = duplicate_query(entity, rule, key, exclude);
    debug!(fetch = %query, "duplicate check");

    let found = ctx.store.query(&query)?;
    if found.is_empty() {
        Ok(Verdict::NoConflict)
    } else {
        debug!(
            count = found.len(),
            first = %found[0].id,
            "active duplicate found"
        );
        Ok(Verdict::ConflictFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventContext, EventKind};
    use crate::handlers::validator::NoopValidator;
    use crate::model::STATE_FIELD;
    use crate::store::{FixedOffsetZones, MemoryStore};

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn event() -> EventContext {
        EventContext {
            kind: EventKind::Create,
            entity: "ctail_rating".to_string(),
            id: id(1),
            user_id: None,
            initiating_user_id: None,
            depth: 1,
            target: Record::new("ctail_rating", id(1)),
            pre_image: None,
            post_image: None,
        }
    }

    fn rule() -> DuplicateRule {
        DuplicateRule {
            key_fields: vec!["ctail_training".to_string(), "ctail_attendee".to_string()],
            parent_scope: None,
            message: "Looks like you have already provided your rating!".to_string(),
        }
    }

    fn rating(n: u128, training: u128, attendee: u128, state: i64) -> Record {
        Record::new("ctail_rating", id(n))
            .with("ctail_training", EntityRef::new("ctail_training", id(training)))
            .with("ctail_attendee", EntityRef::new("contact", id(attendee)))
            .with(STATE_FIELD, state)
    }

    fn run(store: &MemoryStore, me: &Record) -> Verdict {
        let event = event();
        let ctx = HandlerContext {
            store,
            zones: &FixedOffsetZones::default(),
            validator: &NoopValidator,
            event: &event,
        };
        let key = BusinessKey::from_image(me, &rule().key_fields).expect("key");
        check(&ctx, "ctail_rating", &rule(), &key, me.id).expect("check")
    }

    #[test]
    fn active_sibling_with_same_key_conflicts() {
        let me = rating(1, 100, 7, 0);
        let store = MemoryStore::with_records([me.clone(), rating(2, 100, 7, 0)]);
        assert_eq!(run(&store, &me), Verdict::ConflictFound);
    }

    #[test]
    fn self_inactive_and_other_keys_do_not_conflict() {
        let me = rating(1, 100, 7, 0);
        let store = MemoryStore::with_records([
            me.clone(),
            rating(2, 100, 7, 1),
            rating(3, 100, 8, 0),
            rating(4, 200, 7, 0),
        ]);
        assert_eq!(run(&store, &me), Verdict::NoConflict);
    }

    #[test]
    fn missing_key_field_yields_no_key() {
        let partial = Record::new("ctail_rating", id(1))
            .with("ctail_training", EntityRef::new("ctail_training", id(100)));
        assert!(BusinessKey::from_image(&partial, &rule().key_fields).is_none());
    }

    #[test]
    fn parent_scope_ignores_children_of_inactive_parents() {
        let scoped = DuplicateRule {
            key_fields: vec!["ctail_trainingslot".to_string(), "ctail_registrant".to_string()],
            parent_scope: Some(ParentScope {
                field: "ctail_trainingslot".to_string(),
                entity: "ctail_trainingslot".to_string(),
            }),
            message: "You are already registered for the training!".to_string(),
        };
        let slot = EntityRef::new("ctail_trainingslot", id(50));
        let reg = |n: u128| {
            Record::new("ctail_registration", id(n))
                .with("ctail_trainingslot", slot.clone())
                .with("ctail_registrant", EntityRef::new("contact", id(7)))
                .with(STATE_FIELD, 0)
        };
        let me = reg(1);
        let store = MemoryStore::with_records([
            me.clone(),
            reg(2),
            Record::new("ctail_trainingslot", id(50)).with(STATE_FIELD, 1),
        ]);

        let event = event();
        let ctx = HandlerContext {
            store: &store,
            zones: &FixedOffsetZones::default(),
            validator: &NoopValidator,
            event: &event,
        };
        let key = BusinessKey::from_image(&me, &scoped.key_fields).expect("key");
        let verdict = check(&ctx, "ctail_registration", &scoped, &key, me.id).expect("check");
        assert_eq!(verdict, Verdict::NoConflict);

        store.insert(Record::new("ctail_trainingslot", id(50)).with(STATE_FIELD, 0));
        let verdict = check(&ctx, "ctail_registration", &scoped, &key, me.id).expect("check");
        assert_eq!(verdict, Verdict::ConflictFound);
    }
}
