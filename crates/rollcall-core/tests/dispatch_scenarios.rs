//! End-to-end dispatch scenarios against the SQLite store.

use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::error::ErrorCode;
use rollcall_core::event::{DEFAULT_POST_IMAGE, DEFAULT_PRE_IMAGE, RawEvent};
use rollcall_core::filter::FilterDocument;
use rollcall_core::handlers::validator::NoopValidator;
use rollcall_core::handlers::{Dispatcher, Outcome, Services, Settings};
use rollcall_core::model::{EntityRef, Record, STATE_FIELD, Value};
use rollcall_core::rules::{ALREADY_REGISTERED, RuleCatalog, SLOT_EXISTS};
use rollcall_core::store::{FixedOffsetZones, RecordStore, SqliteStore};
use std::collections::BTreeMap;
use uuid::Uuid;


fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, 2)
        .and_then(|d| d.and_hms_opt(h, m, 0))
        .expect("valid timestamp")
}

fn event(message: &str, record: &Record) -> RawEvent {
    RawEvent {
        message_name: message.to_string(),
        primary_entity_name: record.entity.clone(),
        primary_entity_id: record.id,
        user_id: Some(id(77)),
        initiating_user_id: Some(id(77)),
        depth: 1,
        target: Some(record.clone()),
        pre_images: BTreeMap::from([(DEFAULT_PRE_IMAGE.to_string(), record.clone())]),
        post_images: BTreeMap::from([(DEFAULT_POST_IMAGE.to_string(), record.clone())]),
    }
}

struct World {
    _dir: tempfile::TempDir,
    store: SqliteStore,
    zones: FixedOffsetZones,
    dispatcher: Dispatcher,
}

impl World {
    fn new(settings: Settings) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SqliteStore::open(&dir.path().join("records.db")).expect("open store");
        Self {
            _dir: dir,
            store,
            zones: FixedOffsetZones::default(),
            dispatcher: Dispatcher::new(RuleCatalog::builtin(), settings),
        }
    }

    fn seed(&self, records: &[Record]) {
        for record in records {
            self.store.upsert(record).expect("upsert");
        }
    }

    fn dispatch(&self, raw: &RawEvent) -> Result<Outcome, rollcall_core::error::Rejection> {
        self.dispatcher.dispatch(
            Services {
                store: &self.store,
                zones: &self.zones,
                validator: &NoopValidator,
            },
            raw,
        )
    }
}

fn registration(n: u128, slot: &EntityRef, registrant: u128) -> Record {
    Record::new("ctail_registration", id(n))
        .with("ctail_trainingslot", slot.clone())
        .with("ctail_training", EntityRef::new("ctail_training", id(100)))
        .with("ctail_registrant", EntityRef::new("contact", id(registrant)))
        .with(STATE_FIELD, 0)
}

#[test]
fn registration_lifecycle_tracks_filled_seats() {
    let world = World::new(Settings {
        validate_email: false,
        ..Settings::default()
    });
    let slot = EntityRef::new("ctail_trainingslot", id(50));
    world.seed(&[Record::new("ctail_trainingslot", slot.id)
        .with("ctail_totalseats", 2)
        .with(STATE_FIELD, 0)]);

    let filled = |world: &World| {
        world
            .store
            .get("ctail_trainingslot", slot.id, &["ctail_filledupseats"])
            .expect("slot")
            .get("ctail_filledupseats")
            .cloned()
    };

    for (n, registrant) in [(1, 11), (2, 12)] {
        let reg = registration(n, &slot, registrant);
        world.seed(&[reg.clone()]);
        world.dispatch(&event("Create", &reg)).expect("registration accepted");
    }
    assert_eq!(filled(&world), Some(Value::Integer(2)));

    let third = registration(3, &slot, 13);
    world.seed(&[third.clone()]);
    let rejection = world.dispatch(&event("Create", &third)).unwrap_err();
    assert_eq!(rejection.code, ErrorCode::CapacityExceeded);
    assert_eq!(filled(&world), Some(Value::Integer(2)));

    // the platform rolls the rejected create back
    world.seed(&[third.with(STATE_FIELD, 1)]);

    let gone = registration(1, &slot, 11);
    world.seed(&[gone.clone().with(STATE_FIELD, 1)]);
    let mut delete = event("Delete", &gone);
    delete.post_images.clear();
    world.dispatch(&delete).expect("delete");
    assert_eq!(filled(&world), Some(Value::Integer(1)));
}

#[test]
fn second_registration_for_same_slot_is_refused() {
    let world = World::new(Settings {
        validate_email: false,
        ..Settings::default()
    });
    let slot = EntityRef::new("ctail_trainingslot", id(50));
    let first = registration(1, &slot, 11);
    let again = registration(2, &slot, 11);
    world.seed(&[
        Record::new("ctail_trainingslot", slot.id)
            .with("ctail_totalseats", 10)
            .with(STATE_FIELD, 0),
        first,
        again.clone(),
    ]);

    let rejection = world.dispatch(&event("Create", &again)).unwrap_err();
    assert_eq!(rejection.message, ALREADY_REGISTERED);
    assert!(world.store.journal().expect("journal").is_empty());
}

#[test]
fn slot_conflict_is_detected_in_the_users_zone() {
    let world = World::new(Settings::default());
    let training = EntityRef::new("ctail_training", id(100));
    world.seed(&[
        Record::new("usersettings", id(78))
            .with("systemuserid", EntityRef::new("systemuser", id(77)))
            .with("timezonecode", 190),
        Record::new("ctail_trainingslot", id(2))
            .with("ctail_training", training.clone())
            .with("ctail_scheduleddate", at(15, 30))
            .with(STATE_FIELD, 0),
    ]);

    let clash = Record::new("ctail_trainingslot", id(3))
        .with("ctail_training", training.clone())
        .with("ctail_scheduleddate", at(10, 0));
    let rejection = world.dispatch(&event("Create", &clash)).unwrap_err();
    assert_eq!(rejection.message, SLOT_EXISTS);

    let fine = Record::new("ctail_trainingslot", id(4))
        .with("ctail_training", training)
        .with("ctail_scheduleddate", at(10, 1));
    assert!(matches!(
        world.dispatch(&event("Create", &fine)).expect("dispatch"),
        Outcome::Completed(_)
    ));
}

#[test]
fn group_change_rewrites_the_configured_list() {
    let list_id = id(900);
    let world = World::new(Settings {
        entity_list_id: Some(list_id),
        ..Settings::default()
    });
    world.seed(&[
        Record::new("adx_entitylist", list_id)
            .with("adx_filter_definition", generators::LIST_DOCUMENT),
        Record::new("ctail_group", id(1)).with("ctail_name", "Ops").with(STATE_FIELD, 0),
        Record::new("ctail_group", id(2)).with("ctail_name", "Dev").with(STATE_FIELD, 0),
        Record::new("ctail_group", id(3)).with("ctail_name", "Old").with(STATE_FIELD, 1),
    ]);

    let changed = Record::new("ctail_group", id(3)).with(STATE_FIELD, 1);
    world.dispatch(&event("Update", &changed)).expect("dispatch");

    let list = world
        .store
        .get("adx_entitylist", list_id, &["adx_filter_definition"])
        .expect("list");
    let text = list
        .get("adx_filter_definition")
        .and_then(Value::as_str)
        .expect("document");
    let doc = FilterDocument::parse(text).expect("parse");
    let labels: Vec<&str> = doc
        .spliced_conditions()
        .expect("splice")
        .iter()
        .filter_map(|c| c.ui_label.as_deref())
        .collect();
    assert_eq!(labels, vec!["Dev", "Ops"]);
}
