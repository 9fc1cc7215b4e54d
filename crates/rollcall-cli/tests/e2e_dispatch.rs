//! E2E CLI tests covering:
//! - `rollcall init` / `import` / `show`
//! - `rollcall dispatch`: completed rollups, rejections and skips
//! - `rollcall rewrite` offline
//!
//! Each test runs the `rollcall` binary in an isolated temp directory with
//! the email validator disabled.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

const SLOT: &str = "00000000-0000-0000-0000-000000000010";
const TRAINING: &str = "00000000-0000-0000-0000-000000000020";
const FIRST: &str = "00000000-0000-0000-0000-000000000101";
const SECOND: &str = "00000000-0000-0000-0000-000000000102";
const ADA: &str = "00000000-0000-0000-0000-000000000201";

fn rc_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rollcall"));
    cmd.current_dir(dir);
    cmd.env("ROLLCALL_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd
}

fn init_project(dir: &Path) {
    rc_cmd(dir).arg("init").assert().success();
    std::fs::write(
        dir.join(".rollcall/config.toml"),
        "[validator]\nenabled = false\n",
    )
    .expect("write config");
}

fn reference(entity: &str, id: &str) -> Value {
    json!({ "reference": { "entity": entity, "id": id } })
}

fn registration(id: &str, registrant: &str) -> Value {
    json!({
        "entity": "ctail_registration",
        "id": id,
        "fields": {
            "ctail_trainingslot": reference("ctail_trainingslot", SLOT),
            "ctail_training": reference("ctail_training", TRAINING),
            "ctail_registrant": reference("contact", registrant),
            "statecode": { "integer": 0 }
        }
    })
}

fn slot(total_seats: i64) -> Value {
    json!({
        "entity": "ctail_trainingslot",
        "id": SLOT,
        "fields": {
            "ctail_training": reference("ctail_training", TRAINING),
            "ctail_totalseats": { "integer": total_seats },
            "statecode": { "integer": 0 }
        }
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(value).expect("encode")).expect("write");
    name.to_string()
}

fn import(dir: &Path, records: &[Value]) {
    let file = write_json(dir, "records.json", &Value::Array(records.to_vec()));
    rc_cmd(dir).args(["import", &file]).assert().success();
}

fn create_event(record: &Value) -> Value {
    json!({
        "message_name": "Create",
        "primary_entity_name": record["entity"],
        "primary_entity_id": record["id"],
        "target": record,
        "post_images": { "PostImage": record }
    })
}

fn dispatch_json(dir: &Path, event: &Value) -> std::process::Output {
    let file = write_json(dir, "event.json", event);
    rc_cmd(dir)
        .args(["dispatch", &file, "--json"])
        .output()
        .expect("dispatch should not crash")
}

fn filled_seats(dir: &Path) -> Value {
    let output = rc_cmd(dir)
        .args(["show", "ctail_trainingslot", SLOT, "--json"])
        .output()
        .expect("show should not crash");
    assert!(output.status.success());
    let record: Value = serde_json::from_slice(&output.stdout).expect("show --json is JSON");
    record["fields"]["ctail_filledupseats"].clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn init_creates_store_and_config() {
    let dir = TempDir::new().expect("temp dir");
    rc_cmd(dir.path())
        .args(["init", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"schema_version\": 2"));
    assert!(dir.path().join(".rollcall/records.db").exists());
    assert!(dir.path().join(".rollcall/config.toml").exists());

    rc_cmd(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn commands_need_an_initialized_project() {
    let dir = TempDir::new().expect("temp dir");
    rc_cmd(dir.path())
        .args(["show", "ctail_trainingslot", SLOT])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rollcall init"));
}

#[test]
fn import_then_show_in_text_mode() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    import(dir.path(), &[slot(20)]);

    rc_cmd(dir.path())
        .args(["show", "ctail_trainingslot", SLOT, "-f", "ctail_totalseats"])
        .assert()
        .success()
        .stdout("ctail_totalseats\t20\n");
}

#[test]
fn registration_create_updates_filled_seats() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    let first = registration(FIRST, ADA);
    import(dir.path(), &[slot(20), first.clone()]);

    let output = dispatch_json(dir.path(), &create_event(&first));
    assert!(
        output.status.success(),
        "dispatch failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let outcome: Value = serde_json::from_slice(&output.stdout).expect("outcome JSON");
    assert_eq!(outcome["outcome"], "completed");
    assert_eq!(outcome["validations"], json!(["email", "duplicate"]));
    assert_eq!(outcome["rollup"]["result"], "written");
    assert_eq!(outcome["rollup"]["field"], "ctail_filledupseats");

    assert_eq!(filled_seats(dir.path()), json!({ "integer": 1 }));
}

#[test]
fn duplicate_registration_is_rejected_with_nonzero_exit() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    let second = registration(SECOND, ADA);
    import(dir.path(), &[slot(20), registration(FIRST, ADA), second.clone()]);

    let file = write_json(dir.path(), "event.json", &create_event(&second));
    rc_cmd(dir.path())
        .args(["dispatch", &file])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "error[E2001]: You are already registered for the training!",
        ));

    // nothing was rolled up
    assert_eq!(filled_seats(dir.path()), Value::Null);
}

#[test]
fn over_capacity_is_rejected_in_json() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    let second = registration(SECOND, "00000000-0000-0000-0000-000000000202");
    import(dir.path(), &[slot(1), registration(FIRST, ADA), second.clone()]);

    let output = dispatch_json(dir.path(), &create_event(&second));
    assert!(!output.status.success());
    let error: Value = serde_json::from_slice(&output.stderr).expect("error JSON");
    assert_eq!(error["error"]["error_code"], "E2002");
    assert_eq!(
        error["error"]["message"],
        "Looks like it is a houseful. Try again for a different slot!"
    );
}

#[test]
fn unknown_entity_and_message_are_skipped() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());

    let account = json!({ "entity": "account", "id": SLOT, "fields": {} });
    let output = dispatch_json(dir.path(), &create_event(&account));
    assert!(output.status.success());
    let outcome: Value = serde_json::from_slice(&output.stdout).expect("outcome JSON");
    assert_eq!(outcome["outcome"], "skipped");
    assert_eq!(outcome["reason"], "not_subscribed");

    let mut assign = create_event(&registration(FIRST, ADA));
    assign["message_name"] = json!("Assign");
    let file = write_json(dir.path(), "assign.json", &assign);
    rc_cmd(dir.path())
        .args(["dispatch", &file])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped\tunsupported message 'Assign'"));
}

#[test]
fn group_event_without_list_id_reports_missing_configuration() {
    let dir = TempDir::new().expect("temp dir");
    init_project(dir.path());
    let group = json!({
        "entity": "ctail_group",
        "id": FIRST,
        "fields": { "ctail_name": { "string": "Sales" }, "statecode": { "integer": 0 } }
    });
    import(dir.path(), &[group.clone()]);

    let file = write_json(dir.path(), "event.json", &create_event(&group));
    rc_cmd(dir.path())
        .args(["dispatch", &file])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Plugin Configuration missing."));
}

#[test]
fn rewrite_splices_references_offline() {
    let dir = TempDir::new().expect("temp dir");
    let document = json!({
        "distinct": true,
        "entity": {
            "name": "ctail_training",
            "links": [{
                "name": "ctail_ctail_group_ctail_training",
                "from": "ctail_trainingid",
                "to": "ctail_trainingid",
                "links": [{
                    "name": "ctail_group",
                    "from": "ctail_groupid",
                    "to": "ctail_groupid",
                    "filters": [{ "type": "or", "conditions": [] }]
                }]
            }]
        }
    });
    let refs = json!([
        { "entity": "ctail_group", "id": FIRST, "name": "Sales & Ops" },
        { "entity": "ctail_group", "id": SECOND, "name": "Support" }
    ]);
    write_json(dir.path(), "filter.json", &document);
    write_json(dir.path(), "groups.json", &refs);

    rc_cmd(dir.path())
        .args(["rewrite", "filter.json", "--refs", "groups.json", "-o", "out.json"])
        .assert()
        .success();

    let text = std::fs::read_to_string(dir.path().join("out.json")).expect("read output");
    let rewritten: Value = serde_json::from_str(&text).expect("output is JSON");
    let conditions =
        &rewritten["entity"]["links"][0]["links"][0]["filters"][0]["conditions"];
    assert_eq!(conditions[0]["uiname"], "Sales & Ops");
    assert_eq!(conditions[1]["value"], SECOND);
    assert_eq!(conditions[1]["adx.id"], "1");
    let raw = rewritten["entity"]["links"][0]["adx.rawfetch"]
        .as_str()
        .expect("raw fragment");
    assert!(raw.contains("uiname='Sales &amp; Ops'"));
}

#[test]
fn rewrite_rejects_document_without_splice_point() {
    let dir = TempDir::new().expect("temp dir");
    write_json(
        dir.path(),
        "filter.json",
        &json!({ "entity": { "name": "ctail_training", "links": [] } }),
    );
    write_json(dir.path(), "groups.json", &json!([]));

    rc_cmd(dir.path())
        .args(["rewrite", "filter.json", "--refs", "groups.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to rewrite"));
}
