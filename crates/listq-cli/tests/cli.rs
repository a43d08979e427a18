//! Tests for the listq binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn listq() -> Command {
    let mut command = Command::cargo_bin("listq").unwrap();
    command.env_remove("LISTQ_CONFIG").env_remove("RUST_LOG");
    command
}

#[test]
fn test_keys_are_hash_tagged_and_co_located() {
    listq()
        .args(["keys", "orders"])
        .assert()
        .success()
        .stdout(predicate::str::contains("{orders}:PROCESSING"))
        .stdout(predicate::str::contains("slot 105"))
        .stdout(predicate::str::contains("co-located: yes"));
}

#[test]
fn test_keys_without_hash_tags_span_slots() {
    listq()
        .args(["keys", "orders", "--no-hash-tags"])
        .assert()
        .success()
        .stdout(predicate::str::contains("orders:PROCESSING"))
        .stdout(predicate::str::contains("co-located: no"));
}

#[test]
fn test_keys_json_output() {
    listq()
        .args(["keys", "orders", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"co_located\": true"));
}

#[test]
fn test_invalid_queue_name_exits_with_configuration_code() {
    listq()
        .args(["keys", "bad{name}"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_stats_on_fresh_memory_store() {
    listq()
        .args(["--queue", "orders", "stats", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ready\": 0"));
}

#[test]
fn test_produce_prints_message_id() {
    listq()
        .args(["produce", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f-]{36}\n$").unwrap());
}

#[test]
fn test_config_file_is_applied() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    writeln!(file, "[queue]\nname = \"invoices\"\nmax_deliveries = 9").unwrap();

    listq()
        .arg("--config")
        .arg(file.path())
        .args(["config", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"invoices\""))
        .stdout(predicate::str::contains("\"max_deliveries\": 9"));
}

#[test]
fn test_redis_without_urls_is_rejected() {
    listq()
        .env("LISTQ__STORE__KIND", "redis")
        .args(["stats"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("store.urls"));
}
