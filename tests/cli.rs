use assert_cmd::prelude::*;
use caskdb::{Bitcask, Storage, StorageResult};
use predicates::boolean::PredicateBooleanExt;
use predicates::ord::eq;
use predicates::str::{contains, is_empty, PredicateStrExt};
use std::process::Command;
use tempfile::TempDir;

// `caskdb` with no args should exit with a non-zero code.
#[test]
fn cli_no_args() {
    Command::cargo_bin("caskdb").unwrap().assert().failure();
}

// `caskdb -V` should print the version
#[test]
fn cli_version() {
    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["-V"])
        .assert()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

// `caskdb get <KEY>` should print "Key not found" for a non-existent key and exit with zero.
#[test]
fn cli_get_non_existent_key() {
    let temp_dir = TempDir::new().unwrap();
    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["get", "key1"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(eq("Key not found").trim());
}

// `caskdb rm <KEY>` should print "Key not found" for an empty database and exit with non-zero code.
#[test]
fn cli_rm_non_existent_key() {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["rm", "key1"])
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stdout(eq("Key not found").trim());
}

// `caskdb set <KEY> <VALUE>` should print nothing and exit with zero.
#[test]
fn cli_set() {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["set", "key1", "value1"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(is_empty());
}

#[test]
fn cli_get_stored() -> StorageResult<()> {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");

    let mut store = Bitcask::open(temp_dir.path())?;
    store.set(b"key1", b"value1")?;
    store.set(b"key2", b"value2")?;
    store.close()?;

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["get", "key1"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(eq("value1").trim());

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["get", "key2"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(eq("value2").trim());

    Ok(())
}

// `caskdb rm <KEY>` should print nothing and exit with zero.
#[test]
fn cli_rm_stored() -> StorageResult<()> {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");

    let mut store = Bitcask::open(temp_dir.path())?;
    store.set(b"key1", b"value1")?;
    store.close()?;

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["rm", "key1"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(is_empty());

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["get", "key1"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(eq("Key not found").trim());

    Ok(())
}

// `caskdb keys` should print every live key.
#[test]
fn cli_keys() -> StorageResult<()> {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");

    let mut store = Bitcask::open(temp_dir.path())?;
    store.set(b"key1", b"value1")?;
    store.set(b"key2", b"value2")?;
    store.remove(b"key1")?;
    store.close()?;

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["keys"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(contains("key2").and(contains("key1").not()));

    Ok(())
}

#[test]
fn cli_invalid_get() {
    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["get"])
        .assert()
        .failure();

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["get", "extra", "field"])
        .assert()
        .failure();
}

#[test]
fn cli_invalid_set() {
    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["set"])
        .assert()
        .failure();

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["set", "missing_field"])
        .assert()
        .failure();

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["set", "extra", "extra", "field"])
        .assert()
        .failure();
}

#[test]
fn cli_invalid_rm() {
    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["rm"])
        .assert()
        .failure();

    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["rm", "extra", "field"])
        .assert()
        .failure();
}

#[test]
fn cli_invalid_subcommand() {
    Command::cargo_bin("caskdb")
        .unwrap()
        .args(["unknown", "subcommand"])
        .assert()
        .failure();
}
