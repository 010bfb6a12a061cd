//! Ownership violations abort the process
//!
//! Each test re-runs this test binary with `GUILDHALL_FATAL_CHILD` set, so
//! the abort happens in a child process.

#![cfg(feature = "check-mode")]

use std::process::{Command, Output};
use std::sync::mpsc;

use guildhall::*;

const CHILD_ENV: &str = "GUILDHALL_FATAL_CHILD";

fn is_child() -> bool {
    std::env::var_os(CHILD_ENV).is_some()
}

fn run_child(test_name: &str) -> Output {
    let exe = std::env::current_exe().expect("test binary path");
    Command::new(exe)
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .output()
        .expect("failed to run child")
}

#[test]
fn test_mutating_moved_object_aborts() {
    if is_child() {
        let main = main_guild_bootstrap().unwrap();
        let x = main.alloc_record(Record::new("Point"));
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let _g1 = create_guild(&main, SpawnOptions::new(), vec![x.clone()], move |_| {
            let _ = release_rx.recv();
            Ok(Value::Nil)
        })
        .unwrap();

        let _ = main.set_field(&x, "y", Value::Int(1));
        drop(release_tx);
        unreachable!("confirm_belonging must abort");
    }

    let output = run_child("test_mutating_moved_object_aborts");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("belongs to guild id 2, current guild id: 1"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_object_left_with_exited_guild_aborts() {
    if is_child() {
        let main = main_guild_bootstrap().unwrap();
        let x = main.alloc_array(vec![]);
        let g = create_guild(&main, SpawnOptions::new(), vec![x.clone()], |_| Ok(Value::Nil))
            .unwrap();
        g.join(&main).unwrap();

        let _ = main.push(&x, Value::Int(1));
        unreachable!("confirm_belonging must abort");
    }

    let output = run_child("test_object_left_with_exited_guild_aborts");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("was moved to guild id 2, which has exited (current guild id: 1)"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_untagged_object_aborts() {
    if is_child() {
        let main = main_guild_bootstrap().unwrap();
        let stray = Value::Object(HeapObject::new(ObjectBody::Array(vec![]), 0));
        confirm_belonging(&main, &stray);
        unreachable!("confirm_belonging must abort");
    }

    let output = run_child("test_untagged_object_aborts");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("owner id 0 but is not shareable"), "stderr: {}", stderr);
}

#[test]
fn test_owned_access_does_not_abort() {
    if is_child() {
        let main = main_guild_bootstrap().unwrap();
        let x = main.alloc_array(vec![]);
        main.push(&x, Value::Int(1)).unwrap();
        return;
    }

    let output = run_child("test_owned_access_does_not_abort");
    assert!(output.status.success());
}
