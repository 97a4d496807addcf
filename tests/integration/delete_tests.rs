use s3dedupe::actions::{
    ConsoleOperator, DeleteConfig, DeleteError, DeletionExecutor, DeletionOutcome, DeletionState,
    ScriptedOperator,
};
use s3dedupe::commands::{delete_register, run_check, run_delete, RunContext};
use s3dedupe::config::Config;
use s3dedupe::error::{exit_code_for, ExitCode};
use s3dedupe::inventory::{ContentFingerprint, ObjectLocation};
use s3dedupe::register::DuplicateRegister;
use s3dedupe::signal::ShutdownHandler;
use s3dedupe::storage::MemoryStorage;
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

fn ctx() -> RunContext {
    RunContext::new(true, ShutdownHandler::new())
}

fn loc(bucket: &str, key: &str) -> ObjectLocation {
    ObjectLocation::new(bucket, key)
}

fn two_buckets() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.put_object("A", "dupe", b"X");
    storage.put_object("A", "dupe1", b"X");
    storage.put_object("A", "notdupe", b"Y");
    storage.put_object("A", "empty", b"");
    storage.put_object("B", "dupe", b"X");
    storage.put_object("B", "empty", b"");
    storage
}

/// Run `check` against `storage` and return the register path.
fn checked(storage: &MemoryStorage) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let config = Config {
        register_path: dir.path().join("s3-duplicates.json"),
        ..Config::default()
    };
    run_check(storage, &config, &[], &ctx()).unwrap();
    (dir, config.register_path)
}

#[test]
fn test_check_then_delete_keeps_first_copy() {
    let storage = two_buckets();
    let (_dir, register) = checked(&storage);

    let mut operator = ScriptedOperator::new(["y", "y"]);
    let code = run_delete(&storage, &register, &mut operator, &ctx()).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(storage.contains("A", "dupe"));
    assert!(!storage.contains("A", "dupe1"));
    assert!(!storage.contains("B", "dupe"));
    assert!(storage.contains("A", "notdupe"));
    assert!(storage.contains("A", "empty"));
    assert!(storage.contains("B", "empty"));
}

#[test]
fn test_second_check_after_delete_finds_nothing() {
    let storage = two_buckets();
    let (_dir, register) = checked(&storage);
    run_delete(
        &storage,
        &register,
        &mut ScriptedOperator::new(["y", "y"]),
        &ctx(),
    )
    .unwrap();

    let dir = tempdir().unwrap();
    let config = Config {
        register_path: dir.path().join("again.json"),
        ..Config::default()
    };
    let code = run_check(&storage, &config, &[], &ctx()).unwrap();
    assert_eq!(code, ExitCode::NoDuplicates);
}

#[test]
fn test_answering_no_deletes_nothing() {
    for replies in [vec!["n"], vec!["y", "n"]] {
        let storage = two_buckets();
        let (_dir, register) = checked(&storage);

        let mut operator = ScriptedOperator::new(replies);
        let code = run_delete(&storage, &register, &mut operator, &ctx()).unwrap();

        assert_eq!(code, ExitCode::Aborted);
        assert!(storage.delete_log().is_empty());
        assert_eq!(storage.object_count(), 6);
    }
}

#[test]
fn test_failure_stops_remaining_groups() {
    let storage = MemoryStorage::new();
    for key in ["k", "r1", "r2"] {
        storage.put_object("g1", key, b"first");
    }
    for key in ["k", "r1"] {
        storage.put_object("g2", key, b"second");
    }
    storage.fail_deletes_of("g1", "r1");

    let mut register = DuplicateRegister::new();
    register.insert(
        ContentFingerprint::new("first", 5),
        vec![loc("g1", "k"), loc("g1", "r1"), loc("g1", "r2")],
    );
    register.insert(
        ContentFingerprint::new("second", 6),
        vec![loc("g2", "k"), loc("g2", "r1")],
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("register.json");
    register.save(&path).unwrap();

    let err = run_delete(
        &storage,
        &path,
        &mut ScriptedOperator::new(["y", "y"]),
        &ctx(),
    )
    .unwrap_err();

    assert_eq!(exit_code_for(&err), ExitCode::DeletionFailed);
    let delete_err = err.downcast_ref::<DeleteError>().unwrap();
    assert_eq!(delete_err.location(), Some(&loc("g1", "r1")));
    assert_eq!(
        storage.delete_log(),
        vec![("g1".to_string(), "r1".to_string())]
    );
    assert!(storage.contains("g1", "r2"));
    assert!(storage.contains("g2", "r1"));
}

#[test]
fn test_access_denied_delete_is_a_failure() {
    let storage = MemoryStorage::new();
    storage.put_object("open", "k", b"z");
    storage.add_denied_bucket("locked");

    let mut register = DuplicateRegister::new();
    register.insert(
        ContentFingerprint::new("z", 1),
        vec![loc("open", "k"), loc("locked", "copy")],
    );

    let mut executor = DeletionExecutor::new(&storage, DeleteConfig::default());
    let err = executor
        .run(&register, &mut ScriptedOperator::new(["y", "y"]))
        .unwrap_err();
    assert!(matches!(err, DeleteError::ObjectDelete { deleted: 0, .. }));
    assert_eq!(executor.state(), DeletionState::Failed);
    assert!(storage.contains("open", "k"));
}

#[test]
fn test_missing_register_reported_before_prompt() {
    let dir = tempdir().unwrap();
    let mut operator = ScriptedOperator::new(["y", "y"]);

    let err = run_delete(
        &two_buckets(),
        &dir.path().join("missing.json"),
        &mut operator,
        &ctx(),
    )
    .unwrap_err();

    assert_eq!(exit_code_for(&err), ExitCode::InvalidRegister);
    assert!(err.to_string().contains("invalid file path"));
    assert!(operator.prompts().is_empty());
}

#[test]
fn test_register_with_bad_key_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"justanetag": [["A", "dupe"], ["A", "dupe1"]]}"#).unwrap();
    let storage = two_buckets();
    let mut operator = ScriptedOperator::new(["y", "y"]);

    let err = run_delete(&storage, &path, &mut operator, &ctx()).unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::InvalidRegister);
    assert!(storage.delete_log().is_empty());
}

#[test]
fn test_console_operator_drives_deletion() {
    let storage = two_buckets();
    let (_dir, register_path) = checked(&storage);
    let register = DuplicateRegister::load(&register_path).unwrap();

    let mut operator = ConsoleOperator::new(Cursor::new("?\ny\ny\n"), Vec::new());
    let mut executor = DeletionExecutor::new(&storage, DeleteConfig::default());
    let outcome = executor.run(&register, &mut operator).unwrap();

    let DeletionOutcome::Succeeded(report) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(report.deleted, vec![loc("A", "dupe1"), loc("B", "dupe")]);
    assert_eq!(report.bytes_freed, 2);
}

#[test]
fn test_interrupted_before_first_delete() {
    let storage = two_buckets();
    let (_dir, register) = checked(&storage);
    let ctx = ctx();
    ctx.shutdown.request_shutdown();

    let code = run_delete(
        &storage,
        &register,
        &mut ScriptedOperator::new(["y", "y"]),
        &ctx,
    )
    .unwrap();
    assert_eq!(code, ExitCode::Interrupted);
    assert!(storage.delete_log().is_empty());
}

#[test]
fn test_preloaded_register_is_not_read_again() {
    let storage = two_buckets();
    let (_dir, path) = checked(&storage);
    let register = DuplicateRegister::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let code = delete_register(
        &storage,
        &register,
        &path,
        &mut ScriptedOperator::new(["y", "y"]),
        &ctx(),
    )
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(storage.contains("A", "dupe"));
    assert!(!storage.contains("A", "dupe1"));
    assert!(!storage.contains("B", "dupe"));
}
