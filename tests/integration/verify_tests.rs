use s3dedupe::actions::{verify_register, ScriptedOperator, VerifyConfig};
use s3dedupe::commands::{run_check, run_delete, run_verify, RunContext};
use s3dedupe::config::Config;
use s3dedupe::error::ExitCode;
use s3dedupe::inventory::ObjectLocation;
use s3dedupe::register::DuplicateRegister;
use s3dedupe::signal::ShutdownHandler;
use s3dedupe::storage::MemoryStorage;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

fn ctx() -> RunContext {
    RunContext::new(true, ShutdownHandler::new())
}

fn seeded() -> (MemoryStorage, TempDir, PathBuf) {
    let storage = MemoryStorage::new();
    storage.put_object("A", "dupe", b"X");
    storage.put_object("A", "dupe1", b"X");
    storage.put_object("B", "dupe", b"X");
    storage.put_object("B", "other", b"ZZ");
    storage.put_object("C", "other", b"ZZ");

    let dir = tempdir().unwrap();
    let config = Config {
        register_path: dir.path().join("s3-duplicates.json"),
        ..Config::default()
    };
    run_check(&storage, &config, &[], &ctx()).unwrap();
    (storage, dir, config.register_path)
}

#[test]
fn test_verify_before_and_after_delete() {
    let (storage, _dir, path) = seeded();
    let register = DuplicateRegister::load(&path).unwrap();

    let before = verify_register(&storage, &register, &VerifyConfig::default()).unwrap();
    assert!(before.is_ok());
    assert_eq!(before.groups_checked, 2);
    assert_eq!(
        before.removables_remaining,
        vec![
            ObjectLocation::new("A", "dupe1"),
            ObjectLocation::new("B", "dupe"),
            ObjectLocation::new("C", "other"),
        ]
    );

    run_delete(
        &storage,
        &path,
        &mut ScriptedOperator::new(["y", "y"]),
        &ctx(),
    )
    .unwrap();

    let after = verify_register(&storage, &register, &VerifyConfig::default()).unwrap();
    assert!(after.is_ok());
    assert!(after.removables_remaining.is_empty());
    assert_eq!(run_verify(&storage, &path, &ctx()).unwrap(), ExitCode::Success);
}

#[test]
fn test_missing_keeper_fails_verification() {
    let (storage, _dir, path) = seeded();
    let register = DuplicateRegister::load(&path).unwrap();
    let first = register.groups().next().unwrap();
    let keeper = first.keeper().unwrap().clone();

    let mut tampered = DuplicateRegister::new();
    tampered.insert(
        first.fingerprint.clone(),
        vec![ObjectLocation::new("A", "gone"), keeper],
    );
    tampered.save(&path).unwrap();

    assert_eq!(
        run_verify(&storage, &path, &ctx()).unwrap(),
        ExitCode::VerificationFailed
    );
    let report = verify_register(&storage, &tampered, &VerifyConfig::default()).unwrap();
    assert_eq!(report.keepers_missing, vec![ObjectLocation::new("A", "gone")]);
}

#[test]
fn test_changed_keeper_is_only_a_warning() {
    let (storage, _dir, path) = seeded();
    storage.put_object("A", "dupe", b"rewritten");

    let register = DuplicateRegister::load(&path).unwrap();
    let report = verify_register(&storage, &register, &VerifyConfig::default()).unwrap();
    assert_eq!(report.keepers_changed, vec![ObjectLocation::new("A", "dupe")]);
    assert!(report.is_ok());
    assert_eq!(run_verify(&storage, &path, &ctx()).unwrap(), ExitCode::Success);
}

#[test]
fn test_verify_performs_no_deletes() {
    let (storage, _dir, path) = seeded();
    run_verify(&storage, &path, &ctx()).unwrap();
    assert!(storage.delete_log().is_empty());
    assert_eq!(storage.object_count(), 5);
}

#[test]
fn test_verify_interrupted() {
    let (storage, _dir, path) = seeded();
    let ctx = ctx();
    ctx.shutdown.request_shutdown();
    assert_eq!(run_verify(&storage, &path, &ctx).unwrap(), ExitCode::Interrupted);
}

#[test]
fn test_verify_missing_register() {
    let storage = MemoryStorage::new();
    let dir = tempdir().unwrap();
    assert!(run_verify(&storage, &dir.path().join("none.json"), &ctx()).is_err());
}
