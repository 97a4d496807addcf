use s3dedupe::actions::ScriptedOperator;
use s3dedupe::commands::{run_delete, RunContext};
use s3dedupe::error::ExitCode;
use s3dedupe::inventory::{ContentFingerprint, FingerprintIndex, ListedObject, ObjectLocation};
use s3dedupe::register::{DuplicateRegister, RegisterError};
use s3dedupe::signal::ShutdownHandler;
use s3dedupe::storage::{MemoryStorage, ObjectRecord};
use std::fs;
use tempfile::tempdir;

fn listed(bucket: &str, key: &str, size: u64, digest: &str) -> ListedObject {
    ListedObject::new(bucket, ObjectRecord::new(key, size, digest))
}

#[test]
fn test_save_load_preserves_keys_and_order() {
    let index = FingerprintIndex::from_listing(vec![
        listed("z", "1", 7, "\"bbb\""),
        listed("a", "2", 7, "\"bbb\""),
        listed("a", "3", 3, "\"aaa\""),
        listed("m", "4", 3, "\"aaa\""),
        listed("m", "5", 3, "\"aaa\""),
        listed("m", "6", 9, "\"solo\""),
    ]);
    let register = DuplicateRegister::from_index(index);

    let dir = tempdir().unwrap();
    let path = dir.path().join("reg.json");
    register.save(&path).unwrap();
    let loaded = DuplicateRegister::load(&path).unwrap();

    let keys: Vec<String> = loaded.groups().map(|g| g.fingerprint.to_string()).collect();
    assert_eq!(keys, vec!["bbb,7", "aaa,3"]);
    assert_eq!(
        loaded.get(&ContentFingerprint::new("aaa", 3)).unwrap(),
        &[
            ObjectLocation::new("a", "3"),
            ObjectLocation::new("m", "4"),
            ObjectLocation::new("m", "5"),
        ]
    );
    assert_eq!(loaded, register);
}

#[test]
fn test_builder_never_emits_short_groups() {
    let index = FingerprintIndex::from_listing(vec![
        listed("a", "1", 1, "x"),
        listed("a", "2", 2, "x"),
        listed("a", "3", 3, "y"),
        listed("a", "4", 3, "y"),
    ]);
    let register = DuplicateRegister::from_index(index);
    assert!(register.groups().all(|g| g.locations.len() >= 2));
    assert_eq!(register.len(), 1);
}

#[test]
fn test_load_register_written_by_hand() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hand.json");
    fs::write(
        &path,
        r#"{
  "9a0364b9e99bb480dd25e1f0284c8555,7": [
    ["bucket-a", "dupe"],
    ["bucket-a", "dupe1"],
    ["bucket-b", "dupe"]
  ],
  "abc-2,10485760": [["b", "x"]]
}"#,
    )
    .unwrap();

    let register = DuplicateRegister::load(&path).unwrap();
    assert_eq!(register.len(), 2);
    assert_eq!(register.removable_count(), 2);

    let stats = register.stats();
    assert_eq!(stats.multipart_groups, 1);
    assert_eq!(stats.reclaimable_bytes, 14);
}

#[test]
fn test_key_with_commas_in_digest_uses_last_comma() {
    let register =
        DuplicateRegister::from_json(r#"{"odd,digest,12": [["a", "1"], ["a", "2"]]}"#).unwrap();
    let group = register.groups().next().unwrap();
    assert_eq!(group.fingerprint.digest, "odd,digest");
    assert_eq!(group.fingerprint.size, 12);
}

#[test]
fn test_invalid_size_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{"abc,-1": [["a", "1"], ["a", "2"]]}"#).unwrap();
    assert!(matches!(
        DuplicateRegister::load(&path),
        Err(RegisterError::Parse { .. })
    ));
}

#[test]
fn test_save_overwrites_existing_register() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reg.json");
    fs::write(&path, "stale").unwrap();

    DuplicateRegister::new().save(&path).unwrap();
    assert!(DuplicateRegister::load(&path).unwrap().is_empty());
}

#[test]
fn test_save_to_missing_directory_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("no/such/dir/reg.json");
    assert!(matches!(
        DuplicateRegister::new().save(&path),
        Err(RegisterError::Write { .. })
    ));
}

#[test]
fn test_huge_sizes_saturate_instead_of_overflowing() {
    let register = DuplicateRegister::from_json(
        r#"{"abc,18446744073709551615": [["a", "k"], ["a", "r1"], ["a", "r2"]],
            "def,10": [["a", "x"], ["a", "y"]]}"#,
    )
    .unwrap();

    let group = register.groups().next().unwrap();
    assert_eq!(group.reclaimable_bytes(), u64::MAX);
    let stats = register.stats();
    assert_eq!(stats.removable, 3);
    assert_eq!(stats.reclaimable_bytes, u64::MAX);
}

#[test]
fn test_huge_size_register_reaches_the_prompt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("huge.json");
    fs::write(
        &path,
        r#"{"abc,18446744073709551615": [["a", "k"], ["a", "r1"], ["a", "r2"]]}"#,
    )
    .unwrap();
    let storage = MemoryStorage::new();
    let mut operator = ScriptedOperator::new(["n"]);
    let ctx = RunContext::new(true, ShutdownHandler::new());

    let code = run_delete(&storage, &path, &mut operator, &ctx).unwrap();
    assert_eq!(code, ExitCode::Aborted);
    assert_eq!(operator.prompts().len(), 1);
}

#[test]
fn test_non_canonical_keys_rejected() {
    for key in ["abc,04", "abc, 4", "abc,4 ", "abc,+4"] {
        let json = format!(r#"{{"{key}": [["a", "k"], ["a", "r1"]]}}"#);
        assert!(DuplicateRegister::from_json(&json).is_err(), "{key} accepted");
    }
}

#[test]
fn test_aliasing_keys_never_drop_a_group() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("alias.json");
    fs::write(
        &path,
        r#"{"abc,4": [["a", "k"], ["a", "r1"]], "abc,04": [["b", "k"], ["b", "r1"]]}"#,
    )
    .unwrap();
    assert!(matches!(
        DuplicateRegister::load(&path),
        Err(RegisterError::Parse { .. })
    ));
}

#[test]
fn test_repeated_key_rejected() {
    let err = DuplicateRegister::from_json(
        r#"{"abc,4": [["a", "k"], ["a", "r1"]], "abc,4": [["b", "k"], ["b", "r1"]]}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("duplicate fingerprint 'abc,4'"));
}
