use s3dedupe::commands::{check, run_check, RunContext};
use s3dedupe::config::Config;
use s3dedupe::error::ExitCode;
use s3dedupe::inventory::{ContentFingerprint, ListerConfig, ObjectLister, ObjectLocation};
use s3dedupe::register::DuplicateRegister;
use s3dedupe::signal::ShutdownHandler;
use s3dedupe::storage::MemoryStorage;
use std::path::Path;
use tempfile::tempdir;

fn ctx() -> RunContext {
    RunContext::new(true, ShutdownHandler::new())
}

fn config_in(dir: &Path) -> Config {
    Config {
        register_path: dir.join("s3-duplicates.json"),
        ..Config::default()
    }
}

/// Bucket A holds dupe, dupe1 (same content), notdupe and an empty object;
/// bucket B holds another copy of dupe and another empty object.
fn two_buckets(page_size: usize) -> MemoryStorage {
    let storage = MemoryStorage::with_page_size(page_size);
    storage.put_object("A", "dupe", b"X");
    storage.put_object("A", "dupe1", b"X");
    storage.put_object("A", "notdupe", b"Y");
    storage.put_object("A", "empty", b"");
    storage.put_object("B", "dupe", b"X");
    storage.put_object("B", "empty", b"");
    storage
}

fn x_fingerprint() -> ContentFingerprint {
    ContentFingerprint::new(&blake3::hash(b"X").to_hex(), 1)
}

#[test]
fn test_two_bucket_scenario() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let storage = two_buckets(1000);

    let report = check(&storage, &config, &[], &ctx()).unwrap();

    assert_eq!(report.register.len(), 1);
    assert_eq!(
        report.register.get(&x_fingerprint()).unwrap(),
        &[
            ObjectLocation::new("A", "dupe"),
            ObjectLocation::new("A", "dupe1"),
            ObjectLocation::new("B", "dupe"),
        ]
    );
    assert_eq!(report.listing.buckets_listed, 2);
    assert_eq!(report.listing.objects_listed, 6);
    assert_eq!(report.index.empty_skipped, 2);

    let on_disk = DuplicateRegister::load(&config.register_path).unwrap();
    assert_eq!(on_disk, report.register);
}

#[test]
fn test_register_json_matches_expected_document() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    run_check(&two_buckets(1000), &config, &[], &ctx()).unwrap();

    let text = std::fs::read_to_string(&config.register_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let key = format!("{},1", blake3::hash(b"X").to_hex());
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert_eq!(
        object[&key],
        serde_json::json!([["A", "dupe"], ["A", "dupe1"], ["B", "dupe"]])
    );
}

#[test]
fn test_pagination_does_not_change_result() {
    for page_size in [1, 2, 3, 1000] {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let storage = two_buckets(page_size);

        let report = check(&storage, &config, &[], &ctx()).unwrap();
        assert_eq!(report.register.len(), 1, "page size {page_size}");
        assert_eq!(report.listing.objects_listed, 6, "page size {page_size}");
        assert_eq!(
            report.register.get(&x_fingerprint()).unwrap().len(),
            3,
            "page size {page_size}"
        );
    }
}

#[test]
fn test_parallel_listing_keeps_discovery_order() {
    let storage = MemoryStorage::with_page_size(2);
    for bucket in ["b1", "b2", "b3", "b4"] {
        for key in ["k1", "k2", "k3"] {
            storage.put_object(bucket, key, b"same");
        }
    }

    let sequential = ObjectLister::new(&storage, ListerConfig::default())
        .index()
        .unwrap()
        .0;
    let parallel = ObjectLister::new(&storage, ListerConfig::default().with_list_threads(4))
        .index()
        .unwrap()
        .0;

    let seq: Vec<_> = sequential.iter().map(|(fp, locs)| (fp.clone(), locs.to_vec())).collect();
    let par: Vec<_> = parallel.iter().map(|(fp, locs)| (fp.clone(), locs.to_vec())).collect();
    assert_eq!(seq, par);
    assert_eq!(seq[0].1.len(), 12);
    assert_eq!(seq[0].1[0], ObjectLocation::new("b1", "k1"));
}

#[test]
fn test_inaccessible_buckets_are_skipped() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let storage = two_buckets(1000);
    storage.add_denied_bucket("C");
    storage.add_missing_bucket("D");

    let report = check(&storage, &config, &[], &ctx()).unwrap();
    assert_eq!(report.listing.buckets_total, 4);
    assert_eq!(report.listing.buckets_skipped, 2);
    assert_eq!(report.register.len(), 1);
}

#[test]
fn test_bucket_filter_restricts_and_orders() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let storage = two_buckets(1000);

    let buckets = vec!["B".to_string(), "A".to_string()];
    let report = check(&storage, &config, &buckets, &ctx()).unwrap();
    let group = report.register.get(&x_fingerprint()).unwrap();
    assert_eq!(group[0], ObjectLocation::new("B", "dupe"));

    let only_b = vec!["B".to_string()];
    let code = run_check(&storage, &config, &only_b, &ctx()).unwrap();
    assert_eq!(code, ExitCode::NoDuplicates);
}

#[test]
fn test_empty_objects_never_duplicates() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let storage = MemoryStorage::new();
    storage.put_object("A", "e1", b"");
    storage.put_object("A", "e2", b"");
    storage.put_object("B", "e3", b"");

    let code = run_check(&storage, &config, &[], &ctx()).unwrap();
    assert_eq!(code, ExitCode::NoDuplicates);
}

#[test]
fn test_quoted_and_unquoted_etags_match() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let storage = MemoryStorage::new();
    storage.put_object_with_digest("A", "one", 10, "\"abc\"");
    storage.put_object_with_digest("B", "two", 10, "abc");
    storage.put_object_with_digest("B", "three", 11, "abc");

    let report = check(&storage, &config, &[], &ctx()).unwrap();
    assert_eq!(report.register.len(), 1);
    assert_eq!(
        report
            .register
            .get(&ContentFingerprint::new("abc", 10))
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_multipart_groups_counted() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let storage = MemoryStorage::new();
    storage.put_object_with_digest("A", "big1", 20_000_000, "\"d41d8cd98f00b204-3\"");
    storage.put_object_with_digest("A", "big2", 20_000_000, "\"d41d8cd98f00b204-3\"");

    let report = check(&storage, &config, &[], &ctx()).unwrap();
    let stats = report.register.stats();
    assert_eq!(stats.multipart_groups, 1);
    assert_eq!(stats.reclaimable_bytes, 20_000_000);
}
