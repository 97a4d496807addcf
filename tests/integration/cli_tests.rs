use clap::Parser;
use s3dedupe::cli::Cli;
use s3dedupe::error::{exit_code_for, ExitCode};
use s3dedupe::register::DuplicateRegister;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// A bucket tree plus an empty config file so the platform config is never read.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), "").unwrap();
        for (rel, content) in [
            ("buckets/A/dupe", "X"),
            ("buckets/A/dupe1", "X"),
            ("buckets/A/notdupe", "Y"),
            ("buckets/B/dupe", "X"),
        ] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn run(&self, args: &[&str]) -> anyhow::Result<ExitCode> {
        let config = self.path("config.toml");
        let mut argv = vec!["s3dedupe", "-q", "--config", config.to_str().unwrap()];
        argv.extend_from_slice(args);
        s3dedupe::run_app(Cli::try_parse_from(argv).unwrap())
    }
}

fn as_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_check_with_local_root() {
    let fx = Fixture::new();
    let root = fx.path("buckets");
    let out = fx.path("register.json");

    let code = fx
        .run(&["check", "--root", as_str(&root), "-o", as_str(&out)])
        .unwrap();

    assert_eq!(code, ExitCode::Success);
    let register = DuplicateRegister::load(&out).unwrap();
    assert_eq!(register.len(), 1);
    assert_eq!(register.removable_count(), 2);
}

#[test]
fn test_check_then_verify_with_local_root() {
    let fx = Fixture::new();
    let root = fx.path("buckets");
    let out = fx.path("register.json");
    fx.run(&["check", "--root", as_str(&root), "-o", as_str(&out)])
        .unwrap();

    let code = fx
        .run(&["verify", as_str(&out), "--root", as_str(&root)])
        .unwrap();
    assert_eq!(code, ExitCode::Success);

    fs::remove_file(root.join("A/dupe")).unwrap();
    let code = fx
        .run(&["verify", as_str(&out), "--root", as_str(&root)])
        .unwrap();
    assert_eq!(code, ExitCode::VerificationFailed);
}

#[test]
fn test_check_without_duplicates() {
    let fx = Fixture::new();
    let root = fx.path("buckets");
    let out = fx.path("register.json");

    let code = fx
        .run(&[
            "check",
            "--root",
            as_str(&root),
            "-b",
            "B",
            "-o",
            as_str(&out),
        ])
        .unwrap();
    assert_eq!(code, ExitCode::NoDuplicates);
    assert!(DuplicateRegister::load(&out).unwrap().is_empty());
}

#[test]
fn test_local_backend_without_root_fails() {
    let fx = Fixture::new();
    let out = fx.path("register.json");

    let err = fx
        .run(&["check", "--backend", "local", "-o", as_str(&out)])
        .unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::GeneralError);
    assert!(!out.exists());
}

#[test]
fn test_delete_missing_register() {
    let fx = Fixture::new();
    let root = fx.path("buckets");
    let missing = fx.path("nope.json");

    let err = fx
        .run(&["delete", as_str(&missing), "--root", as_str(&root)])
        .unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::InvalidRegister);
    assert_eq!(exit_code_for(&err).code_prefix(), "SD005");
}

#[test]
fn test_missing_config_file_is_an_error() {
    let fx = Fixture::new();
    let config = fx.path("absent.toml");
    let cli = Cli::try_parse_from([
        "s3dedupe",
        "-q",
        "--config",
        as_str(&config),
        "check",
        "--root",
        as_str(&fx.path("buckets")),
    ])
    .unwrap();

    let err = s3dedupe::run_app(cli).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn test_config_init_writes_defaults_once() {
    let fx = Fixture::new();
    let target = fx.path("fresh/config.toml");
    let cli = || {
        Cli::try_parse_from(["s3dedupe", "-q", "--config", as_str(&target), "config", "--init"])
            .unwrap()
    };

    assert_eq!(s3dedupe::run_app(cli()).unwrap(), ExitCode::Success);
    assert!(target.exists());
    assert!(s3dedupe::run_app(cli()).is_err());
}
