//! Integration tests for batch runs over files, directories and flat
//! containers.

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use nestpack::{BatchConfig, BatchExecutor, BatchReport, METADATA_ENTRY};
use tempfile::TempDir;

use common::*;

fn run(config: BatchConfig) -> BatchReport {
    BatchExecutor::new(config).unwrap().run().unwrap()
}

fn marked(path: &Path) -> PathBuf {
    write_archive(path, &[("a.txt", b"alpha"), (METADATA_ENTRY, CONDITIONED)])
}

fn processed_paths(report: &BatchReport) -> Vec<&str> {
    report
        .processed
        .iter()
        .map(|p| p.relative_path.as_str())
        .collect()
}

// ============================================================================
// Directory walks
// ============================================================================

#[test]
fn test_walk_mirrors_directory_layout() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    marked(&input.join("a.pkg"));
    marked(&input.join("sub/deeper/b.pkg"));
    write_archive(&input.join("c.pkg"), &[("c.txt", b"unmarked")]);
    write_file(&input.join("sub/notes.txt"), b"not an archive");

    let report = run(BatchConfig::new(&input, &out));

    assert!(report.is_success());
    assert_eq!(processed_paths(&report), ["a.pkg", "c.pkg", "sub/deeper/b.pkg"]);
    assert_eq!(report.changed_count(), 2);
    assert!(out.join("a.pkg").exists());
    assert!(out.join("sub/deeper/b.pkg").exists());
    assert!(!out.join("c.pkg").exists());
    assert_eq!(mtime_secs(&out.join("sub/deeper/b.pkg")), INPUT_MTIME);

    let unmarked = report
        .processed
        .iter()
        .find(|p| p.relative_path == "c.pkg")
        .unwrap();
    assert!(!unmarked.changed);
    assert_eq!(unmarked.output, input.join("c.pkg"));
}

#[test]
fn test_condition_processes_unmarked_archives() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    write_archive(&input.join("c.pkg"), &[("c.txt", b"unmarked")]);

    let report = run(BatchConfig::new(&input, &out).condition(true));

    assert_eq!(report.changed_count(), 1);
    assert!(metadata_of(&out.join("c.pkg")).is_flag_set("pipeline.conditioned"));
}

#[test]
fn test_filter_selects_files() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    marked(&input.join("a.pkg"));
    marked(&input.join("b.jar"));

    let report = run(BatchConfig::new(&input, dir.path().join("out")).filter("*.jar"));

    assert_eq!(processed_paths(&report), ["b.jar"]);
}

#[test]
fn test_walk_skips_output_dir_and_temp_leftovers() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = input.join("out");
    marked(&input.join("a.pkg"));
    marked(&input.join(".nestpack-d1-stale/old.pkg"));

    let first = run(BatchConfig::new(&input, &out));
    assert_eq!(processed_paths(&first), ["a.pkg"]);

    // the output written by the first run is not picked up again
    let second = run(BatchConfig::new(&input, &out));
    assert_eq!(processed_paths(&second), ["a.pkg"]);
}

#[test]
fn test_single_file_input() {
    let dir = TempDir::new().unwrap();
    let input = marked(&dir.path().join("app.pkg"));
    let out = dir.path().join("out");

    let report = run(BatchConfig::new(&input, &out));

    assert_eq!(processed_paths(&report), ["app.pkg"]);
    assert_eq!(report.processed[0].output, out.join("app.pkg"));
}

#[cfg(unix)]
#[test]
fn test_failure_is_isolated_and_recorded() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    marked(&input.join("good.pkg"));
    let script = write_file(
        &dir.path().join("sign.sh"),
        b"case \"$1\" in *bad.pkg) exit 3;; esac\nexit 0\n",
    );
    marked(&input.join("bad.pkg"));

    let config = BatchConfig::new(&input, &out).sign_command(format!("sh {}", script.display()));
    let report = run(config);

    assert!(!report.is_success());
    assert_eq!(processed_paths(&report), ["good.pkg"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].relative_path, "bad.pkg");
    assert!(out.join("good.pkg").exists());
    assert!(!out.join("bad.pkg").exists());
    assert!(temp_leftovers(&out).is_empty());
}

// ============================================================================
// Signing
// ============================================================================

/// Writes a signing script that appends the signed file's name to `log`.
#[cfg(unix)]
fn logging_signer(dir: &Path, log: &Path) -> String {
    let script = write_file(
        &dir.join("sign.sh"),
        format!("basename \"$1\" >> '{}'\n", log.display()).as_bytes(),
    );
    format!("sh {}", script.display())
}

#[cfg(unix)]
fn signed_names(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(unix)]
#[test]
fn test_sign_exclusions_by_relative_path() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let log = dir.path().join("signed.log");
    marked(&input.join("app.pkg"));
    marked(&input.join("vendor/skip.pkg"));

    let config = BatchConfig::new(&input, dir.path().join("out"))
        .sign_command(logging_signer(dir.path(), &log))
        .exclude_from_signing("vendor/skip.pkg");
    let report = run(config);

    assert!(report.is_success());
    assert_eq!(signed_names(&log), ["app.pkg"]);
}

#[cfg(unix)]
#[test]
fn test_sign_exclusion_flags_in_metadata() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let log = dir.path().join("signed.log");
    write_archive(
        &input.join("outer.pkg"),
        &[
            (
                "lib/inner.pkg",
                &archive_bytes(&[("x.txt", b"x"), (METADATA_ENTRY, CONDITIONED)]),
            ),
            (
                METADATA_ENTRY,
                b"pipeline.conditioned=true\npipeline.exclude.children.sign=true\n",
            ),
        ],
    );
    write_archive(
        &input.join("self.pkg"),
        &[
            ("x.txt", b"x"),
            (METADATA_ENTRY, b"pipeline.conditioned=true\npipeline.exclude.sign=true\n"),
        ],
    );

    let config = BatchConfig::new(&input, dir.path().join("out"))
        .sign_command(logging_signer(dir.path(), &log));
    let report = run(config);

    assert!(report.is_success());
    let signed = signed_names(&log);
    assert_eq!(signed.len(), 1);
    assert!(signed[0].ends_with("outer.pkg"));
}

#[cfg(unix)]
#[test]
fn test_signed_output_replaces_nested_entries() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    let log = dir.path().join("signed.log");
    write_archive(
        &input.join("app.pkg"),
        &[
            (
                "lib/inner.pkg",
                &archive_bytes(&[("x.txt", b"x"), (METADATA_ENTRY, CONDITIONED)]),
            ),
            (METADATA_ENTRY, CONDITIONED),
        ],
    );

    let config = BatchConfig::new(&input, &out).sign_command(logging_signer(dir.path(), &log));
    let report = run(config);

    assert!(report.is_success());
    assert_eq!(report.processed[0].report.entries_replaced, 1);
    let signed = signed_names(&log);
    assert_eq!(signed.len(), 2);
    assert_eq!(signed[0], "inner.pkg");
    assert!(signed[1].ends_with("app.pkg"));
}

// ============================================================================
// Flat containers
// ============================================================================

#[test]
fn test_flat_container_processes_each_package() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let package = archive_bytes(&[("a.txt", b"alpha"), (METADATA_ENTRY, CONDITIONED)]);
    let container = write_archive(
        &dir.path().join("bundle.zip"),
        &[
            ("plugins/a.pkg", &package),
            ("plugins/b.pkg", &archive_bytes(&[("b.txt", b"unmarked")])),
            ("readme.txt", b"read me"),
        ],
    );

    let report = run(BatchConfig::new(&container, &out));

    assert!(report.is_success());
    assert_eq!(processed_paths(&report), ["plugins/a.pkg", "plugins/b.pkg"]);
    assert_eq!(report.changed_count(), 1);

    let result = out.join("bundle.zip");
    assert_eq!(entry_names(&result), entry_names(&container));
    assert_eq!(entry_bytes(&result, "readme.txt"), b"read me");
    assert_eq!(mtime_secs(&result), INPUT_MTIME);
    assert!(temp_leftovers(&out).is_empty());

    let rebuilt = write_file(
        &dir.path().join("check/a.pkg"),
        &entry_bytes(&result, "plugins/a.pkg"),
    );
    assert!(entry_dates(&rebuilt).iter().all(|d| *d == (1980, 1, 1)));
    assert_eq!(entry_bytes(&rebuilt, "a.txt"), b"alpha");
}

#[test]
fn test_flat_container_without_changes_is_copied() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let container = write_archive(
        &dir.path().join("bundle.zip"),
        &[("b.pkg", &archive_bytes(&[("b.txt", b"unmarked")]))],
    );

    let report = run(BatchConfig::new(&container, &out));

    assert_eq!(report.changed_count(), 0);
    assert_eq!(
        fs::read(out.join("bundle.zip")).unwrap(),
        fs::read(&container).unwrap()
    );
}

#[cfg(unix)]
#[test]
fn test_flat_container_entry_that_cannot_be_extracted_is_isolated() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let long_name = format!("plugins/{}.pkg", "n".repeat(300));
    let package = archive_bytes(&[("a.txt", b"alpha"), (METADATA_ENTRY, CONDITIONED)]);
    let container = write_archive(
        &dir.path().join("bundle.zip"),
        &[(long_name.as_str(), &package), ("plugins/ok.pkg", &package)],
    );

    let report = run(BatchConfig::new(&container, &out));

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].relative_path, long_name);
    assert_eq!(processed_paths(&report), ["plugins/ok.pkg"]);
    assert_eq!(report.changed_count(), 1);

    let result = out.join("bundle.zip");
    assert_eq!(entry_names(&result), entry_names(&container));
    assert_eq!(entry_bytes(&result, &long_name), package);
    assert_ne!(entry_bytes(&result, "plugins/ok.pkg"), package);
    assert!(temp_leftovers(&out).is_empty());
}

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn test_missing_input_is_an_error() {
    let dir = TempDir::new().unwrap();
    let executor =
        BatchExecutor::new(BatchConfig::new(dir.path().join("missing"), dir.path())).unwrap();
    assert!(matches!(executor.run(), Err(nestpack::Error::InputNotFound(_))));
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_run_matches_sequential_order() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    for name in ["a.pkg", "b.pkg", "sub/c.pkg", "sub/d.pkg"] {
        marked(&input.join(name));
    }

    let executor = BatchExecutor::new(BatchConfig::new(&input, dir.path().join("out"))).unwrap();
    let report = executor.run_parallel().unwrap();

    assert_eq!(
        processed_paths(&report),
        ["a.pkg", "b.pkg", "sub/c.pkg", "sub/d.pkg"]
    );
    assert_eq!(report.changed_count(), 4);
}
