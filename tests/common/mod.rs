//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use filetime::FileTime;
use nestpack::steps::nested_package_effect;
use nestpack::{Ancestors, METADATA_ENTRY, Metadata, ProcessingStep, TEMP_PREFIX};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Modification time given to every input archive written by the helpers.
pub const INPUT_MTIME: i64 = 1_500_000_000;

/// Metadata record marking an archive as conditioned.
pub const CONDITIONED: &[u8] = b"pipeline.conditioned=true\n";

/// Entry timestamp used for input archives.
pub fn entry_stamp() -> DateTime {
    DateTime::from_date_and_time(2020, 5, 17, 10, 20, 30).unwrap()
}

/// Builds a ZIP archive in memory. Entries are deflated and stamped with
/// [`entry_stamp`].
pub fn archive_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(entry_stamp());
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Writes an archive to `path` and sets its modification time to
/// [`INPUT_MTIME`].
pub fn write_archive(path: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
    write_file(path, &archive_bytes(entries))
}

/// Writes arbitrary bytes to `path` with the fixed input modification time.
pub fn write_file(path: &Path, bytes: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(INPUT_MTIME, 0)).unwrap();
    path.to_path_buf()
}

/// Reads every entry of an archive as `(name, bytes)`, in archive order.
pub fn read_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

/// Entry names of an archive, in archive order.
pub fn entry_names(path: &Path) -> Vec<String> {
    read_entries(path).into_iter().map(|(name, _)| name).collect()
}

/// Bytes of a single entry.
pub fn entry_bytes(path: &Path, name: &str) -> Vec<u8> {
    read_entries(path)
        .into_iter()
        .find(|(n, _)| n == name)
        .unwrap_or_else(|| panic!("entry '{}' not found in {}", name, path.display()))
        .1
}

/// Compressed bytes of a single entry, read without decoding.
pub fn raw_entry_bytes(path: &Path, name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    for i in 0..archive.len() {
        let mut file = archive.by_index_raw(i).unwrap();
        if file.name() == name {
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            return data;
        }
    }
    panic!("entry '{}' not found in {}", name, path.display());
}

/// Decoded bytes of a single entry, leaving every other entry alone.
pub fn decoded_entry_bytes(path: &Path, name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    data
}

/// Rewrites the compression method recorded for `name` in both its local and
/// central header, e.g. to one this build cannot decode.
pub fn patch_method(path: &Path, name: &str, method: u16) {
    let mut bytes = fs::read(path).unwrap();
    let name = name.as_bytes();
    let mut patched = 0;
    for pos in 0..bytes.len().saturating_sub(46) {
        let (method_at, len_at, name_at) = match &bytes[pos..pos + 4] {
            b"PK\x03\x04" => (8, 26, 30),
            b"PK\x01\x02" => (10, 28, 46),
            _ => continue,
        };
        let len = u16::from_le_bytes([bytes[pos + len_at], bytes[pos + len_at + 1]]) as usize;
        if bytes.get(pos + name_at..pos + name_at + len) == Some(name) {
            bytes[pos + method_at..pos + method_at + 2].copy_from_slice(&method.to_le_bytes());
            patched += 1;
        }
    }
    assert_eq!(patched, 2, "expected a local and a central header for the entry");
    fs::write(path, bytes).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(INPUT_MTIME, 0)).unwrap();
}

/// Parsed metadata record of an archive.
pub fn metadata_of(path: &Path) -> Metadata {
    Metadata::parse(&entry_bytes(path, METADATA_ENTRY))
}

/// Timestamps of every entry, as `(year, month, day)`.
pub fn entry_dates(path: &Path) -> Vec<(u16, u8, u8)> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| {
            let file = archive.by_index_raw(i).unwrap();
            let dt = file.last_modified().unwrap_or_default();
            (dt.year(), dt.month(), dt.day())
        })
        .collect()
}

/// Modification time of a file in whole seconds.
pub fn mtime_secs(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

/// Returns every path below `dir` whose name starts with the temp prefix.
pub fn temp_leftovers(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
        .map(|e| e.into_path())
        .collect()
}

/// A step that changes nothing and recurses into nested packages.
#[derive(Debug, Clone)]
pub struct IdentityStep;

impl ProcessingStep for IdentityStep {
    fn name(&self) -> &str {
        "identity"
    }

    fn recursion_effect(&self, entry_name: &str) -> Option<String> {
        nested_package_effect(entry_name, "pkg")
    }
}

/// A hook invocation seen by [`RecordingStep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub hook: &'static str,
    pub file: String,
    pub depth: usize,
    pub parent_name: Option<String>,
}

/// Records every hook invocation. Recurses into nested packages.
#[derive(Debug, Clone, Default)]
pub struct RecordingStep {
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingStep {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, hook: &str) -> usize {
        self.calls().iter().filter(|c| c.hook == hook).count()
    }

    fn record(&self, hook: &'static str, input: &Path, ancestors: &Ancestors<'_>) {
        self.calls.lock().unwrap().push(Call {
            hook,
            file: input.file_name().unwrap().to_string_lossy().into_owned(),
            depth: ancestors.len() + 1,
            parent_name: ancestors
                .parent()
                .and_then(|m| m.get("name"))
                .map(str::to_string),
        });
    }
}

impl ProcessingStep for RecordingStep {
    fn name(&self) -> &str {
        "recording"
    }

    fn recursion_effect(&self, entry_name: &str) -> Option<String> {
        nested_package_effect(entry_name, "pkg")
    }

    fn pre_process(
        &self,
        input: &Path,
        _work_dir: &Path,
        ancestors: &Ancestors<'_>,
    ) -> nestpack::Result<PathBuf> {
        self.record("pre", input, ancestors);
        Ok(input.to_path_buf())
    }

    fn post_process(
        &self,
        input: &Path,
        _work_dir: &Path,
        ancestors: &Ancestors<'_>,
    ) -> nestpack::Result<PathBuf> {
        self.record("post", input, ancestors);
        Ok(input.to_path_buf())
    }

    fn adjust_metadata(
        &self,
        input: &Path,
        _metadata: &mut Metadata,
        ancestors: &Ancestors<'_>,
    ) -> nestpack::Result<bool> {
        self.record("metadata", input, ancestors);
        Ok(false)
    }
}
