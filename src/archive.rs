//! ZIP plumbing used by the pipeline: opening, extraction, rebuild and
//! normalization.
//!
//! Rebuild copies untouched entries raw (no recompression), so their bytes are
//! identical to the input. Normalization is the only pass that recompresses.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::metadata::{METADATA_ENTRY, Metadata, keys};
use crate::{Error, Result, timestamp};

/// Entries at or above this size are written with ZIP64 extensions.
const LARGE_FILE_THRESHOLD: u64 = 0xFFFF_FFFF;

pub(crate) type FileArchive = ZipArchive<BufReader<File>>;

/// Recursion-result bytes that should replace an entry during rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Entry name in the rebuilt archive.
    pub name: String,
    /// File holding the new entry content.
    pub source: PathBuf,
}

/// Where the bytes of a rebuilt entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// Copied verbatim from the input archive.
    Original,
    /// Taken from the recursion result.
    Replaced,
    /// The recursion result was missing; the original bytes were kept.
    FellBack,
    /// The metadata record, rewritten from its current contents.
    Metadata,
}

/// Per-entry outcome of a rebuild, in output order.
#[derive(Debug, Clone, Default)]
pub struct RebuildOutcome {
    /// `(entry name, source)` for every written entry.
    pub entries: Vec<(String, EntrySource)>,
}

impl RebuildOutcome {
    /// Number of entries with the given source.
    pub fn count(&self, source: EntrySource) -> usize {
        self.entries.iter().filter(|(_, s)| *s == source).count()
    }
}

/// Content and timestamp of one entry read into memory.
pub(crate) struct EntryData {
    pub(crate) bytes: Vec<u8>,
    pub(crate) modified: Option<DateTime>,
}

/// Summary of an archive, as reported by [`inspect`].
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// The inspected file.
    pub path: PathBuf,
    /// Entry names in archive order.
    pub entries: Vec<String>,
    /// The embedded metadata record, if any.
    pub metadata: Option<Metadata>,
}

impl ArchiveSummary {
    /// Returns true if the archive carries the conditioning marker.
    pub fn is_conditioned(&self) -> bool {
        self.metadata
            .as_ref()
            .is_some_and(|m| m.is_flag_set(keys::CONDITIONED))
    }

    /// Returns true if the archive excludes its children from recursion.
    pub fn excludes_children(&self) -> bool {
        self.metadata
            .as_ref()
            .is_some_and(|m| m.is_flag_set(keys::EXCLUDE_CHILDREN))
    }
}

/// Lists the entries and metadata record of an archive.
pub fn inspect(path: impl AsRef<Path>) -> Result<ArchiveSummary> {
    let path = path.as_ref();
    let mut archive = open(path)?;
    let entries = (0..archive.len())
        .map(|i| archive.by_index_raw(i).map(|f| f.name().to_string()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let metadata = read_metadata(&mut archive)?;
    Ok(ArchiveSummary {
        path: path.to_path_buf(),
        entries,
        metadata,
    })
}

/// Opens a file that must be a ZIP archive.
pub(crate) fn open(path: &Path) -> Result<FileArchive> {
    match try_open(path)? {
        Some(archive) => Ok(archive),
        None => Err(Error::InvalidArchive {
            path: path.to_path_buf(),
            reason: "no ZIP central directory found".into(),
        }),
    }
}

/// Opens a file as a ZIP archive, returning `None` if it is not one.
///
/// Failing to open the file itself still propagates; anything that goes wrong
/// while looking for the central directory means "not an archive".
pub(crate) fn try_open(path: &Path) -> Result<Option<FileArchive>> {
    let file = File::open(path)?;
    match ZipArchive::new(BufReader::new(file)) {
        Ok(archive) => Ok(Some(archive)),
        Err(e) => {
            log::debug!("'{}' is not a ZIP archive: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Reads the metadata record, if the archive has one.
pub(crate) fn read_metadata<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Option<Metadata>> {
    let mut file = match archive.by_name(METADATA_ENTRY) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(Metadata::parse(&bytes)))
}

/// Returns the name of the entry at `index`.
pub(crate) fn entry_name<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<String> {
    Ok(archive.by_index_raw(index)?.name().to_string())
}

/// Reads and decompresses the entry at `index`.
pub(crate) fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<EntryData> {
    let mut file = archive.by_index(index)?;
    let mut bytes = Vec::with_capacity(file.size().min(64 * 1024 * 1024) as usize);
    file.read_to_end(&mut bytes)?;
    Ok(EntryData {
        bytes,
        modified: file.last_modified(),
    })
}

/// Writes extracted entry content to `dest`, preserving the entry timestamp.
pub(crate) fn write_entry(data: &EntryData, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, &data.bytes)?;
    if let Some(modified) = &data.modified {
        filetime::set_file_mtime(dest, timestamp::to_file_time(modified))?;
    }
    Ok(())
}

/// Rebuilds `input` into `output`.
///
/// Every entry is copied raw except:
/// - names in `replacements`, written under the replacement name with the
///   content of the replacement file. A replacement file that no longer exists
///   falls back to the original entry and logs a warning;
/// - the metadata entry, rewritten from `metadata` when one is given. A record
///   that the input lacks is appended as the last entry.
///
/// Rewritten entries keep a stored original stored and are deflated otherwise.
pub(crate) fn rebuild(
    input: &Path,
    output: &Path,
    replacements: &BTreeMap<String, Replacement>,
    metadata: Option<&Metadata>,
) -> Result<RebuildOutcome> {
    let mut archive = open(input)?;
    let mut writer = ZipWriter::new(BufWriter::new(File::create(output)?));
    let mut outcome = RebuildOutcome::default();
    let mut metadata_written = false;

    for index in 0..archive.len() {
        let file = archive.by_index_raw(index)?;
        let name = file.name().to_string();
        let options = entry_options(
            writable_method(file.compression()),
            file.last_modified().unwrap_or_default(),
            file.unix_mode(),
            file.size(),
        );

        if name == METADATA_ENTRY {
            if let Some(metadata) = metadata {
                drop(file);
                writer.start_file(name.as_str(), options)?;
                writer.write_all(&metadata.to_bytes())?;
                outcome.entries.push((name, EntrySource::Metadata));
                metadata_written = true;
                continue;
            }
        }

        let Some(replacement) = replacements.get(&name) else {
            writer.raw_copy_file(file)?;
            outcome.entries.push((name, EntrySource::Original));
            continue;
        };

        match fs::read(&replacement.source) {
            Ok(bytes) => {
                drop(file);
                let options = options.large_file(bytes.len() as u64 >= LARGE_FILE_THRESHOLD);
                writer.start_file(replacement.name.as_str(), options)?;
                writer.write_all(&bytes)?;
                outcome
                    .entries
                    .push((replacement.name.clone(), EntrySource::Replaced));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!(
                    "Replacement for '{}' is missing ({}); keeping original bytes",
                    name,
                    replacement.source.display()
                );
                writer.raw_copy_file(file)?;
                outcome.entries.push((name, EntrySource::FellBack));
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(metadata) = metadata {
        if !metadata_written && !metadata.is_empty() {
            let options = entry_options(CompressionMethod::Deflated, DateTime::default(), None, 0);
            writer.start_file(METADATA_ENTRY, options)?;
            writer.write_all(&metadata.to_bytes())?;
            outcome
                .entries
                .push((METADATA_ENTRY.to_string(), EntrySource::Metadata));
        }
    }

    writer.finish()?.flush()?;
    Ok(outcome)
}

/// Rewrites every entry of `input` into `output` with the normalized
/// timestamp, keeping entry order, stored/deflated choice and permissions.
///
/// An entry this build cannot decode (unsupported method, encryption) is
/// copied raw with its original bytes and timestamp and logged as a warning.
/// Returns the number of such entries, or `None`, writing nothing, if `input`
/// is not a ZIP archive.
pub(crate) fn normalize(input: &Path, output: &Path) -> Result<Option<usize>> {
    let Some(mut archive) = try_open(input)? else {
        log::debug!("Skipping normalization of non-archive '{}'", input.display());
        return Ok(None);
    };

    let mut writer = ZipWriter::new(BufWriter::new(File::create(output)?));
    let mut buffer = Vec::new();
    let mut copied_raw = 0;

    for index in 0..archive.len() {
        match read_normalized(&mut archive, index, &mut buffer) {
            Ok((name, options, true)) => writer.add_directory(name.as_str(), options)?,
            Ok((name, options, false)) => {
                writer.start_file(name.as_str(), options)?;
                writer.write_all(&buffer)?;
            }
            Err(e) => {
                let file = archive.by_index_raw(index)?;
                log::warn!(
                    "Cannot decode '{}' in '{}' ({}); keeping original bytes",
                    file.name(),
                    input.display(),
                    e
                );
                writer.raw_copy_file(file)?;
                copied_raw += 1;
            }
        }
    }

    writer.finish()?.flush()?;
    Ok(Some(copied_raw))
}

/// Decompresses the entry at `index` into `buffer`, returning its name, the
/// options to write it with and whether it is a directory.
fn read_normalized<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    buffer: &mut Vec<u8>,
) -> Result<(String, SimpleFileOptions, bool)> {
    let mut file = archive.by_index(index)?;
    let options = entry_options(
        writable_method(file.compression()),
        timestamp::normalized(),
        file.unix_mode(),
        file.size(),
    );
    let name = file.name().to_string();
    let is_dir = file.is_dir();

    buffer.clear();
    if !is_dir {
        file.read_to_end(buffer)?;
    }
    Ok((name, options, is_dir))
}

/// Method used when writing fresh content for an entry: stored stays stored,
/// everything else is deflated.
fn writable_method(original: CompressionMethod) -> CompressionMethod {
    match original {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

fn entry_options(
    method: CompressionMethod,
    modified: DateTime,
    unix_mode: Option<u32>,
    size: u64,
) -> SimpleFileOptions {
    let options = SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(modified)
        .large_file(size >= LARGE_FILE_THRESHOLD);
    match unix_mode {
        Some(mode) => options.unix_permissions(mode),
        None => options,
    }
}
