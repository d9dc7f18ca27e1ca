//! Flat multi-archive containers.
//!
//! A flat container is a plain ZIP file whose entries are package archives,
//! as produced by release bundling. The container itself carries no metadata
//! record and is never processed as a package; instead each matching entry is
//! run through the pipeline on its own and the container is rebuilt with the
//! results.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use filetime::FileTime;

use crate::archive::{self, Replacement};
use crate::batch::{BatchExecutor, BatchReport, ProcessedFile};
use crate::processor::{base_name, move_file};
use crate::temp::ScopedTempDir;
use crate::{Error, Result};

/// Processes every package inside `container` and writes the rebuilt
/// container to the configured output directory under the same name.
///
/// Entry failures are isolated like files in a directory walk: the failing
/// entry keeps its original bytes and is listed in the report.
pub(crate) fn process_container(executor: &BatchExecutor, container: &Path) -> Result<BatchReport> {
    let output_dir = &executor.config().output_dir;
    let file_name = container.file_name().ok_or_else(|| Error::InvalidArchive {
        path: container.to_path_buf(),
        reason: "path has no file name".into(),
    })?;
    let dest = output_dir.join(file_name);
    let original_mtime = FileTime::from_last_modification_time(&fs::metadata(container)?);

    let mut archive = archive::open(container)?;
    let mut temp = ScopedTempDir::new(output_dir, 0);
    let mut replacements = BTreeMap::new();
    let mut report = BatchReport::default();

    for index in 0..archive.len() {
        let name = match archive::entry_name(&mut archive, index) {
            Ok(name) => name,
            Err(e) => {
                executor.record(&mut report, format!("#{}", index), Err(e));
                continue;
            }
        };
        if name.ends_with('/') || !executor.matches_name(base_name(&name)) {
            continue;
        }

        let data = match archive::read_entry(&mut archive, index) {
            Ok(data) => data,
            Err(e) => {
                executor.record(&mut report, name, Err(e));
                continue;
            }
        };
        let slot = temp.path()?.join(index.to_string());
        let extracted = slot.join("in").join(base_name(&name));
        if let Err(e) = archive::write_entry(&data, &extracted) {
            executor.record(&mut report, name, Err(e));
            continue;
        }

        let result = executor
            .process_file(&extracted, &name, &slot)
            .map(|processed| {
                if processed.changed {
                    replacements.insert(
                        name.clone(),
                        Replacement {
                            name: name.clone(),
                            source: processed.output.clone(),
                        },
                    );
                }
                ProcessedFile {
                    output: dest.clone(),
                    ..processed
                }
            });
        executor.record(&mut report, name, result);
    }
    drop(archive);

    fs::create_dir_all(output_dir)?;
    if replacements.is_empty() {
        if !is_same_file(container, &dest) {
            fs::copy(container, &dest)?;
        }
    } else {
        let rebuilt = temp.path()?.join("container.zip");
        archive::rebuild(container, &rebuilt, &replacements, None)?;
        move_file(&rebuilt, &dest)?;
    }
    filetime::set_file_mtime(&dest, original_mtime)?;

    Ok(report)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
