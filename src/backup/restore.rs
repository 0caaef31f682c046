//! Extracting an archive over the live application data
//!
//! Entry names are checked up front: an archive with any entry that would
//! land outside the destination is rejected before a single file is written.
//! Entries are then extracted into a staging directory beside the
//! destination, which reads every entry to the end and so verifies its
//! checksum. Live files are only replaced once the whole archive has been
//! staged.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use super::metadata::map_zip_error;
use crate::error::{BackupError, BackupResult};

/// Extract every entry of `archive_path` into `dest`, overwriting files
///
/// Returns the number of file entries written. Files in `dest` that the
/// archive does not mention are left alone. A corrupt archive leaves `dest`
/// untouched.
pub(crate) fn extract_archive(archive_path: &Path, dest: &Path) -> BackupResult<usize> {
    let file = File::open(archive_path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => BackupError::backup_not_found(archive_path.display().to_string()),
        _ => BackupError::Io(format!(
            "Failed to open backup {}: {}",
            archive_path.display(),
            e
        )),
    })?;

    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| map_zip_error(archive_path, e))?;

    let targets = plan_entries(&mut archive, archive_path)?;

    let staging = staging_dir_for(dest)?;
    remove_staging(&staging)?;

    let result = stage_entries(&mut archive, archive_path, &targets, &staging)
        .and_then(|()| commit(&staging, dest, &targets));

    if let Err(e) = remove_staging(&staging) {
        tracing::warn!(dir = %staging.display(), error = %e, "failed to remove restore staging");
    }

    result
}

/// Sibling of `dest` that holds the archive while it is being verified
///
/// Living next to `dest` keeps it on the same filesystem, so moving files
/// into place is a rename.
fn staging_dir_for(dest: &Path) -> BackupResult<PathBuf> {
    let dest = std::path::absolute(dest)?;
    match (dest.parent(), dest.file_name()) {
        (Some(parent), Some(name)) => {
            let mut staging = std::ffi::OsString::from(".");
            staging.push(name);
            staging.push(".restore");
            Ok(parent.join(staging))
        }
        _ => Err(BackupError::InvalidArgument(format!(
            "Cannot restore into {}",
            dest.display()
        ))),
    }
}

fn remove_staging(staging: &Path) -> BackupResult<()> {
    match fs::remove_dir_all(staging) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::Io(format!(
            "Failed to clear {}: {}",
            staging.display(),
            e
        ))),
    }
}

/// Extract everything into `staging`, failing on the first unreadable entry
fn stage_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
    targets: &[(PathBuf, bool)],
    staging: &Path,
) -> BackupResult<()> {
    for (index, (relative, is_dir)) in targets.iter().enumerate() {
        let out_path = staging.join(relative);

        if *is_dir {
            create_dir(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| map_zip_error(archive_path, e))?;
        let mut out = File::create(&out_path).map_err(|e| {
            BackupError::Io(format!("Failed to create {}: {}", out_path.display(), e))
        })?;
        copy_entry(&mut entry, &mut out, archive_path, &out_path)?;
    }

    Ok(())
}

/// Move staged files over the live ones
fn commit(staging: &Path, dest: &Path, targets: &[(PathBuf, bool)]) -> BackupResult<usize> {
    create_dir(dest)?;

    let mut moved = HashSet::new();
    for (relative, is_dir) in targets {
        let out_path = dest.join(relative);

        if *is_dir {
            create_dir(&out_path)?;
            continue;
        }
        // A repeated entry name was staged once, by its last occurrence
        if !moved.insert(relative) {
            continue;
        }
        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }

        let staged = staging.join(relative);
        fs::rename(&staged, &out_path).map_err(|e| {
            BackupError::Io(format!(
                "Failed to move {} into place: {}",
                out_path.display(),
                e
            ))
        })?;
    }

    Ok(moved.len())
}

fn create_dir(path: &Path) -> BackupResult<()> {
    fs::create_dir_all(path)
        .map_err(|e| BackupError::Io(format!("Failed to create {}: {}", path.display(), e)))
}

/// Validate every entry name and compute its relative output path
fn plan_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
) -> BackupResult<Vec<(PathBuf, bool)>> {
    let mut targets = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| map_zip_error(archive_path, e))?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            BackupError::InvalidFormat(format!(
                "{} contains unsafe entry {}",
                archive_path.display(),
                entry.name()
            ))
        })?;
        targets.push((relative, entry.is_dir()));
    }

    Ok(targets)
}

/// Copy one entry, telling corrupt archive data apart from write failures
fn copy_entry<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    archive_path: &Path,
    out_path: &Path,
) -> BackupResult<()> {
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(BackupError::InvalidFormat(format!(
                    "{} is unreadable: {}",
                    archive_path.display(),
                    e
                )))
            }
        };
        writer.write_all(&buf[..n]).map_err(|e| {
            BackupError::Io(format!("Failed to write {}: {}", out_path.display(), e))
        })?;
    }
    writer
        .flush()
        .map_err(|e| BackupError::Io(format!("Failed to write {}: {}", out_path.display(), e)))
}
