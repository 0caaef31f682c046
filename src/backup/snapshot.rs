//! Writing snapshot archives
//!
//! The metadata record goes in first, then every source root under its path
//! relative to the data root, so extracting into the data root puts each
//! file back where it came from. The archive is written through a temporary
//! file and only renamed into place once it is complete and synced.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::metadata::{ArchiveMetadata, METADATA_ENTRY};
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::write_atomic_with;

/// Write a snapshot of `sources` plus `metadata` to `target`
///
/// Every source must lie inside `root`; entries are named by their path
/// relative to it. Anything located below `exclude` (normally the backup
/// directory itself) is left out. Returns the number of file entries
/// written, not counting the metadata entry.
pub(crate) fn write_snapshot(
    target: &Path,
    metadata: &ArchiveMetadata,
    root: &Path,
    sources: &[PathBuf],
    exclude: &Path,
) -> BackupResult<usize> {
    let mut files = 0;

    write_atomic_with(target, |file| {
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut written = HashSet::new();

        zip.start_file(METADATA_ENTRY, options)
            .map_err(|e| zip_write_error(target, e))?;
        zip.write_all(metadata.to_properties().as_bytes())
            .map_err(|e| BackupError::Io(format!("Failed to write metadata: {}", e)))?;
        written.insert(METADATA_ENTRY.to_string());

        for source in sources {
            files += add_source(&mut zip, options, root, source, exclude, &mut written)?;
        }

        zip.finish().map_err(|e| zip_write_error(target, e))
    })?;

    Ok(files)
}

fn add_source(
    zip: &mut ZipWriter<File>,
    options: SimpleFileOptions,
    root: &Path,
    source: &Path,
    exclude: &Path,
    written: &mut HashSet<String>,
) -> BackupResult<usize> {
    if !source.starts_with(root) {
        return Err(BackupError::InvalidArgument(format!(
            "Backup source {} is outside {}",
            source.display(),
            root.display()
        )));
    }
    let mut files = 0;

    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !entry.path().starts_with(exclude));

    for entry in walker {
        let entry = entry.map_err(|e| {
            BackupError::Io(format!("Failed to walk {}: {}", source.display(), e))
        })?;

        let relative = entry.path().strip_prefix(root).unwrap_or(Path::new(""));
        let name = entry_name(relative)?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            // The data root itself has no entry of its own
            if name.is_empty() {
                continue;
            }
            let dir_name = format!("{}/", name);
            if written.insert(dir_name.clone()) {
                zip.add_directory(dir_name, options)
                    .map_err(|e| zip_write_error(entry.path(), e))?;
            }
        } else if file_type.is_file() {
            if !written.insert(name.clone()) {
                tracing::debug!(entry = %name, "skipping duplicate archive entry");
                continue;
            }
            let mut input = File::open(entry.path()).map_err(|e| {
                BackupError::Io(format!("Failed to open {}: {}", entry.path().display(), e))
            })?;
            zip.start_file(name, options)
                .map_err(|e| zip_write_error(entry.path(), e))?;
            io::copy(&mut input, zip).map_err(|e| {
                BackupError::Io(format!("Failed to archive {}: {}", entry.path().display(), e))
            })?;
            files += 1;
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-regular file");
        }
    }

    Ok(files)
}

/// Archive entry name for a relative path, always `/`-separated
fn entry_name(relative: &Path) -> BackupResult<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                BackupError::InvalidArgument(format!(
                    "Path {} is not valid UTF-8",
                    relative.display()
                ))
            })?),
            Component::CurDir => {}
            _ => {
                return Err(BackupError::InvalidArgument(format!(
                    "Unsupported path {}",
                    relative.display()
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

fn zip_write_error(path: &Path, err: zip::result::ZipError) -> BackupError {
    BackupError::Io(format!("Failed to write archive entry for {}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn test_entry_name_uses_forward_slashes() {
        let path = Path::new("cfg").join("sub").join("app.conf");
        assert_eq!(entry_name(&path).unwrap(), "cfg/sub/app.conf");
    }

    #[test]
    fn test_snapshot_layout() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        fs::create_dir_all(data.join("cfg").join("sub")).unwrap();
        fs::write(data.join("cfg").join("app.conf"), "a=1").unwrap();
        fs::write(data.join("cfg").join("sub").join("deep.conf"), "b=2").unwrap();
        fs::write(data.join("notes.txt"), "hello").unwrap();

        let mut metadata = ArchiveMetadata::new();
        metadata.insert("calendar", "1.0");

        let target = temp.path().join("out").join("backup-test.zip");
        let files = write_snapshot(
            &target,
            &metadata,
            &data,
            &[data.join("cfg"), data.join("notes.txt")],
            &temp.path().join("out"),
        )
        .unwrap();

        assert_eq!(files, 3);
        let names = entry_names(&target);
        assert_eq!(names[0], METADATA_ENTRY);
        assert!(names.contains(&"cfg/app.conf".to_string()));
        assert!(names.contains(&"cfg/sub/deep.conf".to_string()));
        assert!(names.contains(&"notes.txt".to_string()));
        assert!(!target.with_extension("zip.tmp").exists());
    }

    #[test]
    fn test_metadata_entry_wins_over_source_file() {
        let temp = TempDir::new().unwrap();
        let cfg = temp.path().join("cfg");
        fs::create_dir_all(&cfg).unwrap();
        fs::write(cfg.join("plugin-versions.properties"), "stale=1\n").unwrap();

        let mut metadata = ArchiveMetadata::new();
        metadata.insert("fresh", "2");

        let target = temp.path().join("backup-test.zip");
        let files = write_snapshot(
            &target,
            &metadata,
            temp.path(),
            &[cfg],
            &temp.path().join("out"),
        )
        .unwrap();
        assert_eq!(files, 0);

        let mut archive = ZipArchive::new(File::open(&target).unwrap()).unwrap();
        let mut text = String::new();
        archive
            .by_name(METADATA_ENTRY)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "fresh=2\n");
    }

    #[test]
    fn test_excluded_directory_is_skipped() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        let backups = data.join("backups");
        fs::create_dir_all(&backups).unwrap();
        fs::write(backups.join("backup-old.zip"), "x").unwrap();
        fs::write(data.join("keep.txt"), "y").unwrap();

        let target = backups.join("backup-new.zip");
        write_snapshot(&target, &ArchiveMetadata::new(), &data, &[data.clone()], &backups)
            .unwrap();

        let names = entry_names(&target);
        assert!(names.contains(&"keep.txt".to_string()));
        assert!(!names.iter().any(|n| n.contains("backups")));
    }

    #[test]
    fn test_nested_source_keeps_path_below_root() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        let calendar = data.join("plugins").join("calendar");
        fs::create_dir_all(&calendar).unwrap();
        fs::write(calendar.join("events.db"), "e1").unwrap();

        let target = temp.path().join("backup-test.zip");
        write_snapshot(
            &target,
            &ArchiveMetadata::new(),
            &data,
            &[calendar],
            &temp.path().join("out"),
        )
        .unwrap();

        let names = entry_names(&target);
        assert!(names.contains(&"plugins/calendar/events.db".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("calendar/")));
    }

    #[test]
    fn test_source_outside_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        let elsewhere = temp.path().join("elsewhere");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&elsewhere).unwrap();

        let target = temp.path().join("backup-test.zip");
        let err = write_snapshot(
            &target,
            &ArchiveMetadata::new(),
            &data,
            &[elsewhere],
            &temp.path().join("out"),
        )
        .unwrap_err();

        assert!(err.is_invalid_argument());
        assert!(!target.exists());
    }
}
