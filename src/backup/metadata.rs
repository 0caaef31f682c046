//! Metadata record embedded in every backup archive
//!
//! Each archive carries a small key/value text entry at a fixed path listing
//! the installed components and their versions at backup time. An archive
//! without a readable record is not a usable backup.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{BackupError, BackupResult};

/// Fixed path of the metadata entry inside an archive
pub const METADATA_ENTRY: &str = "cfg/plugin-versions.properties";

/// Ordered key/value record read from (or written to) an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveMetadata {
    entries: Vec<(String, String)>,
}

impl ArchiveMetadata {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing an existing key in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over entries in record order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse properties-style text
    ///
    /// Follows the usual `.properties` grammar. Blank lines and lines whose
    /// first non-blank character is `#` or `!` are skipped. The key ends at
    /// the first unescaped `=`, `:` or whitespace; blanks and one `=` or `:`
    /// after it are skipped and the rest of the line is the value. A line
    /// ending in an odd number of backslashes continues on the next line.
    /// Backslash escapes (`\t`, `\n`, `\r`, `\f`, `\uXXXX`, and `\` before
    /// any other character) are decoded. A repeated key keeps the last value.
    ///
    /// Fails with `InvalidFormat` on a malformed `\u` escape.
    pub fn parse(text: &str) -> BackupResult<Self> {
        let mut metadata = Self::new();
        let mut lines = text.lines();

        while let Some(first) = lines.next() {
            let mut line = first.trim_start().to_string();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            while ends_with_continuation(&line) {
                line.pop();
                match lines.next() {
                    Some(next) => line.push_str(next.trim_start()),
                    None => break,
                }
            }

            let (key, value) = split_entry(&line);
            metadata.insert(unescape(key)?, unescape(value)?);
        }

        Ok(metadata)
    }

    /// Render the record as properties text
    ///
    /// Characters that would change the meaning of a line are escaped, so
    /// the text parses back to the same record.
    pub fn to_properties(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            out.push_str(&escape(key, true));
            out.push('=');
            out.push_str(&escape(value, false));
            out.push('\n');
        }
        out
    }

    /// Read the metadata record from the archive at `path`
    ///
    /// Fails with `Io` if the file cannot be opened, and with
    /// `InvalidFormat` if it is not a readable archive, the entry is
    /// missing, or the entry does not decode as a text record.
    pub fn load(path: &Path) -> BackupResult<Self> {
        let file = File::open(path).map_err(|e| {
            BackupError::Io(format!("Failed to open backup {}: {}", path.display(), e))
        })?;

        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| map_zip_error(path, e))?;

        let mut entry = match archive.by_name(METADATA_ENTRY) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(BackupError::InvalidFormat(format!(
                    "{} has no {} entry",
                    path.display(),
                    METADATA_ENTRY
                )))
            }
            Err(e) => return Err(map_zip_error(path, e)),
        };

        // Reading to the end also verifies the entry checksum
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "metadata entry unreadable");
            BackupError::InvalidFormat(format!(
                "Metadata in {} is unreadable: {}",
                path.display(),
                e
            ))
        })?;

        let text = String::from_utf8(bytes).map_err(|_| {
            BackupError::InvalidFormat(format!(
                "Metadata in {} is not valid UTF-8 text",
                path.display()
            ))
        })?;

        Self::parse(&text).inspect_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "metadata record malformed");
        })
    }
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Split a logical line into raw key and raw value
fn split_entry(line: &str) -> (&str, &str) {
    let mut key_end = line.len();
    let mut escaped = false;

    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = idx;
                break;
            }
            c if c.is_whitespace() => {
                key_end = idx;
                break;
            }
            _ => {}
        }
    }

    let rest = line[key_end..].trim_start();
    let value = match rest.strip_prefix(['=', ':']) {
        Some(after) => after.trim_start(),
        None => rest,
    };
    (&line[..key_end], value)
}

fn unescape(raw: &str) -> BackupResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = Some(&hex)
                    .filter(|h| h.len() == 4 && h.chars().all(|c| c.is_ascii_hexdigit()))
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        BackupError::InvalidFormat(format!("malformed escape \\u{}", hex))
                    })?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());

    for (idx, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            ' ' if is_key || idx == 0 => out.push_str("\\ "),
            '=' | ':' | '#' | '!' if is_key => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

/// Map a zip error to the engine's error kinds
///
/// Truncated or garbled containers surface as `InvalidFormat`; genuine I/O
/// failures stay `Io`.
pub(crate) fn map_zip_error(path: &Path, err: ZipError) -> BackupError {
    match err {
        ZipError::Io(e)
            if !matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::InvalidData) =>
        {
            BackupError::Io(format!("Failed to read backup {}: {}", path.display(), e))
        }
        other => BackupError::InvalidFormat(format!(
            "{} is not a readable backup archive: {}",
            path.display(),
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_parse_properties() {
        let text = "# versions\n\nbackup-engine=0.1.0\nmail.plugin : 2.3\n! legacy\nflag\n";
        let metadata = ArchiveMetadata::parse(text).unwrap();

        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata.get("backup-engine"), Some("0.1.0"));
        assert_eq!(metadata.get("mail.plugin"), Some("2.3"));
        assert_eq!(metadata.get("flag"), Some(""));
        assert_eq!(metadata.get("legacy"), None);
    }

    #[test]
    fn test_repeated_key_keeps_last_value_and_position() {
        let metadata = ArchiveMetadata::parse("a=1\nb=2\na=3\n").unwrap();
        let keys: Vec<_> = metadata.iter().map(|(k, _)| k).collect();

        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(metadata.get("a"), Some("3"));
    }

    #[test]
    fn test_whitespace_separator() {
        let metadata = ArchiveMetadata::parse("calendar 1.4.2\nmail\t  = 2.0\n").unwrap();

        assert_eq!(metadata.get("calendar"), Some("1.4.2"));
        assert_eq!(metadata.get("mail"), Some("2.0"));
    }

    #[test]
    fn test_escapes_and_continuation() {
        let text = "my\\ key=a\\=b\\tc\nlist=one, \\\n    two\nsnow=\\u2603\nslash=c:\\\\\n";
        let metadata = ArchiveMetadata::parse(text).unwrap();

        assert_eq!(metadata.get("my key"), Some("a=b\tc"));
        assert_eq!(metadata.get("list"), Some("one, two"));
        assert_eq!(metadata.get("snow"), Some("\u{2603}"));
        assert_eq!(metadata.get("slash"), Some("c:\\"));
    }

    #[test]
    fn test_malformed_unicode_escape_is_invalid_format() {
        let err = ArchiveMetadata::parse("bad=\\u12G4\n").unwrap_err();
        assert!(err.is_invalid_format());
    }

    #[test]
    fn test_properties_text_reparses() {
        let mut metadata = ArchiveMetadata::new();
        metadata.insert("backup-engine", "0.1.0");
        metadata.insert("calendar", "1.4.2");
        metadata.insert("odd key=:#", " leading\\path\nnext");

        assert_eq!(
            ArchiveMetadata::parse(&metadata.to_properties()).unwrap(),
            metadata
        );
    }

    #[test]
    fn test_load_valid_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("backup.zip");
        write_zip(
            &path,
            &[
                (METADATA_ENTRY, b"calendar=1.4.2\n"),
                ("cfg/app.conf", b"x"),
            ],
        );

        let metadata = ArchiveMetadata::load(&path).unwrap();
        assert_eq!(metadata.get("calendar"), Some("1.4.2"));
    }

    #[test]
    fn test_load_missing_entry_is_invalid_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("backup.zip");
        write_zip(&path, &[("cfg/app.conf", b"x")]);

        let err = ArchiveMetadata::load(&path).unwrap_err();
        assert!(err.is_invalid_format());
    }

    #[test]
    fn test_load_non_zip_is_invalid_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("backup.zip");
        std::fs::write(&path, b"this is not an archive").unwrap();

        let err = ArchiveMetadata::load(&path).unwrap_err();
        assert!(err.is_invalid_format());
    }

    #[test]
    fn test_load_non_utf8_entry_is_invalid_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("backup.zip");
        write_zip(&path, &[(METADATA_ENTRY, &[0xff, 0xfe, 0x00])]);

        let err = ArchiveMetadata::load(&path).unwrap_err();
        assert!(err.is_invalid_format());
    }

    #[test]
    fn test_load_missing_file_is_io() {
        let temp = TempDir::new().unwrap();
        let err = ArchiveMetadata::load(&temp.path().join("gone.zip")).unwrap_err();
        assert!(matches!(err, BackupError::Io(_)));
    }
}
