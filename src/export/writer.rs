//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Record Export Writer
//!
//! Writes each surviving record's payload into the export directory as one
//! file, then points the record's file fields at what was written.
//!
//! ## Naming
//!
//! - text-bearing records become `<stem>.txt`, or `<stem>.<target_type>` when
//!   the record carries a `target_type` field
//! - image records keep their original extension
//! - names are claimed with `create_new`; a taken name gets a `_<n>` suffix,
//!   so concurrent workers never overwrite each other
//!
//! A write that fails part way removes its file again. With checksums on,
//! the blake3 hex digest of the written bytes lands in `checkSum`.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, ZiError};
use crate::operator::{ZiContentKind, ZiRecordContext};
use crate::record::{keys, ZiRecord};

const MAX_NAME_ATTEMPTS: usize = 10_000;

/// Result of exporting one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZiExportStatus {
    /// Payload written to this path.
    Written(PathBuf),
    /// File type has no export form; the record is kept as metadata only.
    Unsupported,
    /// Nothing left to write.
    Empty,
}

/// Per-record output writer bound to one export directory.
#[derive(Debug, Clone)]
pub struct ZiFileExporter {
    export_path: PathBuf,
    checksum: bool,
}

impl ZiFileExporter {
    #[allow(non_snake_case)]
    pub fn new(export_path: impl Into<PathBuf>) -> Self {
        ZiFileExporter {
            export_path: export_path.into(),
            checksum: true,
        }
    }

    /// Turns checksumming of written files on or off.
    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    /// Writes the record and rewrites `fileId`, `fileName`, `fileType`,
    /// `filePath`, `fileSize` and `checkSum` to describe the produced file.
    pub fn export(&self, record: &mut ZiRecord, ctx: &ZiRecordContext<'_>) -> Result<ZiExportStatus> {
        ctx.read_file_first(record)?;
        if record.is_empty_payload() {
            return Ok(ZiExportStatus::Empty);
        }

        let source_type = record.file_type();
        let text_target = record
            .get_str(keys::TARGET_TYPE)
            .filter(|t| !t.is_empty())
            .map(|t| t.trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or_else(|| "txt".to_string());

        let (extension, bytes): (String, &[u8]) = match ZiContentKind::of(&source_type) {
            ZiContentKind::Text if record.text.is_empty() => return Ok(ZiExportStatus::Empty),
            ZiContentKind::Text => (text_target, record.text.as_bytes()),
            ZiContentKind::Image => match record.data.as_deref() {
                Some(data) if !data.is_empty() => (source_type.clone(), data),
                _ => return Ok(ZiExportStatus::Empty),
            },
            ZiContentKind::Binary if !record.text.is_empty() => {
                (text_target, record.text.as_bytes())
            }
            ZiContentKind::Binary => return Ok(ZiExportStatus::Unsupported),
        };

        let stem = Path::new(record.file_name())
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("record")
            .to_string();

        let (path, file) = self.claim(&stem, &extension)?;
        write_claimed(&path, file, bytes)?;
        let size = bytes.len() as u64;
        let check_sum = self
            .checksum
            .then(|| blake3::hash(bytes).to_hex().to_string());

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        record.set(keys::FILE_ID, uuid::Uuid::new_v4().to_string());
        record.set(keys::FILE_NAME, file_name);
        record.set(keys::FILE_TYPE, extension);
        record.set(keys::FILE_PATH, path.to_string_lossy().into_owned());
        record.set(keys::FILE_SIZE, Value::from(size));
        match check_sum {
            Some(check_sum) => record.set(keys::CHECK_SUM, check_sum),
            None => {
                record.fields.remove(keys::CHECK_SUM);
            }
        }
        record.release_payload();

        Ok(ZiExportStatus::Written(path))
    }

    /// Atomically claims a free file name in the export directory.
    fn claim(&self, stem: &str, extension: &str) -> Result<(PathBuf, File)> {
        for counter in 0..MAX_NAME_ATTEMPTS {
            let name = if counter == 0 {
                format!("{stem}.{extension}")
            } else {
                format!("{stem}_{counter}.{extension}")
            };
            let path = self.export_path.join(name);
            match open_new(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(ZiError::Io(format!(
                        "cannot create '{}': {err}",
                        path.display()
                    )))
                }
            }
        }
        Err(ZiError::internal(format!(
            "no free file name for '{stem}.{extension}' in '{}'",
            self.export_path.display()
        )))
    }
}

/// Writes `bytes` into a freshly claimed file, removing it if the write fails.
fn write_claimed(path: &Path, mut file: impl Write, bytes: &[u8]) -> Result<()> {
    let written = file.write_all(bytes).and_then(|()| file.flush());
    drop(file);
    if let Err(err) = written {
        if let Err(cleanup) = std::fs::remove_file(path) {
            log::warn!("cannot remove partial export '{}': {cleanup}", path.display());
        }
        return Err(ZiError::Io(format!("cannot write '{}': {err}", path.display())));
    }
    Ok(())
}

#[cfg(unix)]
fn open_new(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o640)
        .open(path)
}

#[cfg(not(unix))]
fn open_new(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}
