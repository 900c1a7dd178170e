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

//! # Output Scanner
//!
//! Walks the export directory once processing is done and registers every
//! produced file the metadata store does not know yet. Hidden entries are
//! skipped. An empty directory is a valid outcome; a missing one is not.
//!
//! A scan only hashes files the store does not know yet.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use walkdir::WalkDir;

use crate::errors::{Result, ZiError};
use crate::store::{ZiDatasetFile, ZiMetadataStore};

/// Tuning for [`ZiOutputScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZiScanOptions {
    /// Rows per insert batch.
    pub batch_size: usize,
    /// Store a BLAKE3 checksum for each file.
    pub compute_checksum: bool,
}

impl Default for ZiScanOptions {
    fn default() -> Self {
        ZiScanOptions {
            batch_size: 5000,
            compute_checksum: true,
        }
    }
}

/// What a scan found and registered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZiScanReport {
    /// Every file found under the export path.
    pub files: Vec<ZiDatasetFile>,
    /// Files that were not registered before this scan.
    pub registered: usize,
    /// Files already known to the store.
    pub already_known: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ZiOutputScanner {
    options: ZiScanOptions,
}

impl ZiOutputScanner {
    #[allow(non_snake_case)]
    pub fn new(options: ZiScanOptions) -> Self {
        ZiOutputScanner { options }
    }

    pub fn options(&self) -> &ZiScanOptions {
        &self.options
    }

    /// Lists produced files in file-name order, checksummed when enabled.
    pub fn enumerate(&self, export_path: &Path, dataset_id: &str) -> Result<Vec<ZiDatasetFile>> {
        let mut files = self.walk(export_path, dataset_id)?;
        if self.options.compute_checksum {
            for file in &mut files {
                hash_file(export_path, file)?;
            }
        }
        Ok(files)
    }

    fn walk(&self, export_path: &Path, dataset_id: &str) -> Result<Vec<ZiDatasetFile>> {
        let scan_error = |message: String| ZiError::scan(export_path.display().to_string(), message);
        if !export_path.is_dir() {
            return Err(scan_error("export directory does not exist".to_string()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(export_path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry.map_err(|err| scan_error(format!("walk error: {err}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|err| scan_error(format!("metadata error: {err}")))?;
            let path = entry.path();
            files.push(ZiDatasetFile {
                id: uuid::Uuid::new_v4().to_string(),
                dataset_id: dataset_id.to_string(),
                file_name: entry.file_name().to_string_lossy().into_owned(),
                file_path: path.to_string_lossy().into_owned(),
                file_type: path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                    .unwrap_or_default(),
                file_size: metadata.len(),
                check_sum: None,
            });
        }
        Ok(files)
    }

    /// Enumerates the export path and registers files the store has not seen.
    pub fn scan(
        &self,
        export_path: &Path,
        dataset_id: &str,
        store: &dyn ZiMetadataStore,
    ) -> Result<ZiScanReport> {
        let mut files = self.walk(export_path, dataset_id)?;
        let existing: HashSet<String> = store.existing_file_paths(dataset_id)?;
        if self.options.compute_checksum {
            for file in files
                .iter_mut()
                .filter(|file| !existing.contains(&file.file_path))
            {
                hash_file(export_path, file)?;
            }
        }
        let fresh: Vec<ZiDatasetFile> = files
            .iter()
            .filter(|file| !existing.contains(&file.file_path))
            .cloned()
            .collect();

        let mut registered = 0;
        for batch in fresh.chunks(self.options.batch_size.max(1)) {
            registered += store.insert_dataset_files(batch)?;
        }
        let report = ZiScanReport {
            already_known: files.len() - fresh.len(),
            registered,
            files,
        };
        log::info!(
            "scanned '{}': {} files, {} newly registered, {} already known",
            export_path.display(),
            report.files.len(),
            report.registered,
            report.already_known
        );
        Ok(report)
    }
}

fn hash_file(export_path: &Path, file: &mut ZiDatasetFile) -> Result<()> {
    let check_sum = checksum(Path::new(&file.file_path)).map_err(|err| {
        ZiError::scan(
            export_path.display().to_string(),
            format!("cannot hash '{}': {err}", file.file_path),
        )
    })?;
    file.check_sum = Some(check_sum);
    Ok(())
}

fn checksum(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
