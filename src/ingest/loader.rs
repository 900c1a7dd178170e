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

//! # Dataset Loader
//!
//! Each non-blank line of the dataset description is one JSON object that
//! becomes one [`ZiRecord`]. Field names are normalized on the way in
//! (`fileId` → `sourceFileId` and friends) and the dataset id is stamped.
//!
//! A dataset path that is not readable yet is polled up to `max_attempts`
//! times, sleeping `attempt × delay_unit` after each miss. Lines are read
//! lazily; only the open file handle is held while the stream is consumed.

use std::fmt::Debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde_json::Value;

use crate::config::ZiDatasetSource;
use crate::distributed::ZiRecordStream;
use crate::errors::{Result, ZiError};
use crate::record::ZiRecord;

/// Where dataset files are read from.
pub trait ZiDatasetStorage: Debug + Send + Sync {
    /// Whether `path` can be opened right now.
    fn is_available(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn BufRead + Send>>;
}

/// Local (or locally mounted) filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZiLocalStorage;

impl ZiDatasetStorage for ZiLocalStorage {
    fn is_available(&self, path: &Path) -> bool {
        path.is_file() && File::open(path).is_ok()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn BufRead + Send>> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Loads dataset descriptions into record streams.
#[derive(Debug, Clone)]
pub struct ZiDatasetLoader {
    storage: Arc<dyn ZiDatasetStorage>,
    max_attempts: u32,
    delay_unit: Duration,
}

impl Default for ZiDatasetLoader {
    fn default() -> Self {
        ZiDatasetLoader::new()
    }
}

impl ZiDatasetLoader {
    #[allow(non_snake_case)]
    pub fn new() -> Self {
        ZiDatasetLoader {
            storage: Arc::new(ZiLocalStorage),
            max_attempts: 5,
            delay_unit: Duration::from_secs(1),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn ZiDatasetStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Base unit of the linear backoff; the wait after attempt `n` is `n` units.
    pub fn with_delay_unit(mut self, delay_unit: Duration) -> Self {
        self.delay_unit = delay_unit;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Polls until `path` is available, or fails once the attempts are spent.
    pub fn wait_for(&self, path: &Path) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            if self.storage.is_available(path) {
                if attempt > 1 {
                    log::info!(
                        "dataset '{}' became available on attempt {attempt}",
                        path.display()
                    );
                }
                return Ok(());
            }
            if attempt < self.max_attempts {
                let wait = self.delay_unit * attempt;
                log::warn!(
                    "dataset '{}' not available (attempt {attempt}/{}), retrying in {:?}",
                    path.display(),
                    self.max_attempts,
                    wait
                );
                std::thread::sleep(wait);
            }
        }
        log::error!("dataset '{}' never became available", path.display());
        Err(ZiError::DatasetUnavailable {
            path: path.display().to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Opens the dataset and returns a lazy stream of normalized records.
    ///
    /// Availability is resolved here; malformed lines surface as `Err` items
    /// while the stream is consumed.
    pub fn load(&self, source: &ZiDatasetSource, dataset_id: &str) -> Result<ZiRecordStream> {
        let reader: Box<dyn BufRead + Send> = match source {
            ZiDatasetSource::Path(path) => {
                self.wait_for(path)?;
                log::info!("loading dataset {dataset_id} from '{}'", path.display());
                self.storage.open(path)?
            }
            ZiDatasetSource::Inline(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
                log::info!(
                    "loading dataset {dataset_id} from inline payload ({} bytes)",
                    bytes.len()
                );
                Box::new(Cursor::new(bytes))
            }
        };
        Ok(Box::new(ZiLineRecords {
            lines: reader.lines(),
            line_no: 0,
            dataset_id: dataset_id.to_string(),
        }))
    }
}

struct ZiLineRecords {
    lines: std::io::Lines<Box<dyn BufRead + Send>>,
    line_no: usize,
    dataset_id: String,
}

impl Iterator for ZiLineRecords {
    type Item = Result<ZiRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return Some(parse_line(self.line_no, line, &self.dataset_id));
        }
    }
}

fn parse_line(line_no: usize, line: &str, dataset_id: &str) -> Result<ZiRecord> {
    let value: Value = serde_json::from_str(line)
        .map_err(|err| ZiError::validation(format!("dataset line {line_no}: {err}")))?;
    let mut record = ZiRecord::from_value(value)
        .map_err(|err| ZiError::validation(format!("dataset line {line_no}: {err}")))?;
    record.normalize(dataset_id);
    Ok(record)
}
