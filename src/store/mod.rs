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

//! # Metadata Store Module
//!
//! Everything the executor reports leaves through [`ZiMetadataStore`]:
//!
//! - **Task status**: `update_result` moves the task to a new status and
//!   refreshes the dataset totals. Terminal statuses are final, and so are
//!   the totals written with them.
//! - **Per-record results**: one clean-result row per processed record.
//! - **Dataset files**: produced files registered against the dataset, used by
//!   the output scanner to skip what is already known.
//!
//! ## Module Components
//!
//! - **retry** ([`ZiRetryPolicy`]): exponential backoff with jitter
//! - **pool** ([`ZiPooledClient`]): lazily opened backend pool behind a
//!   once-only initializer, with retried checkout
//! - **sqlite** ([`ZiSqliteMetadataStore`]): the bundled SQLite backend on an
//!   `sqlx` pool
//!
//! Every statement runs in autocommit mode; no transaction spans a run.

pub mod pool;
pub mod retry;
pub mod sqlite;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::{Result, ZiError};
use crate::pipeline::ZiRecordOutcome;
use crate::record::{keys, ZiRecord};

pub use pool::{ZiConnectionFactory, ZiPoolOptions, ZiPooledClient};
pub use retry::ZiRetryPolicy;
pub use sqlite::{
    ZiSqliteConnection, ZiSqliteConnector, ZiSqliteMetadataStore, ZiSqlitePool, ZiTaskRow,
};

/// Externally visible task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZiTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl ZiTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZiTaskStatus::Pending => "PENDING",
            ZiTaskStatus::Running => "RUNNING",
            ZiTaskStatus::Completed => "COMPLETED",
            ZiTaskStatus::Failed => "FAILED",
            ZiTaskStatus::Stopped => "STOPPED",
        }
    }

    /// Terminal statuses are never overwritten.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ZiTaskStatus::Completed | ZiTaskStatus::Failed | ZiTaskStatus::Stopped
        )
    }
}

impl fmt::Display for ZiTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZiTaskStatus {
    type Err = ZiError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ZiTaskStatus::Pending),
            "RUNNING" => Ok(ZiTaskStatus::Running),
            "COMPLETED" => Ok(ZiTaskStatus::Completed),
            "FAILED" => Ok(ZiTaskStatus::Failed),
            "STOPPED" => Ok(ZiTaskStatus::Stopped),
            other => Err(ZiError::store(format!("unknown task status '{other}'"))),
        }
    }
}

/// One row of per-record results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZiCleanResult {
    pub instance_id: String,
    pub src_file_id: String,
    pub dest_file_id: String,
    pub src_name: String,
    pub dest_name: String,
    pub src_type: String,
    pub dest_type: String,
    pub src_size: u64,
    pub dest_size: u64,
    pub status: String,
    pub result: String,
}

impl ZiCleanResult {
    /// Describes a record outcome the way the result table expects it.
    ///
    /// Filtered and failed records carry destination size 0 and an empty
    /// destination type. Failures record `{op_name, error_code, reason}`.
    pub fn from_outcome(instance_id: &str, outcome: &ZiRecordOutcome) -> Self {
        let record = outcome.record();
        let mut row = ZiCleanResult {
            instance_id: instance_id.to_string(),
            src_file_id: field(record, keys::SOURCE_FILE_ID),
            dest_file_id: String::new(),
            src_name: field(record, keys::SOURCE_FILE_NAME),
            dest_name: String::new(),
            src_type: field(record, keys::SOURCE_FILE_TYPE),
            dest_type: String::new(),
            src_size: record.source_file_size().unwrap_or(0),
            dest_size: 0,
            status: ZiTaskStatus::Completed.as_str().to_string(),
            result: String::new(),
        };
        match outcome {
            ZiRecordOutcome::Kept(record) => {
                row.dest_file_id = field(record, keys::FILE_ID);
                row.dest_name = record.file_name().to_string();
                row.dest_type = record.file_type();
                row.dest_size = record.file_size().unwrap_or(0);
            }
            ZiRecordOutcome::Filtered { record, .. } => {
                row.dest_file_id = field(record, keys::FILE_ID);
                row.dest_name = record.file_name().to_string();
            }
            ZiRecordOutcome::Failed {
                record,
                operator,
                error,
            } => {
                row.dest_file_id = field(record, keys::FILE_ID);
                row.dest_name = record.file_name().to_string();
                row.status = ZiTaskStatus::Failed.as_str().to_string();
                row.result = json!({
                    "op_name": operator,
                    "error_code": error.code(),
                    "reason": error.to_string(),
                })
                .to_string();
            }
        }
        row
    }
}

/// One produced file registered against a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZiDatasetFile {
    pub id: String,
    pub dataset_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: u64,
    pub check_sum: Option<String>,
}

impl ZiDatasetFile {
    /// Builds the registration row for an exported record.
    pub fn from_record(dataset_id: &str, record: &ZiRecord) -> Option<Self> {
        let file_path = record.file_path()?.to_string();
        Some(ZiDatasetFile {
            id: record
                .get_str(keys::FILE_ID)
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            dataset_id: dataset_id.to_string(),
            file_name: record.file_name().to_string(),
            file_path,
            file_type: record.file_type(),
            file_size: record.file_size().unwrap_or(0),
            check_sum: record.get_str(keys::CHECK_SUM).map(str::to_string),
        })
    }
}

fn field(record: &ZiRecord, key: &str) -> String {
    match record.fields.get(key) {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Status sink and file catalog used by the execution driver.
pub trait ZiMetadataStore: Send + Sync {
    /// Moves the task to `status` and refreshes the dataset's size and file
    /// count. Once the task is terminal neither row changes again, so a
    /// repeated call leaves the stored state unchanged.
    fn update_result(&self, dataset_id: &str, instance_id: &str, status: ZiTaskStatus) -> Result<()>;

    /// Current status of a task, if it has been recorded.
    fn task_status(&self, instance_id: &str) -> Result<Option<ZiTaskStatus>>;

    /// Persists one per-record result row.
    fn insert_clean_result(&self, result: &ZiCleanResult) -> Result<()>;

    /// Paths already registered for the dataset.
    fn existing_file_paths(&self, dataset_id: &str) -> Result<HashSet<String>>;

    /// Registers files, ignoring paths already present; returns how many were new.
    fn insert_dataset_files(&self, files: &[ZiDatasetFile]) -> Result<usize>;
}
