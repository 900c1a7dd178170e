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

//! # Zirun Core Library
//!
//! Zirun executes one data-cleaning task: it loads a dataset description,
//! pushes every record through an ordered chain of operators, writes the
//! surviving files to an export directory, registers them in the metadata
//! store and reports a single terminal status for the task.
//!
//! ## Module Overview
//!
//! - **record**: [`ZiRecord`], the unit of work, and its field keys
//! - **config**: task and metadata store configuration
//! - **operator**: Mapper/Filter traits and lazy content loading
//! - **operators**: bundled operators
//! - **registry**: operator name to factory lookup
//! - **pipeline**: ordered chain execution per record
//! - **distributed**: execution substrates (sequential, thread pool)
//! - **ingest**: dataset loading with availability retries
//! - **export**: per-record file export and output scanning
//! - **store**: pooled metadata store client and its SQLite backend
//! - **driver**: the run state machine
//!
//! ## Feature Flags
//!
//! - `parallel`: Rayon thread-pool substrate
//! - `full`: Enables all features
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zirun::{ZiExecutionDriver, ZiSqliteMetadataStore, ZiStoreConfig, ZiTaskConfig};
//!
//! let store = ZiSqliteMetadataStore::from_config(&ZiStoreConfig::from_env()?);
//! let driver = ZiExecutionDriver::new(Arc::new(store));
//! let report = driver.run(&ZiTaskConfig::from_path("task.yaml")?)?;
//! println!("{} records kept", report.stats.kept);
//! # Ok::<(), zirun::ZiError>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ZiError>`. Per-record operator errors do
//! not abort a run; they become failed result rows.

#![allow(non_snake_case)]

pub mod config;
pub mod distributed;
pub mod driver;
pub mod errors;
pub mod export;
pub mod ingest;
pub mod operator;
pub mod operators;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod store;

pub use config::{
    ZiDatasetSource, ZiExecutorOptions, ZiFailureMode, ZiFailurePolicy, ZiOperatorConfig,
    ZiParams, ZiStoreConfig, ZiTaskConfig,
};
pub use distributed::{
    ZiDatasetHandle, ZiExecutionSubstrate, ZiMaterializeStats, ZiRecordStream, ZiRecordTask,
    ZiSequentialSubstrate,
};
#[cfg(feature = "parallel")]
pub use distributed::ZiThreadPoolSubstrate;
pub use driver::{ZiExecutionDriver, ZiRunPhase, ZiRunReport};
pub use errors::{Result, ZiError};
pub use export::{ZiExportStatus, ZiFileExporter, ZiOutputScanner, ZiScanOptions, ZiScanReport};
pub use ingest::{ZiDatasetLoader, ZiDatasetStorage, ZiLocalStorage};
pub use operator::{
    execute_operator, ZiContent, ZiContentKind, ZiContentLoader, ZiFileContentLoader, ZiFilter,
    ZiMapper, ZiOperatorKind, ZiRecordContext,
};
pub use pipeline::{ZiPipeline, ZiPipelineBuilder, ZiRecordOutcome};
pub use record::{keys, ZiMetadata, ZiRecord};
pub use registry::{ZiOperatorFactory, ZiOperatorRegistry};
pub use store::{
    ZiCleanResult, ZiDatasetFile, ZiMetadataStore, ZiRetryPolicy, ZiSqliteMetadataStore,
    ZiTaskStatus,
};
