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

//! # Execution Driver Module
//!
//! Runs one cleaning task through its phases:
//!
//! ```text
//! INIT -> LOADING -> PROCESSING -> SCANNING -> DONE
//!   \________\___________\____________\______-> FAILED
//! ```
//!
//! - **INIT**: builds the operator chain; unknown operators fail here
//! - **LOADING**: opens the dataset, waiting for it to appear if needed
//! - **PROCESSING**: runs the chain over every record and drains the results,
//!   persisting one result row per record
//! - **SCANNING**: registers the produced files
//! - **DONE**: writes `COMPLETED`
//!
//! Any error after the configuration has been parsed writes `FAILED` before it
//! is returned. Each run writes exactly one terminal status; if that write
//! itself fails the error is logged for manual reconciliation and nothing
//! else is written.
//!
//! A process killed mid-run writes nothing, so its task stays `RUNNING`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::{ZiFailureMode, ZiTaskConfig};
use crate::distributed::{ZiExecutionSubstrate, ZiMaterializeStats};
use crate::errors::{Result, ZiError};
use crate::export::{ZiFileExporter, ZiOutputScanner, ZiScanReport};
use crate::ingest::ZiDatasetLoader;
use crate::operator::{ZiContentLoader, ZiFileContentLoader};
use crate::pipeline::{ZiPipeline, ZiPipelineBuilder, ZiRecordOutcome};
use crate::registry::ZiOperatorRegistry;
use crate::store::{ZiCleanResult, ZiDatasetFile, ZiMetadataStore, ZiTaskStatus};

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZiRunPhase {
    Init,
    Loading,
    Processing,
    Scanning,
    Done,
    Failed,
}

impl fmt::Display for ZiRunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ZiRunPhase::Init => "INIT",
            ZiRunPhase::Loading => "LOADING",
            ZiRunPhase::Processing => "PROCESSING",
            ZiRunPhase::Scanning => "SCANNING",
            ZiRunPhase::Done => "DONE",
            ZiRunPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct ZiRunReport {
    pub dataset_id: String,
    pub instance_id: String,
    pub status: ZiTaskStatus,
    pub phases: Vec<ZiRunPhase>,
    pub stats: ZiMaterializeStats,
    pub scan: ZiScanReport,
    pub elapsed: Duration,
}

/// Bookkeeping for one run: phase trace and the single terminal write.
struct ZiRunState<'a> {
    dataset_id: &'a str,
    instance_id: &'a str,
    phases: Vec<ZiRunPhase>,
    terminal: Option<ZiTaskStatus>,
}

impl<'a> ZiRunState<'a> {
    fn new(config: &'a ZiTaskConfig) -> Self {
        ZiRunState {
            dataset_id: &config.dataset_id,
            instance_id: &config.instance_id,
            phases: vec![ZiRunPhase::Init],
            terminal: None,
        }
    }

    fn phase(&self) -> ZiRunPhase {
        self.phases.last().copied().unwrap_or(ZiRunPhase::Init)
    }

    fn enter(&mut self, phase: ZiRunPhase) {
        log::info!(
            "task {} (dataset {}): {} -> {}",
            self.instance_id,
            self.dataset_id,
            self.phase(),
            phase
        );
        self.phases.push(phase);
    }

    /// Writes the terminal status once; later calls are ignored.
    fn write_terminal(&mut self, store: &dyn ZiMetadataStore, status: ZiTaskStatus) -> Result<()> {
        if let Some(previous) = self.terminal {
            log::warn!(
                "task {}: terminal status {previous} already written, ignoring {status}",
                self.instance_id
            );
            return Ok(());
        }
        self.terminal = Some(status);
        store
            .update_result(self.dataset_id, self.instance_id, status)
            .map_err(|err| {
                log::error!(
                    "task {} (dataset {}): could not record terminal status {status}: {err}; manual reconciliation required",
                    self.instance_id,
                    self.dataset_id
                );
                err
            })
    }

    /// Records the failure and returns the original error.
    fn fail(&mut self, store: &dyn ZiMetadataStore, err: ZiError) -> ZiError {
        log::error!(
            "task {} (dataset {}) failed during {}: {err}",
            self.instance_id,
            self.dataset_id,
            self.phase()
        );
        self.enter(ZiRunPhase::Failed);
        let _ = self.write_terminal(store, ZiTaskStatus::Failed);
        err
    }
}

/// Orchestrates loading, processing, scanning and status reporting.
pub struct ZiExecutionDriver {
    store: Arc<dyn ZiMetadataStore>,
    substrate: Option<Arc<dyn ZiExecutionSubstrate>>,
    registry: Arc<ZiOperatorRegistry>,
    loader: ZiDatasetLoader,
    content_loader: Arc<dyn ZiContentLoader>,
    scanner: ZiOutputScanner,
}

impl fmt::Debug for ZiExecutionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZiExecutionDriver")
            .field("substrate", &self.substrate)
            .field("operators", &self.registry.names())
            .field("loader", &self.loader)
            .finish()
    }
}

impl ZiExecutionDriver {
    /// Creates a driver with the bundled operators reporting to `store`.
    #[allow(non_snake_case)]
    pub fn new(store: Arc<dyn ZiMetadataStore>) -> Self {
        ZiExecutionDriver {
            store,
            substrate: None,
            registry: Arc::new(ZiOperatorRegistry::with_defaults()),
            loader: ZiDatasetLoader::new(),
            content_loader: Arc::new(ZiFileContentLoader),
            scanner: ZiOutputScanner::default(),
        }
    }

    /// Uses a fixed substrate instead of one sized from each task's options.
    pub fn with_substrate(mut self, substrate: Arc<dyn ZiExecutionSubstrate>) -> Self {
        self.substrate = Some(substrate);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ZiOperatorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_loader(mut self, loader: ZiDatasetLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_content_loader(mut self, content_loader: Arc<dyn ZiContentLoader>) -> Self {
        self.content_loader = content_loader;
        self
    }

    pub fn with_scanner(mut self, scanner: ZiOutputScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Parses a raw configuration document, then runs it.
    ///
    /// A document that cannot be parsed names no task, so nothing is written.
    pub fn run_value(&self, value: Value) -> Result<ZiRunReport> {
        let config = ZiTaskConfig::from_value(value)?;
        self.run(&config)
    }

    /// Runs a task to a terminal status.
    pub fn run(&self, config: &ZiTaskConfig) -> Result<ZiRunReport> {
        let started = Instant::now();
        let store = self.store.as_ref();
        let mut state = ZiRunState::new(config);
        log::info!(
            "task {} (dataset {}): starting with {} operators",
            config.instance_id,
            config.dataset_id,
            config.process.len()
        );

        let prepared = self
            .build_pipeline(config)
            .and_then(|pipeline| Ok((pipeline, self.substrate_for(config)?)));
        let (pipeline, substrate) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => return Err(state.fail(store, err)),
        };

        let running =
            store.update_result(&config.dataset_id, &config.instance_id, ZiTaskStatus::Running);
        if let Err(err) = running {
            return Err(state.fail(store, err));
        }

        let (stats, scan) = match self.execute(&mut state, config, pipeline, substrate.as_ref()) {
            Ok(result) => result,
            Err(err) => return Err(state.fail(store, err)),
        };

        state.enter(ZiRunPhase::Done);
        state.write_terminal(store, ZiTaskStatus::Completed)?;
        let elapsed = started.elapsed();
        log::info!(
            "task {} completed in {:.2}s: {} records, {} kept, {} filtered, {} failed",
            config.instance_id,
            elapsed.as_secs_f64(),
            stats.total,
            stats.kept,
            stats.filtered,
            stats.failed
        );

        Ok(ZiRunReport {
            dataset_id: config.dataset_id.clone(),
            instance_id: config.instance_id.clone(),
            status: ZiTaskStatus::Completed,
            phases: state.phases,
            stats,
            scan,
            elapsed,
        })
    }

    fn build_pipeline(&self, config: &ZiTaskConfig) -> Result<ZiPipeline> {
        ZiPipelineBuilder::new(&self.registry)
            .loader(Arc::clone(&self.content_loader))
            .exporter(
                ZiFileExporter::new(&config.export_path)
                    .with_checksum(self.scanner.options().compute_checksum),
            )
            .build(&config.process)
    }

    fn substrate_for(&self, config: &ZiTaskConfig) -> Result<Arc<dyn ZiExecutionSubstrate>> {
        if let Some(substrate) = &self.substrate {
            return Ok(Arc::clone(substrate));
        }
        #[cfg(feature = "parallel")]
        {
            let substrate = crate::distributed::ZiThreadPoolSubstrate::new(
                config.executor.workers(),
                config.executor.window,
            )?;
            Ok(Arc::new(substrate))
        }
        #[cfg(not(feature = "parallel"))]
        {
            let _ = config;
            Ok(Arc::new(crate::distributed::ZiSequentialSubstrate))
        }
    }

    fn execute(
        &self,
        state: &mut ZiRunState<'_>,
        config: &ZiTaskConfig,
        pipeline: ZiPipeline,
        substrate: &dyn ZiExecutionSubstrate,
    ) -> Result<(ZiMaterializeStats, ZiScanReport)> {
        state.enter(ZiRunPhase::Loading);
        let records = self.loader.load(&config.source, &config.dataset_id)?;

        state.enter(ZiRunPhase::Processing);
        std::fs::create_dir_all(&config.export_path).map_err(|err| {
            ZiError::Io(format!(
                "cannot create export directory '{}': {err}",
                config.export_path.display()
            ))
        })?;
        let handle = substrate.distribute(records);
        let handle = substrate.for_each(handle, Arc::new(pipeline).into_task());
        let mut sink = |outcome: ZiRecordOutcome| self.persist_outcome(config, outcome);
        let stats = substrate.materialize(handle, &mut sink)?;

        if let Some(max_rate) = config.failure_policy.max_failure_rate {
            if stats.failure_rate() > max_rate {
                return Err(ZiError::validation(format!(
                    "{} of {} records failed ({:.1}%), above the configured limit of {:.1}%",
                    stats.failed,
                    stats.total,
                    stats.failure_rate() * 100.0,
                    max_rate * 100.0
                )));
            }
        }

        state.enter(ZiRunPhase::Scanning);
        let scan = self
            .scanner
            .scan(&config.export_path, &config.dataset_id, self.store.as_ref())?;
        Ok((stats, scan))
    }

    /// Writes the result row for one record and applies the failure policy.
    fn persist_outcome(&self, config: &ZiTaskConfig, outcome: ZiRecordOutcome) -> Result<()> {
        let row = ZiCleanResult::from_outcome(&config.instance_id, &outcome);
        self.store.insert_clean_result(&row)?;

        match outcome {
            ZiRecordOutcome::Kept(record) => {
                let exported = record
                    .file_path()
                    .is_some_and(|path| Path::new(path).starts_with(&config.export_path));
                if exported {
                    if let Some(file) = ZiDatasetFile::from_record(&config.dataset_id, &record) {
                        self.store.insert_dataset_files(std::slice::from_ref(&file))?;
                    }
                }
                Ok(())
            }
            ZiRecordOutcome::Filtered { .. } => Ok(()),
            ZiRecordOutcome::Failed { operator, error, .. } => {
                match config.failure_policy.mode {
                    ZiFailureMode::Skip => Ok(()),
                    ZiFailureMode::Abort => {
                        log::error!(
                            "task {}: aborting on record failure in '{operator}'",
                            config.instance_id
                        );
                        Err(error)
                    }
                }
            }
        }
    }
}

