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

//! # Zirun Pipeline Module
//!
//! A [`ZiPipeline`] is the ordered operator chain of one task, applied to each
//! record on its own:
//!
//! 1. operators run strictly in configured order, each seeing the previous
//!    operators' effect on the same record;
//! 2. a Filter that leaves the empty payload sentinel ends that record's chain
//!    ([`ZiRecordOutcome::Filtered`]);
//! 3. an operator error or panic ends that record's chain
//!    ([`ZiRecordOutcome::Failed`]) and never touches other records;
//! 4. surviving records are written to the export directory when an exporter
//!    is attached.
//!
//! Records never depend on each other, which is what lets an execution
//! substrate spread [`ZiPipeline::process_record`] across workers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::ZiOperatorConfig;
use crate::distributed::ZiRecordTask;
use crate::errors::{Result, ZiError};
use crate::export::writer::{ZiExportStatus, ZiFileExporter};
use crate::operator::{
    execute_operator, ZiContentLoader, ZiFileContentLoader, ZiOperatorKind, ZiRecordContext,
};
use crate::record::ZiRecord;
use crate::registry::ZiOperatorRegistry;

/// Stage name reported for failures raised while writing output.
pub const EXPORT_STAGE: &str = "export";

/// What happened to one record.
#[derive(Debug)]
pub enum ZiRecordOutcome {
    /// Passed every operator (and was exported, when configured).
    Kept(ZiRecord),
    /// Rejected by `operator`; later operators did not run.
    Filtered { record: ZiRecord, operator: String },
    /// `operator` raised `error`; later operators did not run.
    Failed {
        record: ZiRecord,
        operator: String,
        error: ZiError,
    },
}

impl ZiRecordOutcome {
    pub fn record(&self) -> &ZiRecord {
        match self {
            ZiRecordOutcome::Kept(record)
            | ZiRecordOutcome::Filtered { record, .. }
            | ZiRecordOutcome::Failed { record, .. } => record,
        }
    }

    pub fn is_kept(&self) -> bool {
        matches!(self, ZiRecordOutcome::Kept(_))
    }
}

/// Ordered operator chain with its content loader and optional exporter.
#[derive(Debug)]
pub struct ZiPipeline {
    nodes: Vec<ZiOperatorKind>,
    loader: Arc<dyn ZiContentLoader>,
    exporter: Option<ZiFileExporter>,
}

impl ZiPipeline {
    /// Constructs a pipeline reading content from the local filesystem.
    #[allow(non_snake_case)]
    pub fn new(nodes: Vec<ZiOperatorKind>) -> Self {
        ZiPipeline {
            nodes,
            loader: Arc::new(ZiFileContentLoader),
            exporter: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ZiContentLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_exporter(mut self, exporter: ZiFileExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Operator names in chain order.
    pub fn operator_names(&self) -> Vec<&str> {
        self.nodes.iter().map(ZiOperatorKind::name).collect()
    }

    /// Runs the whole chain on one record.
    pub fn process_record(&self, mut record: ZiRecord) -> ZiRecordOutcome {
        let ctx = ZiRecordContext::new(self.loader.as_ref());

        for operator in &self.nodes {
            if let Err(error) = execute_operator(operator, &mut record, &ctx) {
                log::warn!(
                    "record '{}' failed in operator '{}': {}",
                    record.file_name(),
                    operator.name(),
                    error
                );
                return ZiRecordOutcome::Failed {
                    record,
                    operator: operator.name().to_string(),
                    error,
                };
            }
            if operator.is_filter() && record.is_empty_payload() {
                log::debug!(
                    "record '{}' filtered by '{}'",
                    record.file_name(),
                    operator.name()
                );
                return ZiRecordOutcome::Filtered {
                    record,
                    operator: operator.name().to_string(),
                };
            }
        }

        if record.is_empty_payload() {
            let operator = self
                .nodes
                .last()
                .map(|node| node.name().to_string())
                .unwrap_or_default();
            return ZiRecordOutcome::Filtered { record, operator };
        }

        let Some(exporter) = &self.exporter else {
            return ZiRecordOutcome::Kept(record);
        };
        match exporter.export(&mut record, &ctx) {
            Ok(ZiExportStatus::Written(_)) | Ok(ZiExportStatus::Unsupported) => {
                ZiRecordOutcome::Kept(record)
            }
            Ok(ZiExportStatus::Empty) => ZiRecordOutcome::Filtered {
                record,
                operator: EXPORT_STAGE.to_string(),
            },
            Err(error) => {
                log::warn!(
                    "record '{}' could not be exported: {}",
                    record.file_name(),
                    error
                );
                ZiRecordOutcome::Failed {
                    record,
                    operator: EXPORT_STAGE.to_string(),
                    error,
                }
            }
        }
    }

    /// Like [`process_record`](Self::process_record), but a panicking operator
    /// becomes a per-record failure instead of unwinding into the worker.
    pub fn run_record(&self, record: ZiRecord) -> ZiRecordOutcome {
        let snapshot = record.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| self.process_record(record))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "operator panicked".to_string());
                log::error!(
                    "record '{}' panicked during processing: {}",
                    snapshot.file_name(),
                    message
                );
                ZiRecordOutcome::Failed {
                    record: snapshot,
                    operator: "pipeline".to_string(),
                    error: ZiError::internal(format!("panic: {message}")),
                }
            }
        }
    }

    /// Wraps the pipeline as a per-record task for an execution substrate.
    pub fn into_task(self: Arc<Self>) -> ZiRecordTask {
        Arc::new(move |record| self.run_record(record))
    }
}

/// Builder that resolves configured steps against an operator registry.
pub struct ZiPipelineBuilder<'a> {
    registry: &'a ZiOperatorRegistry,
    loader: Option<Arc<dyn ZiContentLoader>>,
    exporter: Option<ZiFileExporter>,
}

impl<'a> ZiPipelineBuilder<'a> {
    #[allow(non_snake_case)]
    pub fn new(registry: &'a ZiOperatorRegistry) -> Self {
        ZiPipelineBuilder {
            registry,
            loader: None,
            exporter: None,
        }
    }

    pub fn loader(mut self, loader: Arc<dyn ZiContentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn exporter(mut self, exporter: ZiFileExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Builds the chain, failing on the first unknown or misconfigured step.
    pub fn build(self, steps: &[ZiOperatorConfig]) -> Result<ZiPipeline> {
        let nodes = self.registry.build_chain(steps)?;
        let mut pipeline = ZiPipeline::new(nodes);
        if let Some(loader) = self.loader {
            pipeline = pipeline.with_loader(loader);
        }
        if let Some(exporter) = self.exporter {
            pipeline = pipeline.with_exporter(exporter);
        }
        Ok(pipeline)
    }
}
