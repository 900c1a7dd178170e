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

//! # Distributed Execution Module
//!
//! Execution substrates spread per-record work across workers. The driver only
//! needs three operations from one:
//!
//! - **distribute**: wrap a record stream in a [`ZiDatasetHandle`]
//! - **for_each**: attach a per-record task to the handle; nothing runs yet
//! - **materialize**: force the computation, handing every outcome to a sink
//!   on the calling thread
//!
//! ## Substrates
//!
//! - [`ZiSequentialSubstrate`]: runs everything on the caller's thread
//! - [`ZiThreadPoolSubstrate`] (feature `parallel`): a dedicated Rayon pool
//!   fed a bounded window of records at a time, so reading never runs far
//!   ahead of consumption
//!
//! Outcome order across records is not guaranteed.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zirun::distributed::{ZiExecutionSubstrate, ZiSequentialSubstrate};
//! use zirun::pipeline::ZiPipeline;
//!
//! let substrate = ZiSequentialSubstrate;
//! let records = Box::new(std::iter::empty());
//! let handle = substrate.distribute(records);
//! let handle = substrate.for_each(handle, Arc::new(ZiPipeline::new(vec![])).into_task());
//! let stats = substrate.materialize(handle, &mut |_outcome| Ok(())).unwrap();
//! assert_eq!(stats.total, 0);
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::Result;
use crate::pipeline::ZiRecordOutcome;
use crate::record::ZiRecord;

/// Lazily produced records; an `Err` item is fatal for the run.
pub type ZiRecordStream = Box<dyn Iterator<Item = Result<ZiRecord>> + Send>;

/// Pure per-record function applied by a substrate.
pub type ZiRecordTask = Arc<dyn Fn(ZiRecord) -> ZiRecordOutcome + Send + Sync>;

/// Consumer of materialized outcomes; returning `Err` stops materialization.
pub type ZiOutcomeSink<'a> = dyn FnMut(ZiRecordOutcome) -> Result<()> + 'a;

/// Description of a not-yet-executed distributed computation.
pub struct ZiDatasetHandle {
    source: ZiRecordStream,
    tasks: Vec<ZiRecordTask>,
}

impl ZiDatasetHandle {
    #[allow(non_snake_case)]
    pub fn new(source: ZiRecordStream) -> Self {
        ZiDatasetHandle {
            source,
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: ZiRecordTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn into_parts(self) -> (ZiRecordStream, Vec<ZiRecordTask>) {
        (self.source, self.tasks)
    }
}

impl std::fmt::Debug for ZiDatasetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZiDatasetHandle")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Applies tasks in order; a record leaves the chain once it is not kept.
fn apply_tasks(tasks: &[ZiRecordTask], record: ZiRecord) -> ZiRecordOutcome {
    let mut outcome = ZiRecordOutcome::Kept(record);
    for task in tasks {
        outcome = match outcome {
            ZiRecordOutcome::Kept(record) => task(record),
            other => return other,
        };
    }
    outcome
}

/// Counts of materialized outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZiMaterializeStats {
    pub total: usize,
    pub kept: usize,
    pub filtered: usize,
    pub failed: usize,
}

impl ZiMaterializeStats {
    pub fn observe(&mut self, outcome: &ZiRecordOutcome) {
        self.total += 1;
        match outcome {
            ZiRecordOutcome::Kept(_) => self.kept += 1,
            ZiRecordOutcome::Filtered { .. } => self.filtered += 1,
            ZiRecordOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Fraction of records that failed; zero for an empty run.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Backing execution engine for per-record work.
pub trait ZiExecutionSubstrate: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn distribute(&self, records: ZiRecordStream) -> ZiDatasetHandle {
        ZiDatasetHandle::new(records)
    }

    fn for_each(&self, handle: ZiDatasetHandle, task: ZiRecordTask) -> ZiDatasetHandle {
        handle.with_task(task)
    }

    /// Runs every attached task over every record, blocking until done.
    fn materialize(
        &self,
        handle: ZiDatasetHandle,
        sink: &mut ZiOutcomeSink<'_>,
    ) -> Result<ZiMaterializeStats>;
}

/// Single-threaded substrate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZiSequentialSubstrate;

impl ZiExecutionSubstrate for ZiSequentialSubstrate {
    fn name(&self) -> &str {
        "sequential"
    }

    fn materialize(
        &self,
        handle: ZiDatasetHandle,
        sink: &mut ZiOutcomeSink<'_>,
    ) -> Result<ZiMaterializeStats> {
        let (source, tasks) = handle.into_parts();
        let mut stats = ZiMaterializeStats::default();
        for record in source {
            let outcome = apply_tasks(&tasks, record?);
            stats.observe(&outcome);
            sink(outcome)?;
        }
        Ok(stats)
    }
}

#[cfg(feature = "parallel")]
pub use pool::ZiThreadPoolSubstrate;

#[cfg(feature = "parallel")]
mod pool {
    use rayon::prelude::*;

    use super::*;
    use crate::errors::ZiError;

    /// Rayon-backed substrate with bounded read-ahead.
    pub struct ZiThreadPoolSubstrate {
        pool: rayon::ThreadPool,
        window: usize,
    }

    impl Debug for ZiThreadPoolSubstrate {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ZiThreadPoolSubstrate")
                .field("workers", &self.pool.current_num_threads())
                .field("window", &self.window)
                .finish()
        }
    }

    impl ZiThreadPoolSubstrate {
        /// Builds a dedicated pool of `workers` threads processing at most
        /// `window` records between two sink hand-offs.
        #[allow(non_snake_case)]
        pub fn new(workers: usize, window: usize) -> Result<Self> {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers.max(1))
                .thread_name(|i| format!("zirun-worker-{i}"))
                .build()
                .map_err(|err| ZiError::internal(format!("failed to build worker pool: {err}")))?;
            Ok(ZiThreadPoolSubstrate {
                pool,
                window: window.max(1),
            })
        }

        pub fn workers(&self) -> usize {
            self.pool.current_num_threads()
        }
    }

    impl ZiExecutionSubstrate for ZiThreadPoolSubstrate {
        fn name(&self) -> &str {
            "thread-pool"
        }

        fn materialize(
            &self,
            handle: ZiDatasetHandle,
            sink: &mut ZiOutcomeSink<'_>,
        ) -> Result<ZiMaterializeStats> {
            let (mut source, tasks) = handle.into_parts();
            let mut stats = ZiMaterializeStats::default();
            loop {
                let chunk = source
                    .by_ref()
                    .take(self.window)
                    .collect::<Result<Vec<ZiRecord>>>()?;
                if chunk.is_empty() {
                    break;
                }
                let outcomes: Vec<ZiRecordOutcome> = self.pool.install(|| {
                    chunk
                        .into_par_iter()
                        .map(|record| apply_tasks(&tasks, record))
                        .collect()
                });
                for outcome in outcomes {
                    stats.observe(&outcome);
                    sink(outcome)?;
                }
            }
            Ok(stats)
        }
    }
}
