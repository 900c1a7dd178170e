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

//! # Zirun Executor
//!
//! Runs one cleaning task and exits non-zero if it did not complete.
//!
//! ```bash
//! zirun --config-path task.yaml
//! zirun --flow-config "$(base64 -w0 task.yaml)" --log-level debug
//! ```
//!
//! The metadata store is configured through `ZIRUN_DB_PATH` and the other
//! `ZIRUN_*` variables. `RUST_LOG` overrides `--log-level`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use zirun::{ZiExecutionDriver, ZiSqliteMetadataStore, ZiStoreConfig, ZiTaskConfig};

#[derive(Debug, Parser)]
#[command(name = "zirun", version, about = "Run a Zi cleaning task")]
struct Cli {
    /// YAML or JSON task configuration file.
    #[arg(long, conflicts_with = "flow_config", required_unless_present = "flow_config")]
    config_path: Option<PathBuf>,

    /// Base64-encoded task configuration.
    #[arg(long)]
    flow_config: Option<String>,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp_millis()
        .init();

    let config = match (&cli.config_path, &cli.flow_config) {
        (Some(path), _) => ZiTaskConfig::from_path(path)
            .with_context(|| format!("invalid task configuration '{}'", path.display()))?,
        (None, Some(encoded)) => {
            ZiTaskConfig::from_base64(encoded).context("invalid inline task configuration")?
        }
        (None, None) => anyhow::bail!("either --config-path or --flow-config is required"),
    };

    let store_config = ZiStoreConfig::from_env().context("invalid metadata store settings")?;
    log::info!("metadata store at '{}'", store_config.db_path.display());
    let store = ZiSqliteMetadataStore::from_config(&store_config);

    let driver = ZiExecutionDriver::new(Arc::new(store));
    let report = driver
        .run(&config)
        .with_context(|| format!("task {} failed", config.instance_id))?;
    log::info!(
        "task {} finished with status {} ({} kept, {} filtered, {} failed, {} files registered)",
        report.instance_id,
        report.status,
        report.stats.kept,
        report.stats.filtered,
        report.stats.failed,
        report.scan.registered
    );
    Ok(())
}
