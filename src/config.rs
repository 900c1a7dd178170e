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

//! # Zirun Configuration Module
//!
//! Task configuration is a YAML document handed to the executor either as a
//! file or as an inline base64 string:
//!
//! ```yaml
//! dataset_id: ds-1
//! instance_id: task-1
//! dataset_path: /flow/task-1/dataset.jsonl
//! export_path: /dataset/ds-1
//! process:
//!   - HtmlTagCleaner: {}
//!   - FileSizeFilter: {minSize: 1}
//! kwargs: {}
//! failure_policy: {mode: skip}
//! ```
//!
//! Each `process` entry is either a single-key map `{OperatorName: params}`
//! or an explicit `{name: OperatorName, params: {...}}` map. Entries in
//! `kwargs` become default parameters for every operator.
//!
//! Metadata store settings are read from `ZIRUN_DB_*` environment variables
//! by [`ZiStoreConfig::from_env`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, ZiError};

/// Parameter map handed to an operator factory.
pub type ZiParams = Map<String, Value>;

/// One configured pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZiOperatorConfig {
    pub name: String,
    #[serde(default)]
    pub params: ZiParams,
}

impl ZiOperatorConfig {
    #[allow(non_snake_case)]
    pub fn new(name: impl Into<String>, params: ZiParams) -> Self {
        ZiOperatorConfig {
            name: name.into(),
            params,
        }
    }

    /// Parses either `{Name: params}` or `{name: Name, params: {...}}`.
    pub fn from_value(index: usize, value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            ZiError::config(format!("process step #{index} must be a mapping"))
        })?;

        if let Some(name) = object.get("name").and_then(Value::as_str) {
            let params = match object.get("params") {
                None | Some(Value::Null) => ZiParams::new(),
                Some(Value::Object(params)) => params.clone(),
                Some(_) => {
                    return Err(ZiError::config(format!(
                        "process step #{index} params must be a mapping"
                    )))
                }
            };
            return Ok(ZiOperatorConfig::new(name, params));
        }

        if object.len() != 1 {
            return Err(ZiError::config(format!(
                "process step #{index} must name exactly one operator"
            )));
        }
        let (name, params) = object
            .iter()
            .next()
            .ok_or_else(|| ZiError::config(format!("process step #{index} is empty")))?;
        let params = match params {
            Value::Null => ZiParams::new(),
            Value::Object(params) => params.clone(),
            _ => {
                return Err(ZiError::config(format!(
                    "parameters of '{name}' at step #{index} must be a mapping"
                )))
            }
        };
        Ok(ZiOperatorConfig::new(name.clone(), params))
    }

    /// Fills in parameters missing from this step with the given defaults.
    pub fn merge_defaults(&mut self, defaults: &ZiParams) {
        for (key, value) in defaults {
            self.params
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// How per-record failures affect the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZiFailureMode {
    /// Exclude the failing record and continue.
    #[default]
    Skip,
    /// Fail the run at the first per-record failure.
    Abort,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZiFailurePolicy {
    #[serde(default)]
    pub mode: ZiFailureMode,
    /// Fails the run once `failed / total` exceeds this fraction.
    #[serde(default)]
    pub max_failure_rate: Option<f64>,
}

impl ZiFailurePolicy {
    pub fn validate(&self) -> Result<()> {
        if let Some(rate) = self.max_failure_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ZiError::config(format!(
                    "max_failure_rate must be within [0, 1], got {rate}"
                )));
            }
        }
        Ok(())
    }
}

/// Parallel execution knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZiExecutorOptions {
    /// Worker threads; defaults to the number of CPUs.
    #[serde(default)]
    pub num_workers: Option<usize>,
    /// Records scheduled ahead of consumption.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize {
    256
}

impl Default for ZiExecutorOptions {
    fn default() -> Self {
        ZiExecutorOptions {
            num_workers: None,
            window: default_window(),
        }
    }
}

impl ZiExecutorOptions {
    pub fn workers(&self) -> usize {
        self.num_workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Where the dataset description comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ZiDatasetSource {
    /// Line-delimited JSON file, possibly not yet synced.
    Path(PathBuf),
    /// Base64-encoded line-delimited JSON.
    Inline(String),
}

#[derive(Debug, Deserialize)]
struct ZiRawTaskConfig {
    #[serde(default)]
    dataset_id: Option<String>,
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(default)]
    dataset_path: Option<PathBuf>,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    export_path: Option<PathBuf>,
    #[serde(default)]
    executor_type: Option<String>,
    #[serde(default)]
    kwargs: Option<ZiParams>,
    #[serde(default)]
    executor: Option<ZiExecutorOptions>,
    #[serde(default)]
    failure_policy: Option<ZiFailurePolicy>,
}

/// Fully validated task configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ZiTaskConfig {
    pub dataset_id: String,
    pub instance_id: String,
    pub source: ZiDatasetSource,
    pub export_path: PathBuf,
    pub executor_type: Option<String>,
    /// Ordered steps with `kwargs` defaults already merged in.
    pub process: Vec<ZiOperatorConfig>,
    pub kwargs: ZiParams,
    pub executor: ZiExecutorOptions,
    pub failure_policy: ZiFailurePolicy,
}

impl ZiTaskConfig {
    /// Validates the configuration shape and builds the typed form.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(ZiError::config("task configuration must be a mapping"));
        };
        let process = match object.remove("process") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(steps)) => steps,
            Some(_) => return Err(ZiError::config("process must be a list")),
        };
        let raw: ZiRawTaskConfig = serde_json::from_value(Value::Object(object))
            .map_err(|err| ZiError::config(err.to_string()))?;

        let dataset_id = required(raw.dataset_id, "dataset_id")?;
        let instance_id = required(raw.instance_id, "instance_id")?;
        let export_path = raw
            .export_path
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| ZiError::config("missing required field 'export_path'"))?;

        let source = match (raw.dataset_path, raw.dataset) {
            (_, Some(inline)) if !inline.trim().is_empty() => ZiDatasetSource::Inline(inline),
            (Some(path), _) if !path.as_os_str().is_empty() => ZiDatasetSource::Path(path),
            _ => {
                return Err(ZiError::config(
                    "one of 'dataset_path' or 'dataset' is required",
                ))
            }
        };

        let kwargs = raw.kwargs.unwrap_or_default();
        let mut steps = Vec::with_capacity(process.len());
        for (index, step) in process.iter().enumerate() {
            let mut step = ZiOperatorConfig::from_value(index, step)?;
            step.merge_defaults(&kwargs);
            steps.push(step);
        }

        let executor = raw.executor.unwrap_or_default();
        if executor.window == 0 {
            return Err(ZiError::config("executor.window must be positive"));
        }
        let failure_policy = raw.failure_policy.unwrap_or_default();
        failure_policy.validate()?;

        Ok(ZiTaskConfig {
            dataset_id,
            instance_id,
            source,
            export_path,
            executor_type: raw.executor_type,
            process: steps,
            kwargs,
            executor,
            failure_policy,
        })
    }

    /// Parses a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(value)
    }

    /// Reads a YAML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ZiError::config(format!("cannot read '{}': {err}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Decodes an inline base64 YAML configuration.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        let text = String::from_utf8(bytes)
            .map_err(|err| ZiError::config(format!("configuration is not UTF-8: {err}")))?;
        Self::from_yaml_str(&text)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ZiError::config(format!("missing required field '{field}'")))
}

/// Metadata store and connection pool settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ZiStoreConfig {
    pub db_path: PathBuf,
    pub pool_size: usize,
    pub max_overflow: usize,
    pub pool_timeout: Duration,
    pub recycle: Duration,
    pub pre_ping: bool,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ZiStoreConfig {
    fn default() -> Self {
        ZiStoreConfig {
            db_path: PathBuf::from("zirun.db"),
            pool_size: 5,
            max_overflow: 10,
            pool_timeout: Duration::from_secs(30),
            recycle: Duration::from_secs(3600),
            pre_ping: true,
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ZiStoreConfig {
    /// Reads `ZIRUN_DB_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = ZiStoreConfig::default();
        if let Some(path) = lookup("ZIRUN_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(size) = parse_var(&lookup, "ZIRUN_DB_POOL_SIZE")? {
            config.pool_size = size;
        }
        if let Some(overflow) = parse_var(&lookup, "ZIRUN_DB_MAX_OVERFLOW")? {
            config.max_overflow = overflow;
        }
        if let Some(secs) = parse_var(&lookup, "ZIRUN_DB_POOL_TIMEOUT_SECS")? {
            config.pool_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "ZIRUN_DB_RECYCLE_SECS")? {
            config.recycle = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var(&lookup, "ZIRUN_DB_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(millis) = parse_var(&lookup, "ZIRUN_DB_BASE_DELAY_MS")? {
            config.base_delay = Duration::from_millis(millis);
        }
        if config.pool_size == 0 {
            return Err(ZiError::config("ZIRUN_DB_POOL_SIZE must be positive"));
        }
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ZiError::config(format!("{key} has an invalid value '{raw}'"))),
    }
}
