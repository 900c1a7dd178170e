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

//! # Zirun Error Module
//!
//! This module defines the error types used throughout the executor for
//! consistent error handling and reporting.
//!
//! ## Error Categories
//!
//! Run-fatal errors end the task with a `FAILED` status:
//!
//! - **Config**: Malformed task configuration, detected before any work starts
//! - **UnsupportedOperator**: A pipeline step names an operator nobody registered
//! - **DatasetUnavailable**: The dataset path never appeared within the retry budget
//! - **Connection**: The metadata store could not be reached after retries
//! - **Store**: A metadata store statement failed
//! - **Scan**: The export directory could not be walked
//!
//! Per-record errors are contained by the pipeline engine and only excluded
//! the record from the output:
//!
//! - **ContentUnavailable**: A record's underlying file could not be read
//! - **Operator**: An operator implementation raised an error
//!
//! ## Usage
//!
//! ```rust
//! use zirun::errors::{Result, ZiError};
//!
//! fn check(path: &str) -> Result<()> {
//!     if path.is_empty() {
//!         return Err(ZiError::config("export_path cannot be empty"));
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout Zirun.
pub type Result<T> = std::result::Result<T, ZiError>;

/// Canonical error enumeration for Zirun.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum ZiError {
    /// Malformed task configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// A pipeline step references an operator name with no registered factory.
    #[error("unsupported operator '{operator}' at step #{index}")]
    UnsupportedOperator { operator: String, index: usize },

    /// The dataset file was still missing once the retry budget was spent.
    #[error("dataset unavailable at '{path}' after {attempts} attempts")]
    DatasetUnavailable { path: String, attempts: u32 },

    /// A record's underlying file could not be read.
    #[error("content unavailable for '{path}': {message}")]
    ContentUnavailable { path: String, message: String },

    /// Any failure raised by an operator implementation.
    #[error("operator '{operator}' failed: {message}")]
    Operator { operator: String, message: String },

    /// The metadata store could not be reached.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// A metadata store statement failed.
    #[error("store error: {message}")]
    Store { message: String },

    /// The export directory could not be traversed.
    #[error("scan error at '{path}': {message}")]
    Scan { path: String, message: String },

    /// Validation errors triggered by invalid parameters or inputs.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Errors originating from filesystem IO.
    #[error("io error: {0}")]
    Io(String),

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for ZiError {
    fn from(err: io::Error) -> Self {
        ZiError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ZiError {
    fn from(err: serde_json::Error) -> Self {
        ZiError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for ZiError {
    fn from(err: serde_yaml::Error) -> Self {
        ZiError::Config {
            message: err.to_string(),
        }
    }
}

impl From<base64::DecodeError> for ZiError {
    fn from(err: base64::DecodeError) -> Self {
        ZiError::Config {
            message: format!("invalid base64 payload: {err}"),
        }
    }
}

impl From<sqlx::Error> for ZiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ZiError::Connection {
                    message: err.to_string(),
                }
            }
            _ => ZiError::Store {
                message: err.to_string(),
            },
        }
    }
}

impl ZiError {
    /// Helper to construct configuration errors.
    pub fn config<T: Into<String>>(message: T) -> Self {
        ZiError::Config {
            message: message.into(),
        }
    }

    /// Helper to construct simple validation errors.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        ZiError::Validation {
            message: message.into(),
        }
    }

    /// Helper to construct operator errors.
    pub fn operator(name: impl Into<String>, message: impl Into<String>) -> Self {
        ZiError::Operator {
            operator: name.into(),
            message: message.into(),
        }
    }

    /// Helper to construct content errors.
    pub fn content(path: impl Into<String>, message: impl Into<String>) -> Self {
        ZiError::ContentUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Helper to construct connection errors.
    pub fn connection<T: Into<String>>(message: T) -> Self {
        ZiError::Connection {
            message: message.into(),
        }
    }

    /// Helper to construct store errors.
    pub fn store<T: Into<String>>(message: T) -> Self {
        ZiError::Store {
            message: message.into(),
        }
    }

    /// Helper to construct scan errors.
    pub fn scan(path: impl Into<String>, message: impl Into<String>) -> Self {
        ZiError::Scan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        ZiError::Internal(message.into())
    }

    /// Whether a retry at the connection layer may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ZiError::Connection { .. } | ZiError::Io(_))
    }

    /// Short machine-readable code stored alongside per-record failures.
    pub fn code(&self) -> &'static str {
        match self {
            ZiError::Config { .. } => "CONFIG",
            ZiError::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            ZiError::DatasetUnavailable { .. } => "DATASET_UNAVAILABLE",
            ZiError::ContentUnavailable { .. } => "CONTENT_UNAVAILABLE",
            ZiError::Operator { .. } => "OPERATOR",
            ZiError::Connection { .. } => "CONNECTION",
            ZiError::Store { .. } => "STORE",
            ZiError::Scan { .. } => "SCAN",
            ZiError::Validation { .. } => "VALIDATION",
            ZiError::Io(_) => "IO",
            ZiError::Serde(_) => "SERDE",
            ZiError::Internal(_) => "INTERNAL",
        }
    }
}
