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

//! # Operators Module
//!
//! Bundled cleaning operators. Each is created by a factory registered under
//! its configuration name.
//!
//! ## Operator Categories
//!
//! - **text**: Text mappers (`HtmlTagCleaner`, `WhitespaceNormalizer`)
//! - **metadata**: Field stamping (`MetadataEnricher`)
//! - **filter**: Record filters (`FileSizeFilter`, `TextLengthFilter`, `FileTypeFilter`)

pub mod filter;
pub mod metadata;
pub mod text;

use serde_json::Value;

use crate::config::ZiParams;
use crate::errors::{Result, ZiError};
use crate::registry::{ZiOperatorFactory, ZiOperatorRegistry};

/// Registers every bundled operator.
pub fn register_defaults(registry: &mut ZiOperatorRegistry) {
    registry.register(
        "HtmlTagCleaner",
        text::html_tag_cleaner_factory as ZiOperatorFactory,
    );
    registry.register(
        "WhitespaceNormalizer",
        text::whitespace_normalizer_factory as ZiOperatorFactory,
    );
    registry.register(
        "MetadataEnricher",
        metadata::metadata_enricher_factory as ZiOperatorFactory,
    );
    registry.register(
        "FileSizeFilter",
        filter::file_size_filter_factory as ZiOperatorFactory,
    );
    registry.register(
        "TextLengthFilter",
        filter::text_length_filter_factory as ZiOperatorFactory,
    );
    registry.register(
        "FileTypeFilter",
        filter::file_type_filter_factory as ZiOperatorFactory,
    );
}

/// Reads an optional non-negative integer parameter.
pub(crate) fn param_u64(params: &ZiParams, operator: &str, key: &str) -> Result<Option<u64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number.as_u64().map(Some).ok_or_else(|| {
            ZiError::validation(format!("{operator} '{key}' must be a non-negative integer"))
        }),
        Some(Value::String(text)) => text.trim().parse().map(Some).map_err(|_| {
            ZiError::validation(format!("{operator} '{key}' must be a non-negative integer"))
        }),
        Some(_) => Err(ZiError::validation(format!(
            "{operator} '{key}' must be a non-negative integer"
        ))),
    }
}

/// Reads an optional boolean parameter.
pub(crate) fn param_bool(params: &ZiParams, operator: &str, key: &str) -> Result<Option<bool>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(ZiError::validation(format!("{operator} '{key}' must be a boolean"))),
        },
        Some(_) => Err(ZiError::validation(format!("{operator} '{key}' must be a boolean"))),
    }
}

/// Ensures `min <= max` when both bounds are configured.
pub(crate) fn check_range(operator: &str, min: u64, max: Option<u64>) -> Result<()> {
    match max {
        Some(max) if max < min => Err(ZiError::validation(format!(
            "{operator} upper bound {max} is below lower bound {min}"
        ))),
        _ => Ok(()),
    }
}
