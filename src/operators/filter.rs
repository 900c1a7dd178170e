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

//! # Filter Operators
//!
//! Filters never drop a record themselves. They write the empty payload
//! sentinel and the engine stops that record's chain.

use serde_json::Value;

use crate::config::ZiParams;
use crate::errors::{Result, ZiError};
use crate::operator::{ZiFilter, ZiOperatorKind, ZiRecordContext};
use crate::operators::{check_range, param_u64};
use crate::record::ZiRecord;

/// Rejects records whose source file size falls outside `[minSize, maxSize]`.
///
/// Works from metadata alone; unknown sizes count as zero.
#[derive(Debug)]
pub struct ZiFileSizeFilter {
    min: u64,
    max: Option<u64>,
}

impl ZiFileSizeFilter {
    #[allow(non_snake_case)]
    pub fn new(min: u64, max: Option<u64>) -> Self {
        Self { min, max }
    }
}

impl ZiFilter for ZiFileSizeFilter {
    fn name(&self) -> &str {
        "FileSizeFilter"
    }

    fn execute(&self, record: &mut ZiRecord, _ctx: &ZiRecordContext<'_>) -> Result<()> {
        let size = record.source_file_size().unwrap_or(0);
        if size < self.min || self.max.is_some_and(|max| size > max) {
            record.reject();
        }
        Ok(())
    }
}

#[allow(non_snake_case)]
pub fn file_size_filter_factory(params: &ZiParams) -> Result<ZiOperatorKind> {
    let min = param_u64(params, "FileSizeFilter", "minSize")?.unwrap_or(1);
    let max = param_u64(params, "FileSizeFilter", "maxSize")?;
    check_range("FileSizeFilter", min, max)?;
    Ok(ZiOperatorKind::Filter(Box::new(ZiFileSizeFilter::new(min, max))))
}

/// Rejects records whose text length (in characters) falls outside the bounds.
#[derive(Debug)]
pub struct ZiTextLengthFilter {
    min: u64,
    max: Option<u64>,
}

impl ZiTextLengthFilter {
    #[allow(non_snake_case)]
    pub fn new(min: u64, max: Option<u64>) -> Self {
        Self { min, max }
    }
}

impl ZiFilter for ZiTextLengthFilter {
    fn name(&self) -> &str {
        "TextLengthFilter"
    }

    fn execute(&self, record: &mut ZiRecord, ctx: &ZiRecordContext<'_>) -> Result<()> {
        ctx.read_file_first(record)?;
        let length = record.text.chars().count() as u64;
        if length < self.min || self.max.is_some_and(|max| length > max) {
            record.reject();
        }
        Ok(())
    }
}

#[allow(non_snake_case)]
pub fn text_length_filter_factory(params: &ZiParams) -> Result<ZiOperatorKind> {
    let min = param_u64(params, "TextLengthFilter", "minLength")?.unwrap_or(1);
    let max = param_u64(params, "TextLengthFilter", "maxLength")?;
    check_range("TextLengthFilter", min, max)?;
    Ok(ZiOperatorKind::Filter(Box::new(ZiTextLengthFilter::new(min, max))))
}

/// Keeps only records whose file type is in the configured list.
#[derive(Debug)]
pub struct ZiFileTypeFilter {
    types: Vec<String>,
}

impl ZiFileTypeFilter {
    #[allow(non_snake_case)]
    pub fn new(types: Vec<String>) -> Self {
        let types = types
            .into_iter()
            .map(|t| t.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { types }
    }
}

impl ZiFilter for ZiFileTypeFilter {
    fn name(&self) -> &str {
        "FileTypeFilter"
    }

    fn execute(&self, record: &mut ZiRecord, _ctx: &ZiRecordContext<'_>) -> Result<()> {
        if !self.types.contains(&record.file_type()) {
            record.reject();
        }
        Ok(())
    }
}

#[allow(non_snake_case)]
pub fn file_type_filter_factory(params: &ZiParams) -> Result<ZiOperatorKind> {
    let types = params
        .get("types")
        .and_then(Value::as_array)
        .ok_or_else(|| ZiError::validation("FileTypeFilter requires array 'types'"))?;
    let types = types
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ZiError::validation("FileTypeFilter 'types' must hold strings"))
        })
        .collect::<Result<Vec<_>>>()?;
    if types.is_empty() {
        return Err(ZiError::validation("FileTypeFilter 'types' cannot be empty"));
    }
    Ok(ZiOperatorKind::Filter(Box::new(ZiFileTypeFilter::new(types))))
}
