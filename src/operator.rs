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

//! # Zirun Operator Module
//!
//! This module defines the two operator capabilities a cleaning pipeline is
//! built from, and the per-record context that lazily loads file content.
//!
//! ## Operator Capabilities
//!
//! - [`ZiMapper`]: transforms a record in place. It may overwrite or drop any
//!   field, payload included.
//! - [`ZiFilter`]: inspects a record and rejects it by writing the empty
//!   payload sentinel ([`ZiRecord::reject`]). Rejection ends that record's
//!   chain; it is not an error.
//!
//! Both receive the record mutably together with a [`ZiRecordContext`].
//! Operators hold only their configured parameters and never share mutable
//! state, so the engine can process records on any worker.
//!
//! ## Lazy Content Loading
//!
//! Records arrive with metadata only. An operator that needs bytes or text
//! calls [`ZiRecordContext::read_file_first`]; the first call fetches the
//! content through the context's [`ZiContentLoader`], later calls in the same
//! chain see the populated record and do nothing.
//!
//! ```rust
//! use zirun::errors::Result;
//! use zirun::operator::{ZiMapper, ZiRecordContext};
//! use zirun::record::ZiRecord;
//!
//! #[derive(Debug)]
//! struct Uppercase;
//!
//! impl ZiMapper for Uppercase {
//!     fn name(&self) -> &str {
//!         "Uppercase"
//!     }
//!
//!     fn execute(&self, record: &mut ZiRecord, ctx: &ZiRecordContext<'_>) -> Result<()> {
//!         ctx.read_file_first(record)?;
//!         record.text = record.text.to_uppercase();
//!         Ok(())
//!     }
//! }
//! ```

use std::cell::Cell;
use std::fmt::Debug;
use std::path::Path;

use crate::errors::{Result, ZiError};
use crate::record::ZiRecord;

/// File types decoded into the record's text.
pub const TEXT_TYPES: &[&str] = &["txt", "md", "markdown", "xml", "html", "json", "jsonl", "csv"];

/// File types carried as raw image bytes.
pub const IMAGE_TYPES: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Coarse classification of a record's content by file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZiContentKind {
    Text,
    Image,
    Binary,
}

impl ZiContentKind {
    #[allow(non_snake_case)]
    pub fn of(file_type: &str) -> Self {
        let file_type = file_type.trim_start_matches('.').to_ascii_lowercase();
        if TEXT_TYPES.contains(&file_type.as_str()) {
            ZiContentKind::Text
        } else if IMAGE_TYPES.contains(&file_type.as_str()) {
            ZiContentKind::Image
        } else {
            ZiContentKind::Binary
        }
    }
}

/// Operator that transforms one record into one record.
pub trait ZiMapper: Debug + Send + Sync {
    /// Registered name, used in logs and failure reports.
    fn name(&self) -> &str;

    fn execute(&self, record: &mut ZiRecord, ctx: &ZiRecordContext<'_>) -> Result<()>;
}

/// Operator that may mark a record for exclusion.
pub trait ZiFilter: Debug + Send + Sync {
    /// Registered name, used in logs and failure reports.
    fn name(&self) -> &str;

    /// Inspects the record; rejection is signalled with [`ZiRecord::reject`].
    fn execute(&self, record: &mut ZiRecord, ctx: &ZiRecordContext<'_>) -> Result<()>;
}

/// Tagged operator variant produced by the registry.
#[derive(Debug)]
pub enum ZiOperatorKind {
    Mapper(Box<dyn ZiMapper>),
    Filter(Box<dyn ZiFilter>),
}

impl ZiOperatorKind {
    pub fn name(&self) -> &str {
        match self {
            ZiOperatorKind::Mapper(mapper) => mapper.name(),
            ZiOperatorKind::Filter(filter) => filter.name(),
        }
    }

    pub fn is_filter(&self) -> bool {
        matches!(self, ZiOperatorKind::Filter(_))
    }
}

/// Runs one operator and attaches its name to any error it raises.
///
/// Content errors keep their own variant so failure reports can tell a
/// missing file apart from an operator bug.
#[allow(non_snake_case)]
pub fn execute_operator(
    operator: &ZiOperatorKind,
    record: &mut ZiRecord,
    ctx: &ZiRecordContext<'_>,
) -> Result<()> {
    let outcome = match operator {
        ZiOperatorKind::Mapper(mapper) => mapper.execute(record, ctx),
        ZiOperatorKind::Filter(filter) => filter.execute(record, ctx),
    };
    outcome.map_err(|err| match err {
        ZiError::ContentUnavailable { .. } | ZiError::Operator { .. } => err,
        other => ZiError::operator(operator.name(), other.to_string()),
    })
}

/// Loaded content for one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZiContent {
    pub data: Vec<u8>,
    pub text: String,
}

/// Capability that fetches a record's content on demand.
pub trait ZiContentLoader: Debug + Send + Sync {
    fn load(&self, record: &ZiRecord) -> Result<ZiContent>;
}

/// Reads content from the record's `filePath` on the local filesystem.
///
/// Text types are decoded as UTF-8 into `text` (BOM stripped, CRLF folded),
/// everything else is kept as raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZiFileContentLoader;

impl ZiContentLoader for ZiFileContentLoader {
    fn load(&self, record: &ZiRecord) -> Result<ZiContent> {
        let path = record
            .file_path()
            .ok_or_else(|| ZiError::content(record.file_name(), "record has no filePath"))?;
        let bytes = std::fs::read(Path::new(path))
            .map_err(|err| ZiError::content(path, err.to_string()))?;

        match ZiContentKind::of(&record.file_type()) {
            ZiContentKind::Text => {
                let text = decode_text(bytes).map_err(|message| ZiError::content(path, message))?;
                Ok(ZiContent {
                    data: Vec::new(),
                    text,
                })
            }
            ZiContentKind::Image | ZiContentKind::Binary => Ok(ZiContent {
                data: bytes,
                text: String::new(),
            }),
        }
    }
}

fn decode_text(mut bytes: Vec<u8>) -> std::result::Result<String, String> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        bytes.drain(..3);
    }
    let text = String::from_utf8(bytes).map_err(|err| format!("invalid UTF-8: {err}"))?;
    Ok(if text.contains("\r\n") {
        text.replace("\r\n", "\n")
    } else {
        text
    })
}

/// Per-record processing context handed to every operator in the chain.
///
/// The context lives for exactly one record's chain; the loaded payload is
/// cached on the record itself, so the loader runs at most once per record.
#[derive(Debug)]
pub struct ZiRecordContext<'a> {
    loader: &'a dyn ZiContentLoader,
    loads: Cell<usize>,
}

impl<'a> ZiRecordContext<'a> {
    #[allow(non_snake_case)]
    pub fn new(loader: &'a dyn ZiContentLoader) -> Self {
        ZiRecordContext {
            loader,
            loads: Cell::new(0),
        }
    }

    /// Ensures the record's content is loaded, fetching it on first use.
    pub fn read_file_first(&self, record: &mut ZiRecord) -> Result<()> {
        if record.is_loaded() {
            return Ok(());
        }
        let content = self.loader.load(record)?;
        self.loads.set(self.loads.get() + 1);
        record.data = Some(content.data);
        if !content.text.is_empty() {
            record.text = content.text;
        }
        Ok(())
    }

    /// How many times this context fetched content.
    pub fn load_count(&self) -> usize {
        self.loads.get()
    }
}
