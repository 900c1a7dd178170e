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

//! # Zirun Record Module
//!
//! ZiRecord is the unit of data flowing through a cleaning pipeline: one
//! source file described by a metadata line, plus whatever operators derive
//! from it.
//!
//! ## Payload States
//!
//! The byte payload (`data`) has three distinct states:
//!
//! - `None`: content has not been loaded yet; the first operator that needs it
//!   triggers the lazy load through its record context
//! - `Some(bytes)` with bytes or text present: loaded content
//! - `Some(empty)` with empty text: the rejection sentinel written by a Filter,
//!   meaning "exclude this record from the output"
//!
//! Absence is never rejection. Only the explicit empty sentinel is.
//!
//! ## Usage Example
//!
//! ```rust
//! use serde_json::json;
//! use zirun::record::{keys, ZiRecord};
//!
//! let mut record = ZiRecord::from_value(json!({
//!     "fileId": "f-1",
//!     "fileName": "a.txt",
//!     "fileType": "txt",
//!     "fileSize": 12,
//!     "filePath": "/data/a.txt"
//! })).unwrap();
//! record.normalize("ds-1");
//!
//! assert_eq!(record.get_str(keys::SOURCE_FILE_NAME), Some("a.txt"));
//! assert!(!record.is_loaded());
//! ```

use serde_json::{Map, Value};

use crate::errors::{Result, ZiError};

/// Well-known field names carried by cleaning records.
pub mod keys {
    pub const FILE_ID: &str = "fileId";
    pub const FILE_NAME: &str = "fileName";
    pub const FILE_TYPE: &str = "fileType";
    pub const FILE_SIZE: &str = "fileSize";
    pub const FILE_PATH: &str = "filePath";
    pub const CHECK_SUM: &str = "checkSum";
    pub const SOURCE_FILE_ID: &str = "sourceFileId";
    pub const SOURCE_FILE_NAME: &str = "sourceFileName";
    pub const SOURCE_FILE_TYPE: &str = "sourceFileType";
    pub const SOURCE_FILE_SIZE: &str = "sourceFileSize";
    pub const TOTAL_PAGE_NUM: &str = "totalPageNum";
    pub const EXTRA_FILE_PATH: &str = "extraFilePath";
    pub const EXTRA_FILE_TYPE: &str = "extraFileType";
    pub const DATASET_ID: &str = "dataset_id";
    pub const TARGET_TYPE: &str = "target_type";
    pub const TEXT: &str = "text";
    pub const DATA: &str = "data";
}

/// Open metadata map attached to every record.
pub type ZiMetadata = Map<String, Value>;

/// One logical item flowing through the operator chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZiRecord {
    /// Raw byte payload; `None` until loaded.
    pub data: Option<Vec<u8>>,
    /// Decoded text form used by text-oriented operators.
    pub text: String,
    /// Pass-through and derived metadata fields.
    pub fields: ZiMetadata,
}

impl ZiRecord {
    /// Constructs a record from a metadata map.
    #[allow(non_snake_case)]
    pub fn new(fields: ZiMetadata) -> Self {
        ZiRecord {
            data: None,
            text: String::new(),
            fields,
        }
    }

    /// Builds a record from one decoded metadata line.
    ///
    /// A string `text` entry becomes the record's text; any `data` entry is
    /// dropped since byte content is always loaded from `filePath`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(ZiError::validation(
                "dataset line must be a JSON object",
            ));
        };
        fields.remove(keys::DATA);
        let text = match fields.remove(keys::TEXT) {
            Some(Value::String(text)) => text,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Ok(ZiRecord {
            data: None,
            text,
            fields,
        })
    }

    /// Applies the loader's field normalization and stamps the dataset id.
    ///
    /// A `file*` field only overwrites its `sourceFile*` counterpart when it
    /// carries a value; an explicit `sourceFile*` from the line survives an
    /// empty or missing `file*`.
    pub fn normalize(&mut self, dataset_id: &str) {
        for (from, to) in [
            (keys::FILE_ID, keys::SOURCE_FILE_ID),
            (keys::FILE_NAME, keys::SOURCE_FILE_NAME),
            (keys::FILE_TYPE, keys::SOURCE_FILE_TYPE),
            (keys::FILE_SIZE, keys::SOURCE_FILE_SIZE),
        ] {
            match self.fields.get(from).filter(|value| has_value(value)) {
                Some(value) => {
                    let value = value.clone();
                    self.fields.insert(to.to_string(), value);
                }
                None => {
                    self.fields.entry(to.to_string()).or_insert(Value::Null);
                }
            }
        }
        if !self.fields.get(keys::TOTAL_PAGE_NUM).is_some_and(has_value) {
            self.fields
                .insert(keys::TOTAL_PAGE_NUM.to_string(), Value::from(0));
        }
        for key in [keys::EXTRA_FILE_PATH, keys::EXTRA_FILE_TYPE] {
            if !self.fields.get(key).is_some_and(has_value) {
                self.fields.insert(key.to_string(), Value::Null);
            }
        }
        self.fields.insert(
            keys::DATASET_ID.to_string(),
            Value::String(dataset_id.to_string()),
        );
    }

    /// Returns a string field, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Sets a metadata field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn file_name(&self) -> &str {
        self.get_str(keys::FILE_NAME).unwrap_or_default()
    }

    /// Lowercased file type without a leading dot.
    pub fn file_type(&self) -> String {
        self.get_str(keys::FILE_TYPE)
            .unwrap_or_default()
            .trim_start_matches('.')
            .to_ascii_lowercase()
    }

    pub fn file_path(&self) -> Option<&str> {
        self.get_str(keys::FILE_PATH).filter(|path| !path.is_empty())
    }

    pub fn dataset_id(&self) -> Option<&str> {
        self.get_str(keys::DATASET_ID)
    }

    /// Size of the original source file; accepts numeric or string values.
    pub fn source_file_size(&self) -> Option<u64> {
        size_value(self.fields.get(keys::SOURCE_FILE_SIZE)?)
    }

    /// Current file size field; accepts numeric or string values.
    pub fn file_size(&self) -> Option<u64> {
        size_value(self.fields.get(keys::FILE_SIZE)?)
    }

    /// Whether content has been loaded (or deliberately set) for this record.
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Marks the record for exclusion using the empty-payload sentinel.
    pub fn reject(&mut self) {
        self.data = Some(Vec::new());
        self.text.clear();
    }

    /// Whether the record carries the empty-payload rejection sentinel.
    pub fn is_empty_payload(&self) -> bool {
        matches!(&self.data, Some(bytes) if bytes.is_empty()) && self.text.is_empty()
    }

    /// Releases the payload after it has been written out.
    pub fn release_payload(&mut self) {
        self.data = None;
        self.text = String::new();
    }

    /// Flattens the record back into a single JSON object without byte content.
    pub fn to_value(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.insert(keys::TEXT.to_string(), Value::String(self.text.clone()));
        Value::Object(fields)
    }
}

/// Null, empty strings, zero and empty collections count as "no value".
fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn size_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
