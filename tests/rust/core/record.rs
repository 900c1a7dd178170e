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

//! # Zirun Record Tests
//!
//! Tests for record construction, field normalization and the payload states.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test record
//! ```

use serde_json::{json, Value};
use zirun::record::{keys, ZiRecord};

/// Tests that normalization copies file fields into their source counterparts.
#[test]
fn test_normalize_copies_source_fields() {
    let mut record = ZiRecord::from_value(json!({
        "fileId": "f-1",
        "fileName": "a.html",
        "fileType": "html",
        "fileSize": 42,
        "filePath": "/data/a.html"
    }))
    .unwrap();
    record.normalize("ds-7");

    assert_eq!(record.get_str(keys::SOURCE_FILE_ID), Some("f-1"));
    assert_eq!(record.get_str(keys::SOURCE_FILE_NAME), Some("a.html"));
    assert_eq!(record.get_str(keys::SOURCE_FILE_TYPE), Some("html"));
    assert_eq!(record.source_file_size(), Some(42));
    assert_eq!(record.dataset_id(), Some("ds-7"));
    assert_eq!(record.fields[keys::TOTAL_PAGE_NUM], json!(0));
    assert_eq!(record.fields[keys::EXTRA_FILE_PATH], Value::Null);
}

/// Tests that missing file fields normalize to null rather than disappearing.
#[test]
fn test_normalize_missing_fields_become_null() {
    let mut record = ZiRecord::from_value(json!({"fileName": "x.txt", "totalPageNum": 3})).unwrap();
    record.normalize("ds");

    assert_eq!(record.fields[keys::SOURCE_FILE_ID], Value::Null);
    assert_eq!(record.source_file_size(), None);
    assert_eq!(record.fields[keys::TOTAL_PAGE_NUM], json!(3));
}

/// Tests that explicit source fields survive empty or missing file fields.
#[test]
fn test_normalize_keeps_existing_source_fields() {
    let mut record = ZiRecord::from_value(json!({
        "fileId": "",
        "fileName": "derived.txt",
        "fileSize": null,
        "sourceFileId": "orig-1",
        "sourceFileName": "orig.pdf",
        "sourceFileSize": 500,
        "totalPageNum": null,
        "extraFilePath": ""
    }))
    .unwrap();
    record.normalize("ds");

    assert_eq!(record.get_str(keys::SOURCE_FILE_ID), Some("orig-1"));
    assert_eq!(record.get_str(keys::SOURCE_FILE_NAME), Some("derived.txt"));
    assert_eq!(record.source_file_size(), Some(500));
    assert_eq!(record.fields[keys::SOURCE_FILE_TYPE], Value::Null);
    assert_eq!(record.fields[keys::TOTAL_PAGE_NUM], json!(0));
    assert_eq!(record.fields[keys::EXTRA_FILE_PATH], Value::Null);
}

/// Tests that non-object dataset lines are rejected.
#[test]
fn test_from_value_requires_object() {
    assert!(ZiRecord::from_value(json!(["a", "b"])).is_err());
    assert!(ZiRecord::from_value(json!("text")).is_err());
}

/// Tests that inline text is taken and inline data is dropped.
#[test]
fn test_from_value_takes_text_and_drops_data() {
    let record = ZiRecord::from_value(json!({"text": "hello", "data": "ignored"})).unwrap();

    assert_eq!(record.text, "hello");
    assert!(!record.fields.contains_key(keys::DATA));
    assert!(!record.is_loaded());
}

/// Tests the difference between an unloaded payload and the rejection sentinel.
#[test]
fn test_absent_payload_is_not_rejection() {
    let mut record = ZiRecord::default();
    assert!(!record.is_empty_payload());

    record.text = "content".to_string();
    record.reject();
    assert!(record.is_empty_payload());
    assert!(record.text.is_empty());

    record.release_payload();
    assert!(!record.is_loaded());
    assert!(!record.is_empty_payload());
}

/// Tests that sizes are read from numbers and numeric strings.
#[test]
fn test_sizes_accept_strings() {
    let mut record = ZiRecord::default();
    record.set(keys::FILE_SIZE, "128");
    record.set(keys::SOURCE_FILE_SIZE, json!(64.0));

    assert_eq!(record.file_size(), Some(128));
    assert_eq!(record.source_file_size(), Some(64));
}

/// Tests file type normalization.
#[test]
fn test_file_type_is_lowercase_without_dot() {
    let mut record = ZiRecord::default();
    record.set(keys::FILE_TYPE, ".HTML");
    assert_eq!(record.file_type(), "html");
}

/// Tests that flattening a record keeps fields and text but no bytes.
#[test]
fn test_to_value_flattens_text() {
    let mut record = ZiRecord::default();
    record.set("custom", 1);
    record.text = "body".to_string();
    record.data = Some(vec![1, 2, 3]);

    let value = record.to_value();
    assert_eq!(value["custom"], json!(1));
    assert_eq!(value["text"], json!("body"));
    assert!(value.get("data").is_none());
}
