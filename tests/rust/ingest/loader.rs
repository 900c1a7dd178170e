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

//! # Zirun Dataset Loader Tests
//!
//! Tests for availability retries, lazy line parsing and inline payloads.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test loader
//! ```

use std::io::{BufRead, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use zirun::config::ZiDatasetSource;
use zirun::errors::Result;
use zirun::ingest::{ZiDatasetLoader, ZiDatasetStorage};
use zirun::record::{keys, ZiRecord};
use zirun::ZiError;

const DATASET: &str = "{\"fileId\":\"1\",\"fileName\":\"a.txt\",\"fileType\":\"txt\",\"fileSize\":3}\n\
                       {\"fileId\":\"2\",\"fileName\":\"b.txt\",\"fileType\":\"txt\",\"fileSize\":4}\n";

/// Storage that only becomes readable on a given availability check.
#[derive(Debug)]
struct EventualStorage {
    available_on: u32,
    checks: AtomicU32,
}

impl EventualStorage {
    fn new(available_on: u32) -> Arc<Self> {
        Arc::new(EventualStorage {
            available_on,
            checks: AtomicU32::new(0),
        })
    }
}

impl ZiDatasetStorage for EventualStorage {
    fn is_available(&self, _path: &Path) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst) + 1 >= self.available_on
    }

    fn open(&self, _path: &Path) -> Result<Box<dyn BufRead + Send>> {
        Ok(Box::new(Cursor::new(DATASET.as_bytes().to_vec())))
    }
}

fn fast_loader(storage: Arc<EventualStorage>) -> ZiDatasetLoader {
    ZiDatasetLoader::new()
        .with_storage(storage)
        .with_delay_unit(Duration::from_millis(5))
}

fn collect(stream: zirun::distributed::ZiRecordStream) -> Vec<ZiRecord> {
    stream.collect::<Result<Vec<_>>>().unwrap()
}

/// Tests that a dataset appearing on the third check is loaded.
#[test]
fn test_available_on_third_attempt() {
    let storage = EventualStorage::new(3);
    let loader = fast_loader(Arc::clone(&storage));
    let started = Instant::now();

    let records = collect(
        loader
            .load(&ZiDatasetSource::Path(PathBuf::from("/sync/ds.jsonl")), "ds-1")
            .unwrap(),
    );

    assert_eq!(storage.checks.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_millis(15));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get_str(keys::SOURCE_FILE_ID), Some("1"));
    assert_eq!(records[1].dataset_id(), Some("ds-1"));
}

/// Tests that a dataset that never appears fails after five checks.
#[test]
fn test_never_available_fails_after_budget() {
    let storage = EventualStorage::new(u32::MAX);
    let loader = fast_loader(Arc::clone(&storage));

    let result = loader.load(&ZiDatasetSource::Path(PathBuf::from("/sync/missing.jsonl")), "ds");

    match result {
        Err(ZiError::DatasetUnavailable { path, attempts }) => {
            assert_eq!(path, "/sync/missing.jsonl");
            assert_eq!(attempts, 5);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected the dataset to be unavailable"),
    }
    assert_eq!(storage.checks.load(Ordering::SeqCst), 5);
}

/// Tests that the linear waits add up to 1+2+3+4 delay units.
#[test]
fn test_linear_delay_schedule() {
    let storage = EventualStorage::new(u32::MAX);
    let loader = fast_loader(storage);
    let started = Instant::now();
    assert!(loader.wait_for(Path::new("/nowhere")).is_err());
    assert!(started.elapsed() >= Duration::from_millis(50));
}

/// Tests that a six-check budget reaches a dataset the default budget misses.
#[test]
fn test_longer_budget_reaches_sixth_check() {
    let path = Path::new("/sync/late.jsonl");
    assert!(fast_loader(EventualStorage::new(6)).wait_for(path).is_err());

    let storage = EventualStorage::new(6);
    let loader = fast_loader(Arc::clone(&storage)).with_max_attempts(6);
    assert!(loader.wait_for(path).is_ok());
    assert_eq!(storage.checks.load(Ordering::SeqCst), 6);
}

/// Tests loading from a real file on disk.
#[test]
fn test_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.jsonl");
    std::fs::write(&path, DATASET).unwrap();

    let records = collect(
        ZiDatasetLoader::new()
            .load(&ZiDatasetSource::Path(path), "ds")
            .unwrap(),
    );
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].file_name(), "a.txt");
    assert_eq!(records[1].source_file_size(), Some(4));
}

/// Tests inline base64 payloads.
#[test]
fn test_inline_payload() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(DATASET);
    let records = collect(
        ZiDatasetLoader::new()
            .load(&ZiDatasetSource::Inline(encoded), "ds")
            .unwrap(),
    );
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.is_loaded()));
}

/// Tests that an invalid inline payload is rejected up front.
#[test]
fn test_inline_payload_must_be_base64() {
    assert!(ZiDatasetLoader::new()
        .load(&ZiDatasetSource::Inline("%%%".to_string()), "ds")
        .is_err());
}

/// Tests that a non-object line surfaces as a stream error.
#[test]
fn test_non_object_line_is_error() {
    let encoded = base64::engine::general_purpose::STANDARD.encode("[1,2]\n");
    let mut stream = ZiDatasetLoader::new()
        .load(&ZiDatasetSource::Inline(encoded), "ds")
        .unwrap();
    assert!(matches!(stream.next(), Some(Err(ZiError::Validation { .. }))));
}
