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

//! # Zirun Metadata Store Tests
//!
//! Tests for task status updates, result rows and file registration on the
//! SQLite backend.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test store
//! ```

use serde_json::Value;
use tempfile::TempDir;
use zirun::config::ZiStoreConfig;
use zirun::pipeline::ZiRecordOutcome;
use zirun::record::{keys, ZiRecord};
use zirun::store::{
    ZiCleanResult, ZiDatasetFile, ZiMetadataStore, ZiSqliteMetadataStore, ZiTaskStatus,
};
use zirun::ZiError;

fn open_store() -> (TempDir, ZiSqliteMetadataStore) {
    let dir = tempfile::Builder::new().prefix("ZIRUN").tempdir().unwrap();
    let config = ZiStoreConfig {
        db_path: dir.path().join("meta").join("zirun.db"),
        ..ZiStoreConfig::default()
    };
    (dir, ZiSqliteMetadataStore::from_config(&config))
}

fn file(dataset_id: &str, name: &str, size: u64) -> ZiDatasetFile {
    ZiDatasetFile {
        id: format!("id-{name}"),
        dataset_id: dataset_id.to_string(),
        file_name: name.to_string(),
        file_path: format!("/export/{dataset_id}/{name}"),
        file_type: "txt".to_string(),
        file_size: size,
        check_sum: None,
    }
}

/// Tests that the pool is opened lazily on the first statement.
#[test]
fn test_store_connects_lazily() {
    let (_dir, store) = open_store();
    assert!(!store.client().is_initialized());
    assert_eq!(store.task_status("missing").unwrap(), None);
    assert!(store.client().is_initialized());
}

/// Tests that update_result records status, totals and finish time.
#[test]
fn test_update_result_records_totals() {
    let (_dir, store) = open_store();
    store.update_result("ds", "task", ZiTaskStatus::Running).unwrap();
    let running = store.task_row("task").unwrap().unwrap();
    assert_eq!(running.status, ZiTaskStatus::Running);
    assert_eq!(running.finished_at, None);

    store
        .insert_dataset_files(&[file("ds", "a.txt", 10), file("ds", "b.txt", 32)])
        .unwrap();
    store.update_result("ds", "task", ZiTaskStatus::Completed).unwrap();

    let done = store.task_row("task").unwrap().unwrap();
    assert_eq!(done.status, ZiTaskStatus::Completed);
    assert_eq!((done.after_size, done.file_count), (42, 2));
    assert!(done.finished_at.is_some());
    assert_eq!(store.dataset_totals("ds").unwrap(), Some((42, 2)));
}

/// Tests that repeating an identical update leaves the stored state unchanged.
#[test]
fn test_update_result_is_idempotent() {
    let (_dir, store) = open_store();
    store.insert_dataset_files(&[file("ds", "a.txt", 7)]).unwrap();
    store.update_result("ds", "task", ZiTaskStatus::Completed).unwrap();
    let first = store.task_row("task").unwrap();

    std::thread::sleep(std::time::Duration::from_millis(1100));
    store.update_result("ds", "task", ZiTaskStatus::Completed).unwrap();

    assert_eq!(store.task_row("task").unwrap(), first);
    assert_eq!(store.dataset_totals("ds").unwrap(), Some((7, 1)));
}

/// Tests that a terminal status is never overwritten.
#[test]
fn test_terminal_status_is_final() {
    let (_dir, store) = open_store();
    store.update_result("ds", "task", ZiTaskStatus::Failed).unwrap();
    store.update_result("ds", "task", ZiTaskStatus::Running).unwrap();
    store.update_result("ds", "task", ZiTaskStatus::Completed).unwrap();

    assert_eq!(store.task_status("task").unwrap(), Some(ZiTaskStatus::Failed));
}

/// Tests that duplicate file paths are registered only once.
#[test]
fn test_dataset_files_are_deduplicated() {
    let (_dir, store) = open_store();
    let inserted = store
        .insert_dataset_files(&[file("ds", "a.txt", 1), file("ds", "b.txt", 2)])
        .unwrap();
    assert_eq!(inserted, 2);

    let mut again = file("ds", "a.txt", 1);
    again.id = "another-id".to_string();
    assert_eq!(store.insert_dataset_files(&[again]).unwrap(), 0);
    assert_eq!(store.insert_dataset_files(&[]).unwrap(), 0);

    let paths = store.existing_file_paths("ds").unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains("/export/ds/b.txt"));
    assert!(store.existing_file_paths("other").unwrap().is_empty());
}

/// Tests result rows for kept, filtered and failed records.
#[test]
fn test_clean_result_rows() {
    let (_dir, store) = open_store();
    let mut source = ZiRecord::default();
    source.set(keys::SOURCE_FILE_ID, "src-1");
    source.set(keys::SOURCE_FILE_NAME, "page.html");
    source.set(keys::SOURCE_FILE_TYPE, "html");
    source.set(keys::SOURCE_FILE_SIZE, 100);

    let mut kept = source.clone();
    kept.set(keys::FILE_ID, "dest-1");
    kept.set(keys::FILE_NAME, "page.txt");
    kept.set(keys::FILE_TYPE, "txt");
    kept.set(keys::FILE_SIZE, 60);

    let outcomes = [
        ZiRecordOutcome::Kept(kept),
        ZiRecordOutcome::Filtered {
            record: source.clone(),
            operator: "FileSizeFilter".to_string(),
        },
        ZiRecordOutcome::Failed {
            record: source,
            operator: "HtmlTagCleaner".to_string(),
            error: ZiError::operator("HtmlTagCleaner", "bad markup"),
        },
    ];
    for outcome in &outcomes {
        store
            .insert_clean_result(&ZiCleanResult::from_outcome("task", outcome))
            .unwrap();
    }

    let rows = store.clean_results("task").unwrap();
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0].status, "COMPLETED");
    assert_eq!((rows[0].src_size, rows[0].dest_size), (100, 60));
    assert_eq!(rows[0].dest_type, "txt");
    assert_eq!(rows[0].dest_file_id, "dest-1");

    assert_eq!(rows[1].status, "COMPLETED");
    assert_eq!(rows[1].dest_size, 0);
    assert_eq!(rows[1].dest_type, "");

    assert_eq!(rows[2].status, "FAILED");
    let result: Value = serde_json::from_str(&rows[2].result).unwrap();
    assert_eq!(result["op_name"], "HtmlTagCleaner");
    assert_eq!(result["error_code"], "OPERATOR");
    assert!(result["reason"].as_str().unwrap().contains("bad markup"));
}

/// Tests that an unusable database location surfaces as a connection error.
#[test]
fn test_unreachable_database_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let config = ZiStoreConfig {
        db_path: blocker.join("zirun.db"),
        max_retries: 2,
        base_delay: std::time::Duration::from_millis(1),
        ..ZiStoreConfig::default()
    };
    let store = ZiSqliteMetadataStore::from_config(&config);

    assert!(matches!(
        store.update_result("ds", "task", ZiTaskStatus::Running),
        Err(ZiError::Connection { .. })
    ));
}

/// Tests that a finished task keeps the dataset totals it finished with.
#[test]
fn test_terminal_task_keeps_dataset_totals() {
    let (_dir, store) = open_store();
    store.insert_dataset_files(&[file("ds", "a.txt", 7)]).unwrap();
    store.update_result("ds", "task", ZiTaskStatus::Completed).unwrap();
    assert_eq!(store.dataset_totals("ds").unwrap(), Some((7, 1)));

    store.insert_dataset_files(&[file("ds", "late.txt", 100)]).unwrap();
    store.update_result("ds", "task", ZiTaskStatus::Completed).unwrap();

    assert_eq!(store.dataset_totals("ds").unwrap(), Some((7, 1)));
    let row = store.task_row("task").unwrap().unwrap();
    assert_eq!((row.after_size, row.file_count), (7, 1));
}

/// Tests that registered files keep their checksum.
#[test]
fn test_dataset_files_keep_checksums() {
    let (_dir, store) = open_store();
    let mut hashed = file("ds", "a.txt", 3);
    hashed.check_sum = Some(blake3::hash(b"abc").to_hex().to_string());
    store.insert_dataset_files(&[hashed.clone(), file("ds", "b.txt", 1)]).unwrap();

    let files = store.dataset_files("ds").unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0], hashed);
    assert_eq!(files[1].check_sum, None);
}

/// Tests that statements reuse the pool instead of growing it.
#[test]
fn test_statements_share_one_pool() {
    let (_dir, store) = open_store();
    for n in 0..10 {
        store
            .update_result("ds", &format!("task-{n}"), ZiTaskStatus::Running)
            .unwrap();
    }
    let pool = store.client().pool().unwrap();
    assert_eq!(store.client().initializations(), 1);
    assert!(pool.size() >= 1);
    assert!(pool.size() <= store.client().options().max_connections());
}

/// Tests that an exhausted pool times out as a connection error and recovers.
#[test]
fn test_exhausted_pool_times_out() {
    let dir = tempfile::Builder::new().prefix("ZIRUN").tempdir().unwrap();
    let config = ZiStoreConfig {
        db_path: dir.path().join("zirun.db"),
        pool_size: 1,
        max_overflow: 0,
        pool_timeout: std::time::Duration::from_millis(200),
        max_retries: 1,
        ..ZiStoreConfig::default()
    };
    let store = ZiSqliteMetadataStore::from_config(&config);

    let held = store.client().create_connect().unwrap();
    assert!(matches!(
        store.task_status("task"),
        Err(ZiError::Connection { .. })
    ));

    drop(held);
    assert_eq!(store.task_status("task").unwrap(), None);
}
