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

//! # Zirun Pipeline Tests
//!
//! Tests for ordered chain execution, filter short-circuit, per-record
//! failure isolation and export of surviving records.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test pipeline
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use zirun::config::{ZiOperatorConfig, ZiParams};
use zirun::errors::Result;
use zirun::export::ZiFileExporter;
use zirun::operator::{ZiMapper, ZiOperatorKind, ZiRecordContext};
use zirun::operators::filter::ZiFileSizeFilter;
use zirun::pipeline::{ZiPipeline, ZiPipelineBuilder, ZiRecordOutcome, EXPORT_STAGE};
use zirun::record::{keys, ZiRecord};
use zirun::registry::ZiOperatorRegistry;
use zirun::ZiError;

/// Appends its tag to the record's `trace` field and counts invocations.
#[derive(Debug)]
struct Tag {
    tag: &'static str,
    calls: Arc<AtomicUsize>,
}

impl Tag {
    fn new(tag: &'static str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Tag {
                tag,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl ZiMapper for Tag {
    fn name(&self) -> &str {
        self.tag
    }

    fn execute(&self, record: &mut ZiRecord, _ctx: &ZiRecordContext<'_>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let trace = record.get_str("trace").unwrap_or_default().to_string();
        record.set("trace", format!("{trace}{}", self.tag));
        Ok(())
    }
}

#[derive(Debug)]
struct FailOn(&'static str);

impl ZiMapper for FailOn {
    fn name(&self) -> &str {
        "FailOn"
    }

    fn execute(&self, record: &mut ZiRecord, _ctx: &ZiRecordContext<'_>) -> Result<()> {
        if record.file_name() == self.0 {
            return Err(ZiError::validation("unparseable content"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Blank;

impl ZiMapper for Blank {
    fn name(&self) -> &str {
        "Blank"
    }

    fn execute(&self, record: &mut ZiRecord, _ctx: &ZiRecordContext<'_>) -> Result<()> {
        record.data = Some(Vec::new());
        record.text.clear();
        Ok(())
    }
}

fn loaded(name: &str, size: u64) -> ZiRecord {
    let mut record = ZiRecord::default();
    record.set(keys::FILE_NAME, name);
    record.set(keys::FILE_TYPE, "txt");
    record.set(keys::SOURCE_FILE_SIZE, size);
    record.data = Some(Vec::new());
    record.text = format!("content of {name}");
    record
}

/// Tests that operators run strictly in configured order.
#[test]
fn test_operators_run_in_order() {
    let (a, _) = Tag::new("A");
    let (b, _) = Tag::new("B");
    let (c, _) = Tag::new("C");
    let pipeline = ZiPipeline::new(vec![
        ZiOperatorKind::Mapper(Box::new(a)),
        ZiOperatorKind::Mapper(Box::new(b)),
        ZiOperatorKind::Mapper(Box::new(c)),
    ]);

    assert_eq!(pipeline.operator_names(), ["A", "B", "C"]);
    match pipeline.process_record(loaded("r.txt", 1)) {
        ZiRecordOutcome::Kept(record) => assert_eq!(record.get_str("trace"), Some("ABC")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

/// Tests the size-filter scenario: 40 of 100 records have size zero, so the
/// last mapper runs 60 times and 60 records survive.
#[test]
fn test_filter_short_circuits_chain() {
    let (a, a_calls) = Tag::new("A");
    let (c, c_calls) = Tag::new("C");
    let pipeline = ZiPipeline::new(vec![
        ZiOperatorKind::Mapper(Box::new(a)),
        ZiOperatorKind::Filter(Box::new(ZiFileSizeFilter::new(1, None))),
        ZiOperatorKind::Mapper(Box::new(c)),
    ]);

    let mut kept = 0;
    let mut filtered = 0;
    for i in 0..100u64 {
        let size = if i % 5 < 2 { 0 } else { 10 + i };
        match pipeline.process_record(loaded(&format!("r{i}.txt"), size)) {
            ZiRecordOutcome::Kept(record) => {
                assert_eq!(record.get_str("trace"), Some("AC"));
                kept += 1;
            }
            ZiRecordOutcome::Filtered { record, operator } => {
                assert_eq!(operator, "FileSizeFilter");
                assert_eq!(record.get_str("trace"), Some("A"));
                filtered += 1;
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!((kept, filtered), (60, 40));
    assert_eq!(a_calls.load(Ordering::SeqCst), 100);
    assert_eq!(c_calls.load(Ordering::SeqCst), 60);
}

/// Tests that a failing record does not affect the others.
#[test]
fn test_operator_error_is_isolated() {
    let (after, after_calls) = Tag::new("After");
    let pipeline = ZiPipeline::new(vec![
        ZiOperatorKind::Mapper(Box::new(FailOn("bad.txt"))),
        ZiOperatorKind::Mapper(Box::new(after)),
    ]);

    let outcomes: Vec<ZiRecordOutcome> = ["a.txt", "bad.txt", "c.txt"]
        .iter()
        .map(|name| pipeline.run_record(loaded(name, 1)))
        .collect();

    assert!(outcomes[0].is_kept());
    assert!(outcomes[2].is_kept());
    match &outcomes[1] {
        ZiRecordOutcome::Failed { operator, error, .. } => {
            assert_eq!(operator, "FailOn");
            assert_eq!(error.code(), "OPERATOR");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(after_calls.load(Ordering::SeqCst), 2);
}

/// Tests that a mapper emptying the payload drops the record at chain end.
#[test]
fn test_empty_payload_after_mappers_is_filtered() {
    let (tail, tail_calls) = Tag::new("Tail");
    let pipeline = ZiPipeline::new(vec![
        ZiOperatorKind::Mapper(Box::new(Blank)),
        ZiOperatorKind::Mapper(Box::new(tail)),
    ]);

    match pipeline.process_record(loaded("r.txt", 1)) {
        ZiRecordOutcome::Filtered { operator, .. } => assert_eq!(operator, "Tail"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(tail_calls.load(Ordering::SeqCst), 1);
}

/// Tests that surviving records are written and described by their new file fields.
#[test]
fn test_surviving_records_are_exported() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ZiPipeline::new(vec![ZiOperatorKind::Filter(Box::new(
        ZiFileSizeFilter::new(1, None),
    ))])
    .with_exporter(ZiFileExporter::new(dir.path()));

    let kept = pipeline.process_record(loaded("notes.txt", 5));
    let dropped = pipeline.process_record(loaded("empty.txt", 0));

    let ZiRecordOutcome::Kept(record) = kept else {
        panic!("expected kept record");
    };
    let path = dir.path().join("notes.txt");
    let expected = path.to_string_lossy().into_owned();
    assert_eq!(record.file_path(), Some(expected.as_str()));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "content of notes.txt");
    assert_eq!(record.file_size(), Some(20));
    assert!(!record.is_loaded());
    assert!(!dropped.is_kept());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

/// Tests that a write failure becomes a per-record export failure.
#[test]
fn test_export_failure_is_per_record() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ZiPipeline::new(Vec::new())
        .with_exporter(ZiFileExporter::new(dir.path().join("missing")));

    match pipeline.process_record(loaded("r.txt", 1)) {
        ZiRecordOutcome::Failed { operator, .. } => assert_eq!(operator, EXPORT_STAGE),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

/// Tests that the builder resolves configured steps through the registry.
#[test]
fn test_builder_resolves_registry() {
    let registry = ZiOperatorRegistry::with_defaults();
    let steps = vec![
        ZiOperatorConfig::new("HtmlTagCleaner", ZiParams::new()),
        ZiOperatorConfig::new("FileSizeFilter", ZiParams::new()),
    ];
    let pipeline = ZiPipelineBuilder::new(&registry).build(&steps).unwrap();
    assert_eq!(pipeline.operator_names(), ["HtmlTagCleaner", "FileSizeFilter"]);

    let unknown = vec![ZiOperatorConfig::new("Missing", ZiParams::new())];
    assert!(matches!(
        ZiPipelineBuilder::new(&registry).build(&unknown),
        Err(ZiError::UnsupportedOperator { .. })
    ));
}

/// Tests that a pipeline can be shared as a task across threads.
#[test]
fn test_into_task_is_shareable() {
    let (a, calls) = Tag::new("A");
    let task = Arc::new(ZiPipeline::new(vec![ZiOperatorKind::Mapper(Box::new(a))])).into_task();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let task = Arc::clone(&task);
            std::thread::spawn(move || task(loaded(&format!("t{i}.txt"), 1)).is_kept())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
