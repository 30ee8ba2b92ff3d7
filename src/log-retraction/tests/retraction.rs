// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Drives a [`RetractingReader`] through restarts of the producing job.

use mz_log_retraction::config::RetractionConfig;
use mz_log_retraction::metrics::RetractionMetrics;
use mz_log_retraction::split::LogPartitionSplit;
use mz_log_retraction::{
    ChangeRow, PartitionKey, RetractingReader, RetractionError, RowAction, RowKind, UpstreamId,
};
use prometheus::Registry;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    kind: RowKind,
}

impl ChangeRow for Row {
    fn row_kind(&self) -> RowKind {
        self.kind
    }

    fn set_row_kind(&mut self, kind: RowKind) {
        self.kind = kind;
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn metrics() -> RetractionMetrics {
    RetractionMetrics::register_with(&Registry::new()).unwrap()
}

fn reader() -> RetractingReader {
    RetractingReader::new(RetractionConfig::default(), metrics())
}

#[test]
fn restarted_epic_is_retracted_once() {
    init_logging();

    let p = PartitionKey::new("orders_changelog", 0);
    let job = UpstreamId::from("job-A");
    let mut reader = reader();
    reader.open_split(&LogPartitionSplit::new(p.clone(), 900));

    // Epic 1 is first read at offset 1000.
    assert!(reader.observe_epic(&p, &job, 1, 1000));
    assert!(!reader.observe_epic(&p, &job, 1, 1001));

    // Epic 2 was never read, so there is nothing to cancel.
    assert!(!reader.on_epic_flip(&p, &job, 2, 1500));
    assert!(reader.retracting_partitions().is_empty());

    assert!(reader.on_epic_flip(&p, &job, 1, 1500));
    assert_eq!(
        reader.retracting_partitions().into_iter().collect::<Vec<_>>(),
        vec![p.clone()]
    );
    let info = reader.current_retraction(&p).unwrap();
    assert_eq!(info.retract_stopping_offset, 1000);
    assert_eq!(info.revert_starting_offset, 1500);

    let kinds = [
        RowKind::Insert,
        RowKind::UpdateBefore,
        RowKind::UpdateAfter,
        RowKind::Delete,
    ];
    for (i, kind) in kinds.into_iter().enumerate() {
        let offset = 996 + u64::try_from(i).unwrap();
        let mut row = Row { kind };
        assert_eq!(
            reader.process_row(&p, offset, &mut row).unwrap(),
            RowAction::Emit
        );
        assert_eq!(row.kind, kind.invert());
    }

    let mut row = Row { kind: RowKind::Insert };
    assert_eq!(
        reader.process_row(&p, 1000, &mut row).unwrap(),
        RowAction::Seek { offset: 1500 }
    );
    assert!(reader.retracting_partitions().is_empty());
    assert_eq!(reader.state().ledger().lookup_start(&p, &job, 1), None);

    // Forward again: rows are left alone and new epics are recorded.
    let mut row = Row { kind: RowKind::Insert };
    assert_eq!(
        reader.process_row(&p, 1500, &mut row).unwrap(),
        RowAction::Emit
    );
    assert_eq!(row.kind, RowKind::Insert);
    assert!(reader.observe_epic(&p, &job, 2, 1500));
}

#[test]
fn retraction_survives_restart() {
    init_logging();

    let p = PartitionKey::new("orders_changelog", 3);
    let job = UpstreamId::from("job-A");
    let other = UpstreamId::from("job-A_retry");
    let mut reader = reader();
    reader.observe_epic(&p, &job, 7, 40);
    reader.observe_epic(&p, &other, 1, 45);
    reader.on_epic_flip(&p, &job, 7, 90);

    let mut row = Row { kind: RowKind::Delete };
    reader.process_row(&p, 20, &mut row).unwrap();
    assert_eq!(row.kind, RowKind::Insert);

    let data = reader.checkpoint().unwrap();
    let split = reader.snapshot_split(&p, 21);
    drop(reader);

    for mut restored in [
        RetractingReader::from_checkpoint(
            RetractionConfig::default(),
            metrics(),
            &data,
        )
        .unwrap(),
        {
            let mut reader = self::reader();
            reader.open_split(&split);
            reader
        },
    ] {
        let info = restored.current_retraction(&p).unwrap().clone();
        assert_eq!(info.epic_no, 7);
        assert_eq!(info.retract_stopping_offset, 40);

        let mut row = Row { kind: RowKind::UpdateAfter };
        restored.process_row(&p, 21, &mut row).unwrap();
        assert_eq!(row.kind, RowKind::UpdateBefore);

        assert_eq!(
            restored.process_row(&p, 40, &mut row).unwrap(),
            RowAction::Seek { offset: 90 }
        );
        let ledger = restored.state().ledger();
        assert_eq!(ledger.lookup_start(&p, &job, 7), None);
        assert_eq!(ledger.lookup_start(&p, &other, 1), Some(45));
    }
}

#[test]
fn corrupt_checkpoint_is_an_error() {
    let err = RetractingReader::from_checkpoint(
        RetractionConfig::default(),
        metrics(),
        b"{\"ledger\": 7}",
    )
    .unwrap_err();
    assert!(matches!(err, RetractionError::Checkpoint(_)));
}

#[test]
fn superseded_retraction_leaves_no_ledger_entries() {
    init_logging();

    let p = PartitionKey::new("t", 0);
    let (first, second) = (UpstreamId::from("u1"), UpstreamId::from("u2"));
    let mut reader = reader();
    reader.observe_epic(&p, &first, 1, 10);
    reader.observe_epic(&p, &second, 1, 20);

    assert!(reader.on_epic_flip(&p, &first, 1, 30));
    assert!(reader.on_epic_flip(&p, &second, 1, 40));

    let mut row = Row { kind: RowKind::Insert };
    assert_eq!(
        reader.process_row(&p, 20, &mut row).unwrap(),
        RowAction::Seek { offset: 40 }
    );
    assert!(reader.retracting_partitions().is_empty());
    assert!(reader.state().ledger().is_empty());
}
