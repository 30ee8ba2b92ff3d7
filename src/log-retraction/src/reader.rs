// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Drives retraction tracking from a log reader's poll loop.
//!
//! The log client owns partition assignment and polling. For every record it
//! polls it tells the [`RetractingReader`] what it saw, and the reader
//! answers with what to do with the row:
//!
//! ```text
//! forward record of (upstream, epic)  -> observe_epic
//! upstream asks to retract an epic    -> on_epic_flip
//! row of a polled record              -> process_row -> Emit | Seek
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::{trace, warn};

use crate::checkpoint::RetractionSnapshot;
use crate::config::{RetractionConfig, SuspendPolicy};
use crate::error::RetractionError;
use crate::marker;
use crate::metrics::RetractionMetrics;
use crate::partition::{EpicNo, PartitionKey, UpstreamId};
use crate::retraction::{RetractingInfo, RetractionState, SuspendedRetraction};
use crate::row_kind::ChangeRow;
use crate::split::LogPartitionSplit;

/// What the poll loop should do with a row after
/// [`RetractingReader::process_row`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowAction {
    /// Emit the row as it now stands. During a retraction its kind has
    /// already been inverted.
    Emit,
    /// The retraction of the partition has finished. Drop the row and seek
    /// the partition to `offset`.
    Seek { offset: u64 },
}

/// Owns the retraction state of one log reader instance.
#[derive(Debug)]
pub struct RetractingReader {
    state: RetractionState,
    config: RetractionConfig,
    metrics: RetractionMetrics,
}

impl RetractingReader {
    pub fn new(config: RetractionConfig, metrics: RetractionMetrics) -> Self {
        RetractingReader {
            state: RetractionState::new(),
            config,
            metrics,
        }
    }

    /// Resumes a reader from a full checkpoint.
    pub fn from_checkpoint(
        config: RetractionConfig,
        metrics: RetractionMetrics,
        data: &[u8],
    ) -> Result<Self, RetractionError> {
        let snapshot = RetractionSnapshot::decode(data)?;
        let mut reader = Self::new(config, metrics);
        reader.state = RetractionState::from_snapshot(snapshot);
        reader.update_ledger_gauge();
        Ok(reader)
    }

    pub fn state(&self) -> &RetractionState {
        &self.state
    }

    /// Takes over a partition from the log client. Must be called before any
    /// record of the partition is processed.
    pub fn open_split(&mut self, split: &LogPartitionSplit) {
        self.state.restore_from_checkpoint(split);
        self.update_ledger_gauge();
    }

    /// Hands a partition back to the log client, returning its state as a
    /// split resuming at `next_offset`.
    pub fn close_split(&mut self, partition: &PartitionKey, next_offset: u64) -> LogPartitionSplit {
        let split = self.state.snapshot_split(partition, next_offset);
        self.state.release_partition(partition);
        self.update_ledger_gauge();
        split
    }

    /// The state of an open partition, for per-split checkpoints.
    pub fn snapshot_split(&self, partition: &PartitionKey, next_offset: u64) -> LogPartitionSplit {
        self.state.snapshot_split(partition, next_offset)
    }

    /// The encoded state of every open partition.
    pub fn checkpoint(&self) -> Result<Vec<u8>, RetractionError> {
        self.state.snapshot().encode()
    }

    /// Reports whether a polled payload is in the framed changelog format.
    ///
    /// Always true when marker checks are disabled.
    pub fn accept_payload(&self, payload: &[u8]) -> Result<bool, RetractionError> {
        if !self.config.check_marker {
            return Ok(true);
        }
        marker::has_valid_marker(payload)
    }

    /// Notes a record of `epic_no` read at `offset` while the partition reads
    /// forward. Records replayed during a retraction are not read forward and
    /// are ignored.
    pub fn observe_epic(
        &mut self,
        partition: &PartitionKey,
        upstream_id: &UpstreamId,
        epic_no: EpicNo,
        offset: u64,
    ) -> bool {
        if self.state.is_retracting(partition) {
            return false;
        }
        let recorded = self
            .state
            .record_epic_start(partition, upstream_id, epic_no, offset);
        if recorded {
            trace!(%partition, %upstream_id, epic_no, offset, "recorded epic start");
            self.update_ledger_gauge();
        }
        recorded
    }

    /// Handles an upstream attempt asking for `epic_no` to be retracted.
    /// Forward reading continues at `revert_starting_offset` once the
    /// retraction completes.
    pub fn on_epic_flip(
        &mut self,
        partition: &PartitionKey,
        upstream_id: &UpstreamId,
        epic_no: EpicNo,
        revert_starting_offset: u64,
    ) -> bool {
        let started =
            self.state
                .start_retraction(partition, upstream_id, epic_no, revert_starting_offset);
        let counter = if started {
            &self.metrics.started
        } else {
            &self.metrics.skipped
        };
        counter.with_label_values(&[partition.topic.as_str()]).inc();
        if started {
            self.update_ledger_gauge();
        }
        started
    }

    /// Partitions whose rows need inverting this poll cycle.
    pub fn retracting_partitions(&self) -> BTreeSet<PartitionKey> {
        self.state.retracting_partitions()
    }

    pub fn current_retraction(
        &self,
        partition: &PartitionKey,
    ) -> Result<&RetractingInfo, RetractionError> {
        self.state.current_retraction(partition)
    }

    /// Applies retraction to a row polled from `partition` at `offset`.
    ///
    /// Rows of a forward partition pass through untouched. Rows of a
    /// retracting partition before the stopping offset have their kind
    /// inverted. The first row at or past the stopping offset ends the
    /// retraction.
    pub fn process_row<R: ChangeRow>(
        &mut self,
        partition: &PartitionKey,
        offset: u64,
        row: &mut R,
    ) -> Result<RowAction, RetractionError> {
        let Some(info) = self.state.retraction(partition) else {
            return Ok(RowAction::Emit);
        };
        if offset >= info.retract_stopping_offset {
            let info = self.suspend_retraction(partition)?;
            let offset = info.map_or(offset, |info| info.revert_starting_offset);
            return Ok(RowAction::Seek { offset });
        }
        let kind = row.invert_row_kind();
        trace!(%partition, offset, %kind, "retracted row");
        self.metrics
            .rows_inverted
            .with_label_values(&[partition.topic.as_str()])
            .inc();
        Ok(RowAction::Emit)
    }

    /// Ends the retraction of `partition`.
    ///
    /// Under [`SuspendPolicy::Lenient`] suspending a forward partition is
    /// logged and returns `Ok(None)`; under [`SuspendPolicy::Strict`] it fails
    /// with [`RetractionError::NotRetracting`].
    pub fn suspend_retraction(
        &mut self,
        partition: &PartitionKey,
    ) -> Result<Option<RetractingInfo>, RetractionError> {
        match self.state.suspend_retraction(partition) {
            Ok(SuspendedRetraction { info, pruned }) => {
                let topic = [partition.topic.as_str()];
                self.metrics.suspended.with_label_values(&topic).inc();
                self.metrics
                    .ledger_pruned
                    .with_label_values(&topic)
                    .inc_by(u64::try_from(pruned).unwrap_or(u64::MAX));
                self.update_ledger_gauge();
                Ok(Some(info))
            }
            Err(err @ RetractionError::NotRetracting { .. })
                if self.config.suspend_policy == SuspendPolicy::Lenient =>
            {
                warn!(%partition, error = %err, "ignoring suspension of forward partition");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Ends the retraction of every given partition. A failure for one
    /// partition does not stop the others; every outcome is reported.
    pub fn suspend_retractions<I>(
        &mut self,
        partitions: I,
    ) -> BTreeMap<PartitionKey, Result<Option<RetractingInfo>, RetractionError>>
    where
        I: IntoIterator<Item = PartitionKey>,
    {
        let mut results = BTreeMap::new();
        for partition in partitions {
            let result = self.suspend_retraction(&partition);
            if let Err(err) = &result {
                warn!(%partition, error = %err, "failed to suspend retraction");
            }
            results.insert(partition, result);
        }
        results
    }

    fn update_ledger_gauge(&self) {
        self.metrics
            .ledger_entries
            .set(i64::try_from(self.state.ledger().len()).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::FORMAT_MAGIC;
    use crate::row_kind::RowKind;

    fn reader(config: RetractionConfig) -> RetractingReader {
        let metrics = RetractionMetrics::register_with(&prometheus::Registry::new()).unwrap();
        RetractingReader::new(config, metrics)
    }

    fn p() -> PartitionKey {
        PartitionKey::new("t", 0)
    }

    #[test]
    fn forward_rows_pass_through() {
        let mut reader = reader(RetractionConfig::default());
        let mut row = (RowKind::Insert, ());
        assert_eq!(reader.process_row(&p(), 5, &mut row).unwrap(), RowAction::Emit);
        assert_eq!(row.0, RowKind::Insert);
    }

    #[test]
    fn replayed_records_do_not_start_epics() {
        let u = UpstreamId::from("u");
        let mut reader = reader(RetractionConfig::default());
        assert!(reader.observe_epic(&p(), &u, 1, 10));
        assert!(!reader.observe_epic(&p(), &u, 1, 11));
        assert!(reader.on_epic_flip(&p(), &u, 1, 30));

        assert!(!reader.observe_epic(&p(), &u, 2, 12));
        assert_eq!(reader.state().ledger().lookup_start(&p(), &u, 2), None);
    }

    #[test]
    fn retraction_inverts_until_stop() {
        let u = UpstreamId::from("u");
        let mut reader = reader(RetractionConfig::default());
        reader.observe_epic(&p(), &u, 1, 10);
        reader.on_epic_flip(&p(), &u, 1, 30);

        let mut row = (RowKind::UpdateBefore, ());
        assert_eq!(reader.process_row(&p(), 9, &mut row).unwrap(), RowAction::Emit);
        assert_eq!(row.0, RowKind::UpdateAfter);

        let mut row = (RowKind::Insert, ());
        assert_eq!(
            reader.process_row(&p(), 10, &mut row).unwrap(),
            RowAction::Seek { offset: 30 }
        );
        assert_eq!(row.0, RowKind::Insert);
        assert!(reader.retracting_partitions().is_empty());
        assert!(reader.state().ledger().is_empty());

        let topic = ["t"];
        assert_eq!(reader.metrics.started.with_label_values(&topic).get(), 1);
        assert_eq!(reader.metrics.rows_inverted.with_label_values(&topic).get(), 1);
        assert_eq!(reader.metrics.suspended.with_label_values(&topic).get(), 1);
        assert_eq!(reader.metrics.ledger_pruned.with_label_values(&topic).get(), 1);
        assert_eq!(reader.metrics.ledger_entries.get(), 0);
    }

    #[test]
    fn superseding_flip_updates_ledger_gauge() {
        let u = UpstreamId::from("u");
        let mut reader = reader(RetractionConfig::default());
        reader.observe_epic(&p(), &u, 1, 10);
        reader.observe_epic(&p(), &u, 2, 20);
        assert!(reader.on_epic_flip(&p(), &u, 1, 30));
        assert!(reader.on_epic_flip(&p(), &u, 2, 40));
        assert_eq!(reader.metrics.ledger_entries.get(), 1);

        let mut row = (RowKind::Delete, ());
        assert_eq!(
            reader.process_row(&p(), 20, &mut row).unwrap(),
            RowAction::Seek { offset: 40 }
        );
        assert_eq!(reader.metrics.ledger_pruned.with_label_values(&["t"]).get(), 1);
        assert_eq!(reader.metrics.ledger_entries.get(), 0);
    }

    #[test]
    fn skipped_flip_is_counted() {
        let mut reader = reader(RetractionConfig::default());
        assert!(!reader.on_epic_flip(&p(), &"u".into(), 4, 30));
        assert_eq!(reader.metrics.skipped.with_label_values(&["t"]).get(), 1);
    }

    #[test]
    fn suspend_policy() {
        let mut strict = reader(RetractionConfig::default());
        assert!(strict.suspend_retraction(&p()).unwrap_err().is_not_retracting());

        let mut lenient = reader(RetractionConfig {
            suspend_policy: SuspendPolicy::Lenient,
            ..Default::default()
        });
        assert_eq!(lenient.suspend_retraction(&p()).unwrap(), None);
    }

    #[test]
    fn batch_suspend_reports_each_partition() {
        let u = UpstreamId::from("u");
        let (p0, p1) = (PartitionKey::new("t", 0), PartitionKey::new("t", 1));
        let mut reader = reader(RetractionConfig::default());
        reader.observe_epic(&p1, &u, 1, 10);
        reader.on_epic_flip(&p1, &u, 1, 20);

        let results = reader.suspend_retractions([p0.clone(), p1.clone()]);
        assert!(results[&p0].as_ref().unwrap_err().is_not_retracting());
        assert_eq!(
            results[&p1].as_ref().unwrap().as_ref().unwrap().revert_starting_offset,
            20
        );
    }

    #[test]
    fn payload_marker() {
        let checked = reader(RetractionConfig::default());
        assert!(checked.accept_payload(&FORMAT_MAGIC).unwrap());
        assert!(!checked.accept_payload(b"{}\n").unwrap());
        assert!(checked.accept_payload(b"{}").is_err());

        let unchecked = reader(RetractionConfig {
            check_marker: false,
            ..Default::default()
        });
        assert!(unchecked.accept_payload(b"").unwrap());
    }

    #[test]
    fn close_split_hands_back_state() {
        let u = UpstreamId::from("u");
        let mut reader = reader(RetractionConfig::default());
        reader.observe_epic(&p(), &u, 1, 10);
        reader.on_epic_flip(&p(), &u, 1, 20);

        let split = reader.close_split(&p(), 15);
        assert_eq!(split.starting_offset, 15);
        assert!(split.is_retracting());
        assert_eq!(split.epic_start_offsets.len(), 1);
        assert!(reader.state().ledger().is_empty());

        reader.open_split(&split);
        assert_eq!(reader.current_retraction(&p()).unwrap().revert_starting_offset, 20);
    }
}
