// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The per-partition retraction state machine.
//!
//! Every partition is either reading forward or retracting. A partition
//! enters retracting mode when an upstream attempt asks for one of its epics
//! to be retracted *and* the [`EpicStartLedger`] shows that the epic was
//! actually read; otherwise there is nothing downstream to cancel. While
//! retracting, the reader replays the epic's interval with inverted row
//! kinds until it reaches [`RetractingInfo::retract_stopping_offset`], then
//! suspends the retraction and continues forward at
//! [`RetractingInfo::revert_starting_offset`].

use std::collections::{BTreeMap, BTreeSet};

use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RetractionError;
use crate::ledger::EpicStartLedger;
use crate::partition::{EpicNo, PartitionKey, UpstreamId};
use crate::split::{LogPartitionSplit, UpstreamEpicStart};

/// An in-flight retraction of one epic on one partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Arbitrary)]
pub struct RetractingInfo {
    /// The epic being retracted.
    pub epic_no: EpicNo,
    /// The upstream attempt that wrote the epic.
    pub upstream_id: UpstreamId,
    /// The offset the retracted epic started being read at. Cancellation
    /// runs up to, but not including, this offset.
    pub retract_stopping_offset: u64,
    /// The offset at which forward reading resumes once cancellation is
    /// complete.
    pub revert_starting_offset: u64,
}

/// A retraction that was ended by [`RetractionState::suspend_retraction`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuspendedRetraction {
    pub info: RetractingInfo,
    /// Number of ledger entries pruned when the retraction ended.
    pub pruned: usize,
}

/// Retraction bookkeeping for all partitions assigned to one reader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetractionState {
    pub(crate) ledger: EpicStartLedger,
    pub(crate) retracting: BTreeMap<PartitionKey, RetractingInfo>,
}

impl RetractionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &EpicStartLedger {
        &self.ledger
    }

    /// Notes that a record of the given epic was read at `offset`. Only the
    /// first call per epic has an effect.
    pub fn record_epic_start(
        &mut self,
        partition: &PartitionKey,
        upstream_id: &UpstreamId,
        epic_no: EpicNo,
        offset: u64,
    ) -> bool {
        self.ledger
            .record_start_if_absent(partition, upstream_id, epic_no, offset)
    }

    /// Rebuilds the state of the split's partition from a checkpointed
    /// split.
    ///
    /// Known epic starts are merged without overwriting existing entries. A
    /// retraction recorded in the split replaces whatever the partition was
    /// doing before.
    pub fn restore_from_checkpoint(&mut self, split: &LogPartitionSplit) {
        let partition = &split.partition;
        for start in &split.epic_start_offsets {
            self.ledger.record_start_if_absent(
                partition,
                &start.upstream_id,
                start.epic_no,
                start.start_offset,
            );
        }
        if let Some(info) = &split.retracting {
            info!(
                %partition,
                upstream_id = %info.upstream_id,
                epic_no = info.epic_no,
                retract_stopping_offset = info.retract_stopping_offset,
                revert_starting_offset = info.revert_starting_offset,
                "restored in-flight retraction",
            );
            self.retracting.insert(partition.clone(), info.clone());
        }
    }

    /// Starts retracting `epic_no` of `upstream_id` on `partition`.
    ///
    /// If the epic was never read there is nothing to cancel and this is a
    /// no-op. Otherwise any unfinished retraction of the partition is
    /// replaced and the ledger entries of the replaced retraction are pruned
    /// as if it had completed. Returns whether a retraction was started.
    pub fn start_retraction(
        &mut self,
        partition: &PartitionKey,
        upstream_id: &UpstreamId,
        epic_no: EpicNo,
        revert_starting_offset: u64,
    ) -> bool {
        let Some(retract_stopping_offset) =
            self.ledger.lookup_start(partition, upstream_id, epic_no)
        else {
            debug!(
                %partition,
                %upstream_id,
                epic_no,
                "epic was never read, skipping retraction",
            );
            return false;
        };

        let info = RetractingInfo {
            epic_no,
            upstream_id: upstream_id.clone(),
            retract_stopping_offset,
            revert_starting_offset,
        };
        if let Some(prev) = self.retracting.insert(partition.clone(), info) {
            let pruned = self
                .ledger
                .prune_up_to(partition, &prev.upstream_id, prev.epic_no);
            warn!(
                %partition,
                upstream_id = %prev.upstream_id,
                epic_no = prev.epic_no,
                pruned,
                "superseding unfinished retraction",
            );
        }
        info!(
            %partition,
            %upstream_id,
            epic_no,
            retract_stopping_offset,
            revert_starting_offset,
            "started retraction",
        );
        true
    }

    /// Returns the active retraction of `partition`.
    pub fn current_retraction(
        &self,
        partition: &PartitionKey,
    ) -> Result<&RetractingInfo, RetractionError> {
        self.retracting
            .get(partition)
            .ok_or_else(|| RetractionError::NotRetracting {
                partition: partition.clone(),
            })
    }

    /// Like [`Self::current_retraction`], for callers that treat a forward
    /// partition as nothing to do.
    pub fn retraction(&self, partition: &PartitionKey) -> Option<&RetractingInfo> {
        self.retracting.get(partition)
    }

    pub fn is_retracting(&self, partition: &PartitionKey) -> bool {
        self.retracting.contains_key(partition)
    }

    /// All partitions that are currently retracting.
    pub fn retracting_partitions(&self) -> BTreeSet<PartitionKey> {
        self.retracting.keys().cloned().collect()
    }

    /// Ends the retraction of `partition` and prunes the ledger entries of
    /// the retracted upstream attempt up to and including the retracted
    /// epic.
    ///
    /// Returns the retraction that ended along with the number of pruned
    /// entries.
    pub fn suspend_retraction(
        &mut self,
        partition: &PartitionKey,
    ) -> Result<SuspendedRetraction, RetractionError> {
        let info =
            self.retracting
                .remove(partition)
                .ok_or_else(|| RetractionError::NotRetracting {
                    partition: partition.clone(),
                })?;
        let pruned = self
            .ledger
            .prune_up_to(partition, &info.upstream_id, info.epic_no);
        info!(
            %partition,
            upstream_id = %info.upstream_id,
            epic_no = info.epic_no,
            revert_starting_offset = info.revert_starting_offset,
            pruned,
            "suspended retraction",
        );
        Ok(SuspendedRetraction { info, pruned })
    }

    /// Suspends the retraction of every given partition.
    ///
    /// A failure for one partition never prevents the others from being
    /// suspended; every outcome is reported.
    pub fn suspend_retractions<I>(
        &mut self,
        partitions: I,
    ) -> BTreeMap<PartitionKey, Result<SuspendedRetraction, RetractionError>>
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

    /// Forgets everything about a partition that is no longer assigned to
    /// this reader.
    pub fn release_partition(&mut self, partition: &PartitionKey) -> Option<RetractingInfo> {
        let removed = self.ledger.remove_partition(partition);
        let info = self.retracting.remove(partition);
        debug!(
            %partition,
            removed,
            was_retracting = info.is_some(),
            "released partition",
        );
        info
    }

    /// Captures the state of one partition as a split, the inverse of
    /// [`Self::restore_from_checkpoint`].
    pub fn snapshot_split(
        &self,
        partition: &PartitionKey,
        starting_offset: u64,
    ) -> LogPartitionSplit {
        LogPartitionSplit {
            partition: partition.clone(),
            starting_offset,
            retracting: self.retracting.get(partition).cloned(),
            epic_start_offsets: self
                .ledger
                .entries_for(partition)
                .map(|(upstream_id, epic_no, start_offset)| UpstreamEpicStart {
                    upstream_id: upstream_id.clone(),
                    epic_no,
                    start_offset,
                })
                .collect(),
        }
    }
}
