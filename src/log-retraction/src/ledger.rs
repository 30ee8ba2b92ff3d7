// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The epic start-offset ledger.
//!
//! For every `(partition, upstream attempt, epic)` the reader has consumed
//! from, the ledger remembers the first log offset at which that epic was
//! observed. When an upstream attempt later asks for an epic to be
//! retracted, the ledger answers whether the epic was ever read at all and,
//! if so, where the read began.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::partition::{EpicNo, PartitionKey, UpstreamId};

/// Key of a ledger entry.
///
/// Keys order by partition, then upstream attempt, then epic number, so all
/// epics of one upstream attempt on one partition form a contiguous range
/// ordered numerically by epic.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Arbitrary,
)]
pub struct LedgerKey {
    pub partition: PartitionKey,
    pub upstream_id: UpstreamId,
    pub epic_no: EpicNo,
}

impl LedgerKey {
    pub fn new(partition: &PartitionKey, upstream_id: &UpstreamId, epic_no: EpicNo) -> Self {
        LedgerKey {
            partition: partition.clone(),
            upstream_id: upstream_id.clone(),
            epic_no,
        }
    }
}

/// A single ledger entry, as persisted in checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Arbitrary)]
pub struct LedgerEntry {
    pub key: LedgerKey,
    pub start_offset: u64,
}

/// Ordered record of the first-seen start offset of every epic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpicStartLedger {
    entries: BTreeMap<LedgerKey, u64>,
}

impl EpicStartLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `offset` as the start of the epic unless a start is already
    /// known, in which case the existing offset is kept.
    ///
    /// Returns whether the entry was inserted.
    pub fn record_start_if_absent(
        &mut self,
        partition: &PartitionKey,
        upstream_id: &UpstreamId,
        epic_no: EpicNo,
        offset: u64,
    ) -> bool {
        self.insert_if_absent(LedgerKey::new(partition, upstream_id, epic_no), offset)
    }

    pub(crate) fn insert_if_absent(&mut self, key: LedgerKey, offset: u64) -> bool {
        match self.entries.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(offset);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Returns the offset at which the epic started being read, if it was
    /// ever read.
    pub fn lookup_start(
        &self,
        partition: &PartitionKey,
        upstream_id: &UpstreamId,
        epic_no: EpicNo,
    ) -> Option<u64> {
        self.entries
            .get(&LedgerKey::new(partition, upstream_id, epic_no))
            .copied()
    }

    /// Removes every entry of `upstream_id` on `partition` whose epic is at
    /// or before `epic_no`. Entries of other upstream attempts are never
    /// touched, no matter how their ids compare.
    ///
    /// Returns the number of removed entries.
    pub fn prune_up_to(
        &mut self,
        partition: &PartitionKey,
        upstream_id: &UpstreamId,
        epic_no: EpicNo,
    ) -> usize {
        let lower = LedgerKey::new(partition, upstream_id, EpicNo::MIN);
        let upper = LedgerKey::new(partition, upstream_id, epic_no);
        let doomed: Vec<_> = self
            .entries
            .range(lower..=upper)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.entries.remove(key);
        }
        doomed.len()
    }

    /// Removes every entry of `partition`, returning how many were removed.
    pub fn remove_partition(&mut self, partition: &PartitionKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.partition != *partition);
        before - self.entries.len()
    }

    /// Iterates the `(upstream attempt, epic, start offset)` entries of one
    /// partition in key order.
    pub fn entries_for<'a>(
        &'a self,
        partition: &'a PartitionKey,
    ) -> impl Iterator<Item = (&'a UpstreamId, EpicNo, u64)> + 'a {
        let lower = LedgerKey::new(partition, &UpstreamId(String::new()), EpicNo::MIN);
        self.entries
            .range(lower..)
            .take_while(move |(key, _)| key.partition == *partition)
            .map(|(key, offset)| (&key.upstream_id, key.epic_no, *offset))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LedgerKey, u64)> {
        self.entries.iter().map(|(key, offset)| (key, *offset))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
