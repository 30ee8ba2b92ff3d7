// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Checkpointing of the complete retraction state of a reader.

use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::error::RetractionError;
use crate::ledger::LedgerEntry;
use crate::partition::PartitionKey;
use crate::retraction::{RetractingInfo, RetractionState};

/// A retraction in flight on one partition, as persisted in checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Arbitrary)]
pub struct RetractingEntry {
    pub partition: PartitionKey,
    pub info: RetractingInfo,
}

/// A consistent copy of a reader's ledger and in-flight retractions.
///
/// Entries are written in key order, but decoding does not depend on it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Arbitrary)]
pub struct RetractionSnapshot {
    pub ledger: Vec<LedgerEntry>,
    pub retracting: Vec<RetractingEntry>,
}

impl RetractionSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, RetractionError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, RetractionError> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl RetractionState {
    /// Captures the full state at this instant.
    pub fn snapshot(&self) -> RetractionSnapshot {
        RetractionSnapshot {
            ledger: self
                .ledger
                .iter()
                .map(|(key, start_offset)| LedgerEntry {
                    key: key.clone(),
                    start_offset,
                })
                .collect(),
            retracting: self
                .retracting
                .iter()
                .map(|(partition, info)| RetractingEntry {
                    partition: partition.clone(),
                    info: info.clone(),
                })
                .collect(),
        }
    }

    /// Rebuilds a state from a snapshot.
    ///
    /// Should a snapshot name a ledger key or partition more than once, the
    /// first ledger entry and the last retraction win, the same as when the
    /// state was built live.
    pub fn from_snapshot(snapshot: RetractionSnapshot) -> Self {
        let mut state = RetractionState::new();
        for LedgerEntry { key, start_offset } in snapshot.ledger {
            state.ledger.insert_if_absent(key, start_offset);
        }
        state.retracting.extend(
            snapshot
                .retracting
                .into_iter()
                .map(|RetractingEntry { partition, info }| (partition, info)),
        );
        state
    }
}
