// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The per-partition split state exchanged with the log reader.

use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::partition::{EpicNo, PartitionKey, UpstreamId};
use crate::retraction::RetractingInfo;

/// The known start of one epic on the split's partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Arbitrary)]
pub struct UpstreamEpicStart {
    pub upstream_id: UpstreamId,
    pub epic_no: EpicNo,
    pub start_offset: u64,
}

/// Everything the log reader hands over when it opens a partition, and
/// everything it checkpoints for that partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Arbitrary)]
pub struct LogPartitionSplit {
    pub partition: PartitionKey,
    /// The offset the reader resumes the partition at.
    pub starting_offset: u64,
    /// The retraction that was in flight when the split was checkpointed.
    pub retracting: Option<RetractingInfo>,
    /// Epic starts already known for this partition.
    pub epic_start_offsets: Vec<UpstreamEpicStart>,
}

impl LogPartitionSplit {
    /// A split that has never been read from.
    pub fn new(partition: PartitionKey, starting_offset: u64) -> Self {
        LogPartitionSplit {
            partition,
            starting_offset,
            retracting: None,
            epic_start_offsets: Vec::new(),
        }
    }

    pub fn is_retracting(&self) -> bool {
        self.retracting.is_some()
    }
}
