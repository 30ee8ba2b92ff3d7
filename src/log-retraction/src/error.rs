// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Errors surfaced by retraction tracking.

use thiserror::Error;

use crate::partition::PartitionKey;

/// Errors for tracking and applying retractions.
#[derive(Error, Debug)]
pub enum RetractionError {
    /// The partition has no active retraction.
    #[error("the partition {partition} is not in retracting state")]
    NotRetracting {
        /// The partition that was queried or mutated.
        partition: PartitionKey,
    },
    /// A row kind encoding outside of insert, delete, update-before and
    /// update-after.
    #[error("unknown row kind: {0}")]
    UnknownRowKind(u8),
    /// Malformed input to an operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A checkpoint payload that could not be encoded or decoded.
    #[error("malformed retraction checkpoint: {0}")]
    Checkpoint(#[from] serde_json::Error),
}

impl RetractionError {
    /// Reports whether this error is a caller contract violation rather than
    /// a data integrity problem.
    pub fn is_not_retracting(&self) -> bool {
        matches!(self, RetractionError::NotRetracting { .. })
    }
}
