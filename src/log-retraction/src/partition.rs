// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Identifiers for log partitions and the upstream attempts that write them.

use std::fmt;

use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

/// The number of an epic within a single upstream attempt. Epics of one
/// attempt are numbered in increasing order.
pub type EpicNo = u64;

/// Identifies one partition of a log topic.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Arbitrary,
)]
pub struct PartitionKey {
    /// The topic the partition belongs to.
    pub topic: String,
    /// The index of the partition within its topic.
    pub partition: i32,
}

impl PartitionKey {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        PartitionKey {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// An opaque token naming one execution attempt of the job producing into the
/// log. Never parsed; only compared for equality and order.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Arbitrary,
)]
#[serde(transparent)]
pub struct UpstreamId(pub String);

impl UpstreamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UpstreamId {
    fn from(id: &str) -> Self {
        UpstreamId(id.to_string())
    }
}

impl From<String> for UpstreamId {
    fn from(id: String) -> Self {
        UpstreamId(id)
    }
}
