// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Configuration of a [`RetractingReader`](crate::reader::RetractingReader).

use serde::{Deserialize, Serialize};

use crate::error::RetractionError;

/// How to treat a request to suspend the retraction of a partition that is
/// not retracting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendPolicy {
    /// Report the request as an error.
    #[default]
    Strict,
    /// Log the request and carry on.
    Lenient,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetractionConfig {
    pub suspend_policy: SuspendPolicy,
    /// Whether payloads must start with the format marker before they are
    /// handed to deserialization.
    pub check_marker: bool,
}

impl Default for RetractionConfig {
    fn default() -> Self {
        RetractionConfig {
            suspend_policy: SuspendPolicy::default(),
            check_marker: true,
        }
    }
}

impl RetractionConfig {
    /// Parses a configuration, filling in defaults for missing fields.
    pub fn from_json(data: &str) -> Result<Self, RetractionError> {
        serde_json::from_str(data).map_err(|e| {
            RetractionError::InvalidArgument(format!("invalid retraction config: {e}"))
        })
    }
}
