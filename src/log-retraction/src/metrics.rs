// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Prometheus monitoring metrics.

use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

/// Prometheus monitoring metrics for retraction tracking.
///
/// Counters are labelled by topic.
#[derive(Clone)]
pub struct RetractionMetrics {
    pub(crate) started: IntCounterVec,
    pub(crate) skipped: IntCounterVec,
    pub(crate) suspended: IntCounterVec,
    pub(crate) rows_inverted: IntCounterVec,
    pub(crate) ledger_pruned: IntCounterVec,
    pub(crate) ledger_entries: IntGauge,
}

impl std::fmt::Debug for RetractionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetractionMetrics").finish_non_exhaustive()
    }
}

impl RetractionMetrics {
    /// Returns a new [RetractionMetrics] instance connected to the given
    /// registry.
    pub fn register_with(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(RetractionMetrics {
            started: topic_counter(
                registry,
                "mz_log_retraction_started_count",
                "count of retractions started",
            )?,
            skipped: topic_counter(
                registry,
                "mz_log_retraction_skipped_count",
                "count of retraction requests for epics that were never read",
            )?,
            suspended: topic_counter(
                registry,
                "mz_log_retraction_suspended_count",
                "count of retractions suspended",
            )?,
            rows_inverted: topic_counter(
                registry,
                "mz_log_retraction_rows_inverted_count",
                "count of rows emitted with an inverted row kind",
            )?,
            ledger_pruned: topic_counter(
                registry,
                "mz_log_retraction_ledger_pruned_count",
                "count of epic start offsets pruned from the ledger",
            )?,
            ledger_entries: {
                let gauge = IntGauge::new(
                    "mz_log_retraction_ledger_entries",
                    "number of epic start offsets held in the ledger",
                )?;
                registry.register(Box::new(gauge.clone()))?;
                gauge
            },
        })
    }
}

fn topic_counter(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["topic"])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}
