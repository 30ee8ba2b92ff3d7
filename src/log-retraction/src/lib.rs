// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Retraction tracking for changelog log sources.
//!
//! A changelog source reads row changes (inserts, deletes and the two halves
//! of updates) from a partitioned, offset-addressed log. The job producing
//! into the log writes in *epics*: numbered generations scoped to one
//! upstream attempt. When an attempt fails part way through an epic and asks
//! for it to be retracted, the rows of that epic the source already emitted
//! have to be cancelled before reading resumes, or their effects would be
//! applied twice.
//!
//! This crate holds the bookkeeping for that:
//!
//! * [`ledger::EpicStartLedger`] remembers where every epic started being
//!   read, so a retraction of an epic that was never read can be skipped.
//! * [`retraction::RetractionState`] tracks which partitions are retracting
//!   and where each retraction stops and forward reading resumes.
//! * [`row_kind::RowKind::invert`] turns a row into its own cancellation.
//! * [`reader::RetractingReader`] ties the above into a poll loop.
//!
//! All state is owned by a single reader instance and checkpointed through
//! [`checkpoint::RetractionSnapshot`] or per partition through
//! [`split::LogPartitionSplit`].

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod ledger;
pub mod marker;
pub mod metrics;
pub mod partition;
pub mod reader;
pub mod retraction;
pub mod row_kind;
pub mod split;

pub use crate::error::RetractionError;
pub use crate::partition::{EpicNo, PartitionKey, UpstreamId};
pub use crate::reader::{RetractingReader, RowAction};
pub use crate::retraction::{RetractingInfo, RetractionState, SuspendedRetraction};
pub use crate::row_kind::{ChangeRow, RowKind};
