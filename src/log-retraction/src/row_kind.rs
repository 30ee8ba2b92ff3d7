// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Row change kinds and their inversion.
//!
//! Replaying an interval with every row kind inverted cancels the effect the
//! interval had downstream: an insert becomes a delete, a delete becomes an
//! insert, and the two halves of an update swap places.

use std::fmt;

use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::error::RetractionError;

/// The change semantics carried by a single emitted row.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Arbitrary,
)]
pub enum RowKind {
    /// `+I`
    Insert,
    /// `-U`
    UpdateBefore,
    /// `+U`
    UpdateAfter,
    /// `-D`
    Delete,
}

impl RowKind {
    pub const ALL: [RowKind; 4] = [
        RowKind::Insert,
        RowKind::UpdateBefore,
        RowKind::UpdateAfter,
        RowKind::Delete,
    ];

    /// Returns the kind that cancels `self`.
    pub fn invert(self) -> RowKind {
        match self {
            RowKind::Insert => RowKind::Delete,
            RowKind::Delete => RowKind::Insert,
            RowKind::UpdateBefore => RowKind::UpdateAfter,
            RowKind::UpdateAfter => RowKind::UpdateBefore,
        }
    }

    /// The single byte this kind is encoded as on the wire.
    pub fn to_byte(self) -> u8 {
        match self {
            RowKind::Insert => 0,
            RowKind::UpdateBefore => 1,
            RowKind::UpdateAfter => 2,
            RowKind::Delete => 3,
        }
    }

    pub fn short_string(self) -> &'static str {
        match self {
            RowKind::Insert => "+I",
            RowKind::UpdateBefore => "-U",
            RowKind::UpdateAfter => "+U",
            RowKind::Delete => "-D",
        }
    }
}

impl TryFrom<u8> for RowKind {
    type Error = RetractionError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(RowKind::Insert),
            1 => Ok(RowKind::UpdateBefore),
            2 => Ok(RowKind::UpdateAfter),
            3 => Ok(RowKind::Delete),
            other => Err(RetractionError::UnknownRowKind(other)),
        }
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_string())
    }
}

/// Inverts a wire-encoded row kind.
///
/// Fails with [`RetractionError::UnknownRowKind`] for bytes outside of the
/// four known encodings.
pub fn invert_encoded(byte: u8) -> Result<u8, RetractionError> {
    Ok(RowKind::try_from(byte)?.invert().to_byte())
}

/// A row whose change kind can be read and rewritten in place.
pub trait ChangeRow {
    fn row_kind(&self) -> RowKind;

    fn set_row_kind(&mut self, kind: RowKind);

    /// Rewrites the row so that it cancels its former effect, returning the
    /// new kind.
    fn invert_row_kind(&mut self) -> RowKind {
        let inverted = self.row_kind().invert();
        self.set_row_kind(inverted);
        inverted
    }
}

impl<T> ChangeRow for (RowKind, T) {
    fn row_kind(&self) -> RowKind {
        self.0
    }

    fn set_row_kind(&mut self, kind: RowKind) {
        self.0 = kind;
    }
}
