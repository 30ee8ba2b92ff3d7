// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Sniffing of the framed changelog record format.

use crate::error::RetractionError;

/// The three bytes every framed changelog record starts with.
pub const FORMAT_MAGIC: [u8; 3] = *b"CLG";

/// Reports whether `bytes` begins with [`FORMAT_MAGIC`].
///
/// This only distinguishes framed payloads from foreign payloads sharing the
/// same log; it does not validate anything past the marker. Payloads shorter
/// than the marker are rejected with [`RetractionError::InvalidArgument`].
pub fn has_valid_marker(bytes: &[u8]) -> Result<bool, RetractionError> {
    match bytes.get(..FORMAT_MAGIC.len()) {
        Some(prefix) => Ok(prefix == FORMAT_MAGIC),
        None => Err(RetractionError::InvalidArgument(format!(
            "record payload of {} bytes is shorter than the {} byte format marker",
            bytes.len(),
            FORMAT_MAGIC.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payloads_are_invalid() {
        assert!(matches!(
            has_valid_marker(&[]),
            Err(RetractionError::InvalidArgument(_))
        ));
        assert!(matches!(
            has_valid_marker(&[0x01, 0x02]),
            Err(RetractionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn marker_prefix() {
        assert!(has_valid_marker(&FORMAT_MAGIC).unwrap());

        let mut framed = FORMAT_MAGIC.to_vec();
        framed.extend_from_slice(b"{\"after\":1}");
        assert!(has_valid_marker(&framed).unwrap());

        for i in 0..FORMAT_MAGIC.len() {
            let mut foreign = framed.clone();
            foreign[i] = foreign[i].wrapping_add(1);
            assert!(!has_valid_marker(&foreign).unwrap());
        }
    }
}
