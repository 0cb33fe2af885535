//! Canonical record codec.
//!
//! [`encode`] produces an order-independent byte form: ratings live in a
//! `BTreeMap` (keys sorted) and struct fields serialize in a fixed order, so
//! identical logical content always encodes identically. The encryption
//! layer depends on this — re-sealing unchanged data must authenticate the
//! same plaintext.
//!
//! [`decode`] is the exact inverse and re-validates the schema: a record
//! that decodes is guaranteed to have ratings in `[1, 5]` and a real
//! calendar month.

use crate::error::CodecError;
use crate::record::AssessmentRecord;

/// Encode a record to its canonical byte form.
///
/// # Errors
///
/// Returns [`CodecError::RatingOutOfRange`] if the record fails validation,
/// or [`CodecError::Encode`] if serialization fails.
pub fn encode(record: &AssessmentRecord) -> Result<Vec<u8>, CodecError> {
    record.validate()?;
    serde_json::to_vec(record).map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })
}

/// Decode a record from bytes produced by [`encode`].
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] on schema violations (missing or
/// unknown fields, wrong types, bad period) and
/// [`CodecError::RatingOutOfRange`] on ratings outside `[1, 5]`.
pub fn decode(bytes: &[u8]) -> Result<AssessmentRecord, CodecError> {
    let record: AssessmentRecord =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed {
            reason: e.to_string(),
        })?;
    record.validate()?;
    Ok(record)
}
