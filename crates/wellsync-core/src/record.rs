//! Assessment record model.
//!
//! One record per `(owner, period)` holds the answered ratings for a
//! calendar month, a revision counter bumped on each local save, and the
//! save timestamp used for last-writer-wins reconciliation. The timestamp
//! travels inside the encrypted payload — the remote store never sees it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Lowest valid answer rating.
pub const MIN_RATING: u8 = 1;
/// Highest valid answer rating.
pub const MAX_RATING: u8 = 5;

/// Opaque identifier of the record owner, supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap a provider-supplied identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A calendar month identifying one assessment snapshot.
///
/// Wire form is `YYYY-MM` (e.g. `2024-03`), which also sorts
/// lexicographically in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    /// Create a period, validating the month.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidPeriod`] if `month` is not in `1..=12`.
    pub fn new(year: u16, month: u8) -> Result<Self, CodecError> {
        if !(1..=12).contains(&month) {
            return Err(CodecError::InvalidPeriod {
                value: format!("{year:04}-{month:02}"),
            });
        }
        Ok(Self { year, month })
    }

    /// The calendar year.
    #[must_use]
    pub fn year(&self) -> u16 {
        self.year
    }

    /// The calendar month, `1..=12`.
    #[must_use]
    pub fn month(&self) -> u8 {
        self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::InvalidPeriod {
            value: s.to_owned(),
        };
        let (year_str, month_str) = s.split_once('-').ok_or_else(invalid)?;
        // Digits only: `u16::parse` would accept a leading `+`, and a
        // parsed key must render back to exactly the input.
        if year_str.len() != 4
            || month_str.len() != 2
            || !year_str.bytes().all(|b| b.is_ascii_digit())
            || !month_str.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let year: u16 = year_str.parse().map_err(|_| invalid())?;
        let month: u8 = month_str.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// One monthly self-assessment snapshot.
///
/// `ratings` maps question identifiers to answers in `[1, 5]`. A `BTreeMap`
/// keeps the map sorted by key, which the codec relies on for canonical
/// encoding. Unanswered questions are simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssessmentRecord {
    /// Record owner.
    pub owner: OwnerId,
    /// Calendar month this snapshot covers.
    pub period: Period,
    /// Question identifier → rating in `[1, 5]`.
    pub ratings: BTreeMap<String, u8>,
    /// Monotonically increasing per local save.
    pub revision: u64,
    /// When this content was saved. Drives last-writer-wins.
    pub saved_at: DateTime<Utc>,
}

impl AssessmentRecord {
    /// Create a fresh, unsaved record (revision 0, saved now).
    #[must_use]
    pub fn new(owner: OwnerId, period: Period, ratings: BTreeMap<String, u8>) -> Self {
        Self {
            owner,
            period,
            ratings,
            revision: 0,
            saved_at: Utc::now(),
        }
    }

    /// Check that every rating is within `[1, 5]`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::RatingOutOfRange`] naming the first offending
    /// question.
    pub fn validate(&self) -> Result<(), CodecError> {
        for (question, &rating) in &self.ratings {
            if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                return Err(CodecError::RatingOutOfRange {
                    question: question.clone(),
                    rating,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn period_display_pads_month() {
        let period = Period::new(2024, 3).unwrap();
        assert_eq!(period.to_string(), "2024-03");
    }

    #[test]
    fn period_parses_wire_form() {
        let period: Period = "2024-12".parse().unwrap();
        assert_eq!(period.year(), 2024);
        assert_eq!(period.month(), 12);
    }

    #[test]
    fn period_rejects_month_zero_and_thirteen() {
        assert!(Period::new(2024, 0).is_err());
        assert!(Period::new(2024, 13).is_err());
        assert!("2024-00".parse::<Period>().is_err());
        assert!("2024-13".parse::<Period>().is_err());
    }

    #[test]
    fn period_rejects_fractional_and_garbage() {
        assert!("2024-3.5".parse::<Period>().is_err());
        assert!("2024-3".parse::<Period>().is_err());
        assert!("march 2024".parse::<Period>().is_err());
        assert!("2024".parse::<Period>().is_err());
    }

    #[test]
    fn period_rejects_signed_and_padded_components() {
        // `+124` is a valid u16 literal of length 4 but not a wire period;
        // accepting it would re-render as "0124" and diverge from the key.
        assert!("+124-03".parse::<Period>().is_err());
        assert!("2024-+3".parse::<Period>().is_err());
        assert!(" 124-03".parse::<Period>().is_err());
    }

    #[test]
    fn period_orders_chronologically() {
        let a: Period = "2023-12".parse().unwrap();
        let b: Period = "2024-01".parse().unwrap();
        let c: Period = "2024-02".parse().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn period_serde_uses_wire_string() {
        let period: Period = "2024-03".parse().unwrap();
        let json = serde_json::to_string(&period).unwrap();
        assert_eq!(json, "\"2024-03\"");
        let back: Period = serde_json::from_str(&json).unwrap();
        assert_eq!(back, period);
    }

    #[test]
    fn validate_rejects_out_of_range_rating() {
        let mut ratings = BTreeMap::new();
        ratings.insert("sleep_1".to_owned(), 6);
        let record = AssessmentRecord::new(
            OwnerId::new("alice"),
            Period::new(2024, 3).unwrap(),
            ratings,
        );
        assert!(matches!(
            record.validate(),
            Err(CodecError::RatingOutOfRange { rating: 6, .. })
        ));
    }

    #[test]
    fn validate_accepts_full_range() {
        let mut ratings = BTreeMap::new();
        for (i, rating) in (1..=5).enumerate() {
            ratings.insert(format!("q{i}"), rating);
        }
        let record = AssessmentRecord::new(
            OwnerId::new("alice"),
            Period::new(2024, 3).unwrap(),
            ratings,
        );
        assert!(record.validate().is_ok());
    }
}
