//! Identifier types shared by the referral, data-collection and warehouse sides.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Family member's role as coded by the `demo_relation` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Proband,
    Mother,
    Father,
    Sibling,
    NonBiologicalMother,
    NonBiologicalFather,
    /// Any other coded relation, kept verbatim.
    Other(String),
}

impl Relation {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => Self::Proband,
            "2" => Self::Mother,
            "3" => Self::Father,
            "4" => Self::Sibling,
            "10" => Self::NonBiologicalMother,
            "11" => Self::NonBiologicalFather,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Proband => "1",
            Self::Mother => "2",
            Self::Father => "3",
            Self::Sibling => "4",
            Self::NonBiologicalMother => "10",
            Self::NonBiologicalFather => "11",
            Self::Other(code) => code,
        }
    }

    /// Individual number reserved for this role, if any.
    pub fn reserved_number(&self) -> Option<IndividualNumber> {
        match self {
            Self::Proband => Some(IndividualNumber::PROBAND),
            Self::Mother => Some(IndividualNumber::MOTHER),
            Self::Father => Some(IndividualNumber::FATHER),
            Self::NonBiologicalMother => Some(IndividualNumber::NON_BIO_MOTHER),
            Self::NonBiologicalFather => Some(IndividualNumber::NON_BIO_FATHER),
            Self::Sibling | Self::Other(_) => None,
        }
    }
}

/// Two-digit family member number (`01` proband, `02` mother, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndividualNumber(u32);

impl IndividualNumber {
    pub const PROBAND: Self = Self(1);
    pub const MOTHER: Self = Self(2);
    pub const FATHER: Self = Self(3);
    pub const NON_BIO_MOTHER: Self = Self(88);
    pub const NON_BIO_FATHER: Self = Self(99);
    /// Lowest number handed out to members without a reserved role.
    pub const FIRST_UNRESERVED: Self = Self(4);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub fn is_reserved(self) -> bool {
        matches!(self.0, 1 | 2 | 3 | 88 | 99)
    }

    /// Numbers 88 and 99 sit outside the sequential range.
    pub fn is_non_biological_parent(self) -> bool {
        matches!(self.0, 88 | 99)
    }
}

impl fmt::Display for IndividualNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for IndividualNumber {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // REDCap occasionally hands back numeric fields as floats ("4.0").
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| ModelError::InvalidIndividualNumber(s.to_string()))
    }
}

/// Family identifier `F` + two-digit year + four-digit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FNumber {
    year: u32,
    sequence: u32,
}

impl FNumber {
    pub const MAX_SEQUENCE: u32 = 9999;

    /// `year` may be a full year; only the last two digits are kept.
    pub fn new(year: i32, sequence: u32) -> Self {
        Self {
            year: year.rem_euclid(100) as u32,
            sequence,
        }
    }

    /// Two-digit year.
    pub fn year(&self) -> u32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Combined family + member identifier, e.g. `F190001-02`.
    pub fn individual_id(&self, number: IndividualNumber) -> String {
        format!("{self}-{number}")
    }
}

impl fmt::Display for FNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{:02}{:04}", self.year, self.sequence)
    }
}

impl FromStr for FNumber {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('F')
            .filter(|d| d.len() == 6 && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ModelError::InvalidFNumber(s.to_string()))?;
        let year = digits[..2]
            .parse()
            .map_err(|_| ModelError::InvalidFNumber(s.to_string()))?;
        let sequence = digits[2..]
            .parse()
            .map_err(|_| ModelError::InvalidFNumber(s.to_string()))?;
        Ok(Self { year, sequence })
    }
}
