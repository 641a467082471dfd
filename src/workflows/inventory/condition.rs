//! Compiles the human-readable rule strings of the criteria catalog
//! (`"37 à 72 Jours"`, `"<20"`, `">=516 & <688"`, `"Non"`) into predicates.
//!
//! Shapes are recognised in a fixed priority order and only unsigned integer
//! literals are extracted, so decimals and negative bounds are not supported.

use super::domain::{CellValue, ComparisonError};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Separator of the closed-range shape in the catalog's locale.
const RANGE_TOKEN: &str = "à";

static INTEGER_PATTERN: OnceLock<Regex> = OnceLock::new();

fn integers(raw: &str) -> Vec<f64> {
    INTEGER_PATTERN
        .get_or_init(|| Regex::new(r"\d+").expect("integer pattern is valid"))
        .find_iter(raw)
        .filter_map(|found| found.as_str().parse::<f64>().ok())
        .collect()
}

/// Executable form of a specification string.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `>=a & <b`: `a <= v < b`.
    HalfOpenRange { lower: f64, upper: f64 },
    /// `a à b`: `a <= v <= b`.
    ClosedRange { lower: f64, upper: f64 },
    AtLeast(f64),
    Below(f64),
    Above(f64),
    /// Case-insensitive, trimmed text equality.
    Equals(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("range condition '{condition}' needs exactly two bounds, found {found}")]
    MalformedRange { condition: String, found: usize },
    #[error("comparison condition '{condition}' has no numeric threshold")]
    MissingThreshold { condition: String },
}

impl Condition {
    pub fn compile(raw: &str) -> Result<Self, ConditionError> {
        let condition = raw.trim();

        if condition.contains(">=") && condition.contains('<') && condition.contains('&') {
            return match integers(condition).as_slice() {
                [lower, upper] => Ok(Self::HalfOpenRange {
                    lower: *lower,
                    upper: *upper,
                }),
                other => Err(ConditionError::MalformedRange {
                    condition: condition.to_string(),
                    found: other.len(),
                }),
            };
        }

        if condition.contains(RANGE_TOKEN) {
            // Free text may contain the token too; only two bounds make a range.
            if let [lower, upper] = integers(condition).as_slice() {
                return Ok(Self::ClosedRange {
                    lower: *lower,
                    upper: *upper,
                });
            }
        }

        if let Some(rest) = condition.strip_prefix(">=") {
            return first_threshold(condition, rest).map(Self::AtLeast);
        }
        if let Some(rest) = condition.strip_prefix('<') {
            return first_threshold(condition, rest).map(Self::Below);
        }
        if let Some(rest) = condition.strip_prefix('>') {
            return first_threshold(condition, rest).map(Self::Above);
        }

        Ok(Self::Equals(condition.to_lowercase()))
    }

    /// Evaluates the condition. Threshold shapes fail on values without a
    /// numeric reading; callers treat that as "no match".
    pub fn matches(&self, value: &CellValue) -> Result<bool, ComparisonError> {
        match self {
            Condition::HalfOpenRange { lower, upper } => {
                let v = value.as_number()?;
                Ok(*lower <= v && v < *upper)
            }
            Condition::ClosedRange { lower, upper } => {
                let v = value.as_number()?;
                Ok(*lower <= v && v <= *upper)
            }
            Condition::AtLeast(threshold) => Ok(value.as_number()? >= *threshold),
            Condition::Below(threshold) => Ok(value.as_number()? < *threshold),
            Condition::Above(threshold) => Ok(value.as_number()? > *threshold),
            Condition::Equals(expected) => {
                Ok(value.to_string().trim().to_lowercase() == *expected)
            }
        }
    }
}

fn first_threshold(condition: &str, rest: &str) -> Result<f64, ConditionError> {
    integers(rest)
        .first()
        .copied()
        .ok_or_else(|| ConditionError::MissingThreshold {
            condition: condition.to_string(),
        })
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::HalfOpenRange { lower, upper } => write!(f, "{lower} <= v < {upper}"),
            Condition::ClosedRange { lower, upper } => write!(f, "{lower} <= v <= {upper}"),
            Condition::AtLeast(threshold) => write!(f, "v >= {threshold}"),
            Condition::Below(threshold) => write!(f, "v < {threshold}"),
            Condition::Above(threshold) => write!(f, "v > {threshold}"),
            Condition::Equals(expected) => write!(f, "v == '{expected}'"),
        }
    }
}
