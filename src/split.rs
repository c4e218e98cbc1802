//! Expense split calculator.
//!
//! Derives the amount every group member owes for a single expense, either
//! by dividing the total evenly or from per-member overrides, and checks
//! that overrides add up to the total before anything is submitted.
//!
//! Amounts are plain `f64` in the expense's currency. The equal split is the
//! raw binary64 quotient: no cent rounding and no remainder redistribution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Shares may differ from the total by at most this much and still pass.
pub const SPLIT_TOLERANCE: f64 = 0.01;

// Slack for binary64 noise so that a cent-exact 0.01 difference stays inside.
const TOLERANCE_SLACK: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Shares = BTreeMap<MemberId, f64>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    #[default]
    Equal,
    Custom,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SplitError {
    #[error("amount must be a positive number")]
    InvalidAmount,

    #[error("no group selected")]
    MissingGroup,

    #[error("shares add up to {:.2} but the expense is {:.2}", cents(.assigned), cents(.total))]
    SplitMismatch { total: f64, assigned: f64 },

    #[error("member {0} is not part of this split")]
    UnknownMember(MemberId),
}

impl SplitError {
    /// Excess (positive) or shortfall (negative) of the assigned shares.
    pub fn difference(&self) -> Option<f64> {
        match self {
            SplitError::SplitMismatch { total, assigned } => Some(assigned - total),
            _ => None,
        }
    }
}

/// Every member owes `total / members.len()`. Empty input gives an empty map.
pub fn compute_equal_split(total: f64, members: &[MemberId]) -> Shares {
    if members.is_empty() {
        return Shares::new();
    }
    let share = if total.is_finite() {
        total / members.len() as f64
    } else {
        0.0
    };
    members.iter().map(|member| (*member, share)).collect()
}

/// Returns `shares` with only `member` changed. Unusable amounts become 0.
pub fn set_custom_share(shares: &Shares, member: MemberId, amount: f64) -> Result<Shares, SplitError> {
    if !shares.contains_key(&member) {
        return Err(SplitError::UnknownMember(member));
    }
    let mut updated = shares.clone();
    updated.insert(member, sanitize_share(amount));
    Ok(updated)
}

/// `shares` is `None` while no group has been picked.
pub fn validate_split(total: f64, shares: Option<&Shares>) -> Result<(), SplitError> {
    if !total.is_finite() || total <= 0.0 {
        return Err(SplitError::InvalidAmount);
    }
    let shares = shares.ok_or(SplitError::MissingGroup)?;
    let assigned = assigned_total(shares);
    if (total - assigned).abs() - SPLIT_TOLERANCE <= TOLERANCE_SLACK {
        Ok(())
    } else {
        Err(SplitError::SplitMismatch { total, assigned })
    }
}

pub fn assigned_total(shares: &Shares) -> f64 {
    shares.values().sum()
}

/// Parses the expense total as typed into the form.
pub fn parse_total(input: &str) -> Result<f64, SplitError> {
    let total: f64 = input.trim().parse().map_err(|_| SplitError::InvalidAmount)?;
    if total.is_finite() && total > 0.0 {
        Ok(total)
    } else {
        Err(SplitError::InvalidAmount)
    }
}

/// Parses a custom share entry, falling back to 0 for anything unusable.
pub fn parse_share(input: &str) -> f64 {
    input.trim().parse().map(sanitize_share).unwrap_or(0.0)
}

fn sanitize_share(amount: f64) -> f64 {
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

/// For display only; never used by the split arithmetic.
pub fn round_to_cents(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

fn cents(n: &f64) -> f64 {
    round_to_cents(*n)
}
