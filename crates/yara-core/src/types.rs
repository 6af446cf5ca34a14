//! Core type definitions for the Yara economy
//!
//! Amounts are integer smallest units, timestamps are UNIX seconds (UTC) and
//! multipliers are basis points, so every reward computation is exact.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, YaraError};

/// Token balance in smallest units
pub type Balance = u64;

/// UNIX timestamp in seconds (UTC)
pub type Timestamp = i64;

/// One YARA in smallest units (three decimal places)
pub const ONE_YARA: Balance = 1_000;

/// Seconds in one hour
pub const SECONDS_PER_HOUR: i64 = 3_600;

/// Seconds in one day
pub const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

/// Basis points in 100%
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Render a balance as whole tokens with three decimals, e.g. `3500.000`
pub fn format_balance(amount: Balance) -> String {
    format!("{}.{:03}", amount / ONE_YARA, amount % ONE_YARA)
}

/// Apply a basis-point share to an amount, rounding down
pub fn apply_bps(amount: Balance, bps: u32) -> Option<Balance> {
    let scaled = amount as u128 * bps as u128 / BPS_DENOMINATOR as u128;
    Balance::try_from(scaled).ok()
}

/// AccountId - stable opaque identity of a player account
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identity (uuid v4)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// TaskId - identifier of a task catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// ItemId - identifier of a shop catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// ReferralCode - fixed-length uppercase hex code shared with invitees
///
/// Immutable once assigned to an account; uniqueness is enforced by the store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferralCode(String);

impl ReferralCode {
    /// Code length in characters
    pub const LEN: usize = 8;

    /// Generate a random code
    pub fn generate() -> Self {
        let bytes: [u8; Self::LEN / 2] = rand::random();
        Self(hex::encode_upper(bytes))
    }

    /// Parse user input, accepting any letter case
    pub fn parse(input: &str) -> Result<Self> {
        let code = input.trim().to_ascii_uppercase();
        if code.len() != Self::LEN || !code.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(YaraError::InvalidReferral(format!(
                "malformed referral code: {input:?}"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReferralCode({})", self.0)
    }
}

impl fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reward multiplier in basis points (10_000 = 1.0x)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    /// Neutral multiplier
    pub const ONE: Self = Self(BPS_DENOMINATOR);

    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    /// Multipliers below 1.0x are never valid for accounts
    pub fn is_valid(&self) -> bool {
        self.0 >= BPS_DENOMINATOR
    }

    /// Scale an amount, rounding down; `None` on overflow
    pub fn apply(&self, amount: Balance) -> Option<Balance> {
        apply_bps(amount, self.0)
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / BPS_DENOMINATOR as f64
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x", self.as_f64())
    }
}
