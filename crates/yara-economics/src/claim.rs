//! # Base Claim
//!
//! The periodic "mining" claim: once per cooldown an account collects
//! `base_amount × balance_multiplier`. Every claim feeds the account's daily
//! earnings pool, which its referrer later harvests.

use serde::{Deserialize, Serialize};

use yara_core::prelude::*;

use crate::config::{ClaimConfig, ReferralConfig};
use crate::referral;

/// Outcome of a successful claim
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// Amount just credited
    pub amount: Balance,
    /// Balance after the credit
    pub new_balance: Balance,
    /// Earliest time of the next claim
    pub next_claim_at: Timestamp,
}

/// Reward for one claim given the account's balance multiplier
pub fn reward_amount(account: &Account, config: &ClaimConfig) -> Result<Balance> {
    account
        .balance_multiplier
        .apply(config.base_amount)
        .ok_or_else(|| YaraError::InvalidAmount("claim reward overflows".into()))
}

/// Earliest time the next claim is permitted, `None` if never claimed
pub fn next_claim_at(account: &Account, config: &ClaimConfig) -> Option<Timestamp> {
    cooldown::ready_at(account.last_claim_at, config.cooldown())
}

/// Informational mining rate: claim reward per hour, scaled by the mining multiplier
pub fn mining_rate_per_hour(account: &Account, config: &ClaimConfig) -> Balance {
    let hours = (config.cooldown_secs / SECONDS_PER_HOUR as u64).max(1);
    account
        .mining_multiplier
        .apply(config.base_amount / hours)
        .unwrap_or(Balance::MAX)
}

/// Apply the base claim to `account`
///
/// Fails with `NotReady` while the cooldown runs; the account is untouched
/// on any failure.
pub fn claim(
    account: &mut Account,
    config: &ClaimConfig,
    referral_config: &ReferralConfig,
    now: Timestamp,
) -> Result<ClaimReceipt> {
    cooldown::ensure_ready(account.last_claim_at, config.cooldown(), now)?;

    let amount = reward_amount(account, config)?;
    let mut updated = account.clone();
    let new_balance = updated.credit(amount)?;
    updated.last_claim_at = Some(now);
    referral::record_earnings(&mut updated, amount, referral_config.earnings_window(), now)?;
    *account = updated;

    Ok(ClaimReceipt {
        amount,
        new_balance,
        next_claim_at: cooldown::opens_at(now, config.cooldown()),
    })
}
