//! # Daily Cipher
//!
//! One secret phrase per cipher day. A cipher day starts at the configured
//! UTC reset hour (12:00 by default). Solving credits a bonus once and locks
//! the account until the next reset boundary; stale "solved" flags are
//! cleared lazily by [`expire`], driven by the bounded sweep in the service
//! layer.

use serde::{Deserialize, Serialize};

use yara_core::prelude::*;

use crate::config::{CipherConfig, ReferralConfig};
use crate::referral;

/// Outcome of a correct solution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherReceipt {
    pub bonus: Balance,
    pub new_balance: Balance,
    /// When the next cipher unlocks
    pub next_cipher_at: Timestamp,
}

fn reset_offset(reset_hour_utc: u32) -> i64 {
    reset_hour_utc as i64 * SECONDS_PER_HOUR
}

/// Next reset boundary strictly after `now`
///
/// Today's boundary if it is still ahead, otherwise tomorrow's.
pub fn next_boundary(now: Timestamp, reset_hour_utc: u32) -> Timestamp {
    let midnight = now.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY;
    let today = midnight + reset_offset(reset_hour_utc);
    if today > now {
        today
    } else {
        today + SECONDS_PER_DAY
    }
}

/// Index of the cipher day containing `now`, counted from the UNIX epoch
pub fn cipher_day(now: Timestamp, reset_hour_utc: u32) -> i64 {
    (now - reset_offset(reset_hour_utc)).div_euclid(SECONDS_PER_DAY)
}

/// The phrase in force at `now`
pub fn phrase_for(config: &CipherConfig, now: Timestamp) -> Result<&str> {
    let phrases: Vec<&String> = config.phrases.iter().filter(|p| !p.trim().is_empty()).collect();
    if phrases.is_empty() {
        return Err(YaraError::InvalidInput("no cipher phrases configured".into()));
    }
    let day = cipher_day(now, config.reset_hour_utc);
    let index = day.rem_euclid(phrases.len() as i64) as usize;
    Ok(phrases[index].as_str())
}

/// Case-insensitive comparison form, whitespace removed
pub fn normalize(solution: &str) -> String {
    solution
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Solved flag whose boundary has passed
pub fn is_expired(account: &Account, now: Timestamp) -> bool {
    account.cipher_solved && account.next_cipher_at.map_or(false, |next| next <= now)
}

/// Clear an expired solved flag; returns true if anything changed
pub fn expire(account: &mut Account, now: Timestamp) -> bool {
    if !is_expired(account, now) {
        return false;
    }
    account.cipher_solved = false;
    account.next_cipher_at = None;
    true
}

/// Submit a solution for the current cipher day
pub fn solve(
    account: &mut Account,
    submission: &str,
    config: &CipherConfig,
    referral_config: &ReferralConfig,
    now: Timestamp,
) -> Result<CipherReceipt> {
    let mut updated = account.clone();
    expire(&mut updated, now);

    if updated.cipher_solved {
        return Err(YaraError::AlreadySolved {
            next_at: updated.next_cipher_at,
        });
    }
    if normalize(submission) != normalize(phrase_for(config, now)?) {
        return Err(YaraError::WrongSolution);
    }

    let new_balance = updated.credit(config.bonus_amount)?;
    let next_cipher_at = next_boundary(now, config.reset_hour_utc);
    updated.cipher_solved = true;
    updated.next_cipher_at = Some(next_cipher_at);
    referral::record_earnings(
        &mut updated,
        config.bonus_amount,
        referral_config.earnings_window(),
        now,
    )?;
    *account = updated;

    Ok(CipherReceipt {
        bonus: config.bonus_amount,
        new_balance,
        next_cipher_at,
    })
}
