//! # Referral Accrual
//!
//! Each account keeps a rolling "daily earnings" pool fed by its own claims
//! and cipher bonuses. The account's referrer may harvest a share (25% by
//! default) of that pool once per referral cooldown.
//!
//! ## Pool lifecycle
//!
//! ```text
//!   record(A) ──► pool = A ──record(B) within window──► pool = A + B
//!                    │
//!                    └──record(B) after window──► pool = B   (A is lost)
//!
//!   settle (harvest) ──► returns pool, pool = 0
//! ```
//!
//! Reads never mutate: [`preview_claimable`] is pure, and pools are only reset
//! by [`settle_earnings`] inside the referral claim transaction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use yara_core::prelude::*;

use crate::config::ReferralConfig;

/// One referred account's contribution to a harvest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralShare {
    pub referred: AccountId,
    /// Pool value that was settled
    pub earnings: Balance,
    /// Referrer's share of it
    pub share: Balance,
}

/// Outcome of a referral harvest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralHarvest {
    pub amount: Balance,
    pub new_balance: Balance,
    pub shares: Vec<ReferralShare>,
    pub next_claim_at: Timestamp,
}

/// True once the pool has seen no new earnings for a full window
pub fn is_pool_stale(account: &Account, window: Duration, now: Timestamp) -> bool {
    account.last_earnings_update_at.is_some()
        && cooldown::is_ready(account.last_earnings_update_at, window, now)
}

/// Add freshly earned reward to the account's pool
///
/// A pool untouched for a full window restarts at `amount`; its old value is
/// discarded, not carried over.
pub fn record_earnings(
    account: &mut Account,
    amount: Balance,
    window: Duration,
    now: Timestamp,
) -> Result<()> {
    if cooldown::is_ready(account.last_earnings_update_at, window, now) {
        account.daily_earnings = amount;
    } else {
        account.daily_earnings = account
            .daily_earnings
            .checked_add(amount)
            .ok_or_else(|| YaraError::InvalidAmount("daily earnings overflow".into()))?;
    }
    account.last_earnings_update_at = Some(now);
    Ok(())
}

/// Read a pool the way the harvest sees it
///
/// A stale pool still yields its last value once, and is reset to zero with
/// its timestamp moved to `now`.
pub fn peek_earnings(account: &mut Account, window: Duration, now: Timestamp) -> Balance {
    let value = account.daily_earnings;
    if is_pool_stale(account, window, now) {
        account.daily_earnings = 0;
        account.last_earnings_update_at = Some(now);
    }
    value
}

/// Take the whole pool for a harvest, leaving it empty
pub fn settle_earnings(account: &mut Account, window: Duration, now: Timestamp) -> Balance {
    let value = peek_earnings(account, window, now);
    account.daily_earnings = 0;
    value
}

/// Referrer's share of a pool value
pub fn share_of(earnings: Balance, share_bps: u32) -> Balance {
    // share_bps <= 100% is enforced by config validation, so this cannot overflow.
    apply_bps(earnings, share_bps).unwrap_or(earnings)
}

/// What a harvest would pay right now, without touching any pool
pub fn preview_claimable(referred: &[Account], share_bps: u32) -> Balance {
    referred
        .iter()
        .map(|a| share_of(a.daily_earnings, share_bps))
        .fold(0, Balance::saturating_add)
}

/// Settle every referred pool and sum the referrer's shares
pub fn compute_claimable(
    referred: &mut [Account],
    config: &ReferralConfig,
    now: Timestamp,
) -> Result<(Balance, Vec<ReferralShare>)> {
    let mut total: Balance = 0;
    let mut shares = Vec::with_capacity(referred.len());
    for account in referred.iter_mut() {
        let earnings = settle_earnings(account, config.earnings_window(), now);
        let share = share_of(earnings, config.share_bps);
        total = total
            .checked_add(share)
            .ok_or_else(|| YaraError::InvalidAmount("referral total overflow".into()))?;
        shares.push(ReferralShare {
            referred: account.id.clone(),
            earnings,
            share,
        });
    }
    Ok((total, shares))
}

/// Harvest the referrer's share of every referred pool
///
/// Fails with `NotReady` inside the referral cooldown and with
/// `NothingToClaim` when all pools are empty. On failure no account is
/// modified.
pub fn claim_referral_rewards(
    referrer: &mut Account,
    referred: &mut [Account],
    config: &ReferralConfig,
    now: Timestamp,
) -> Result<ReferralHarvest> {
    cooldown::ensure_ready(referrer.last_referral_claim_at, config.cooldown(), now)?;

    let mut settled = referred.to_vec();
    let (amount, shares) = compute_claimable(&mut settled, config, now)?;
    if amount == 0 {
        return Err(YaraError::NothingToClaim);
    }

    let mut updated = referrer.clone();
    let new_balance = updated.credit(amount)?;
    updated.last_referral_claim_at = Some(now);

    *referrer = updated;
    referred.clone_from_slice(&settled);

    Ok(ReferralHarvest {
        amount,
        new_balance,
        shares,
        next_claim_at: cooldown::opens_at(now, config.cooldown()),
    })
}

/// Create the referral edge and pay the referrer's signup bonus
pub fn add_referral_edge(
    referrer: &mut Account,
    referred: &Account,
    config: &ReferralConfig,
    now: Timestamp,
) -> Result<ReferralEdge> {
    if referrer.id == referred.id {
        return Err(YaraError::InvalidReferral(format!(
            "{} cannot refer itself",
            referrer.id
        )));
    }
    referrer.credit(config.signup_bonus)?;
    Ok(ReferralEdge {
        referrer: referrer.id.clone(),
        referred: referred.id.clone(),
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DAY: i64 = 24 * 3_600;

    fn account(id: &str) -> Account {
        Account::new(AccountId::new(id), format!("tg-{id}"), id, ReferralCode::generate(), 0)
    }

    fn window() -> Duration {
        Duration::from_secs(DAY as u64)
    }

    #[test]
    fn test_earnings_accumulate_within_window() {
        let mut acc = account("a");
        record_earnings(&mut acc, 1_000, window(), 0).unwrap();
        record_earnings(&mut acc, 500, window(), DAY - 1).unwrap();
        assert_eq!(acc.daily_earnings, 1_500);
        assert_eq!(acc.last_earnings_update_at, Some(DAY - 1));
    }

    #[test]
    fn test_earnings_restart_after_window() {
        let mut acc = account("a");
        record_earnings(&mut acc, 1_000, window(), 0).unwrap();
        record_earnings(&mut acc, 500, window(), DAY).unwrap();
        assert_eq!(acc.daily_earnings, 500);
    }

    #[test]
    fn test_window_slides_with_each_record() {
        let mut acc = account("a");
        record_earnings(&mut acc, 100, window(), 0).unwrap();
        record_earnings(&mut acc, 100, window(), DAY - 10).unwrap();
        record_earnings(&mut acc, 100, window(), 2 * DAY - 20).unwrap();
        assert_eq!(acc.daily_earnings, 300);
    }

    #[test]
    fn test_peek_fresh_pool_is_read_only() {
        let mut acc = account("a");
        record_earnings(&mut acc, 1_000, window(), 0).unwrap();
        assert_eq!(peek_earnings(&mut acc, window(), 10), 1_000);
        assert_eq!(acc.daily_earnings, 1_000);
        assert_eq!(acc.last_earnings_update_at, Some(0));
    }

    #[test]
    fn test_peek_stale_pool_yields_once_then_resets() {
        let mut acc = account("a");
        record_earnings(&mut acc, 1_000, window(), 0).unwrap();
        assert_eq!(peek_earnings(&mut acc, window(), DAY + 5), 1_000);
        assert_eq!(acc.daily_earnings, 0);
        assert_eq!(acc.last_earnings_update_at, Some(DAY + 5));
    }

    #[test]
    fn test_peek_never_recorded() {
        let mut acc = account("a");
        assert_eq!(peek_earnings(&mut acc, window(), 0), 0);
        assert_eq!(acc.last_earnings_update_at, None);
    }

    #[test]
    fn test_compute_claimable_resets_pools() {
        let mut referred = vec![account("a"), account("b")];
        record_earnings(&mut referred[0], 1_000, window(), 0).unwrap();
        record_earnings(&mut referred[1], 400, window(), 0).unwrap();
        let config = ReferralConfig::default();

        let (total, shares) = compute_claimable(&mut referred, &config, 60).unwrap();
        assert_eq!(total, 350);
        assert_eq!(shares[0].share, 250);
        assert_eq!(shares[1].earnings, 400);

        let (again, _) = compute_claimable(&mut referred, &config, 61).unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn test_preview_does_not_mutate() {
        let mut referred = vec![account("a")];
        record_earnings(&mut referred[0], 1_000, window(), 0).unwrap();
        let before = referred.clone();

        assert_eq!(preview_claimable(&referred, 2_500), 250);
        assert_eq!(preview_claimable(&referred, 2_500), 250);
        assert_eq!(referred, before);
    }

    #[test]
    fn test_claim_referral_rewards() {
        let mut referrer = account("r");
        let mut referred = vec![account("a")];
        record_earnings(&mut referred[0], 1_000, window(), 0).unwrap();
        let config = ReferralConfig::default();

        let harvest = claim_referral_rewards(&mut referrer, &mut referred, &config, 100).unwrap();
        assert_eq!(harvest.amount, 250);
        assert_eq!(harvest.new_balance, 250);
        assert_eq!(referrer.last_referral_claim_at, Some(100));
        assert_eq!(referred[0].daily_earnings, 0);
        assert_eq!(harvest.next_claim_at, 100 + DAY);
    }

    #[test]
    fn test_claim_referral_inside_cooldown_has_no_effect() {
        let mut referrer = account("r");
        referrer.last_referral_claim_at = Some(0);
        let mut referred = vec![account("a")];
        record_earnings(&mut referred[0], 1_000, window(), 0).unwrap();
        let before = referred.clone();

        let err = claim_referral_rewards(&mut referrer, &mut referred, &ReferralConfig::default(), 3_600)
            .unwrap_err();
        assert_eq!(err, YaraError::NotReady { ready_at: DAY });
        assert_eq!(referred, before);
    }

    #[test]
    fn test_claim_referral_nothing_to_claim() {
        let mut referrer = account("r");
        let mut referred = vec![account("a")];
        let err = claim_referral_rewards(&mut referrer, &mut referred, &ReferralConfig::default(), 0)
            .unwrap_err();
        assert_eq!(err, YaraError::NothingToClaim);
        assert_eq!(referrer.last_referral_claim_at, None);

        let mut no_referrals: Vec<Account> = Vec::new();
        assert_eq!(
            claim_referral_rewards(&mut referrer, &mut no_referrals, &ReferralConfig::default(), 0),
            Err(YaraError::NothingToClaim)
        );
    }

    #[test]
    fn test_configurable_referral_cooldown() {
        let config = ReferralConfig {
            cooldown_secs: 4 * 3_600,
            ..ReferralConfig::default()
        };
        let mut referrer = account("r");
        referrer.last_referral_claim_at = Some(0);
        let mut referred = vec![account("a")];
        record_earnings(&mut referred[0], 100, window(), 0).unwrap();
        assert!(claim_referral_rewards(&mut referrer, &mut referred, &config, 4 * 3_600).is_ok());
    }

    #[test]
    fn test_huge_referral_cooldown_keeps_next_claim_in_future() {
        let config = ReferralConfig {
            cooldown_secs: u64::MAX,
            ..ReferralConfig::default()
        };
        let mut referrer = account("r");
        let mut referred = vec![account("a")];
        record_earnings(&mut referred[0], 1_000, window(), 0).unwrap();

        let harvest = claim_referral_rewards(&mut referrer, &mut referred, &config, 100).unwrap();
        assert_eq!(harvest.next_claim_at, Timestamp::MAX);
    }

    #[test]
    fn test_signup_bonus_and_self_referral() {
        let mut referrer = account("r");
        let referred = account("a");
        let edge = add_referral_edge(&mut referrer, &referred, &ReferralConfig::default(), 7).unwrap();
        assert_eq!(edge.referred, referred.id);
        assert_eq!(referrer.balance, ReferralConfig::default().signup_bonus);

        let me = referrer.clone();
        assert!(matches!(
            add_referral_edge(&mut referrer, &me, &ReferralConfig::default(), 8),
            Err(YaraError::InvalidReferral(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_pool_never_exceeds_window_sum(gaps in proptest::collection::vec(0i64..2 * DAY, 1..20)) {
            let mut acc = account("a");
            let mut now = 0;
            let mut window_sum: Balance = 0;
            let mut last: Option<i64> = None;
            for gap in gaps {
                now += gap;
                if last.map_or(true, |l| now - l >= DAY) {
                    window_sum = 0;
                }
                window_sum += 10;
                last = Some(now);
                record_earnings(&mut acc, 10, window(), now).unwrap();
                prop_assert_eq!(acc.daily_earnings, window_sum);
            }
        }
    }
}
