//! # Yara Economics - Reward & Cooldown Accrual Engine
//!
//! Play-money economy of the Yara game: players earn YARA through timed
//! actions and spend it on upgrades.
//!
//! ## Earning paths
//!
//! | Action | Gate | Reward |
//! |--------|------|--------|
//! | Base claim | 8h cooldown | 3,500 YARA × balance multiplier |
//! | Daily cipher | once per cipher day (12:00 UTC) | 1,000 YARA |
//! | Referral harvest | 24h cooldown | 25% of each referred pool |
//! | Signup bonus | once per referral edge | 500 YARA to the referrer |
//! | Task | completion + 1 min | task reward, once |
//!
//! ## Referral income
//!
//! ```text
//! ┌──────────────┐  claim / cipher   ┌───────────────────────┐
//! │ referred  A  │ ────────────────► │ A.daily_earnings pool │
//! └──────────────┘                   └───────────┬───────────┘
//!                                                │ harvest (24h gate)
//!                                                ▼
//!                                    ┌───────────────────────┐
//!                                    │ referrer R += 25%     │
//!                                    │ A pool reset to 0     │
//!                                    └───────────────────────┘
//! ```
//!
//! The engine modules (`claim`, `cipher`, `referral`, `shop`, `tasks`) are
//! pure functions over accounts and an explicit `now`. [`Economy`] wires them
//! to an [`AccountStore`](yara_storage::AccountStore), a [`Clock`](yara_core::Clock)
//! and a [`MembershipVerifier`].

pub mod cipher;
pub mod claim;
pub mod config;
pub mod economy;
pub mod referral;
pub mod shop;
pub mod tasks;
pub mod verification;

// Re-exports
pub use cipher::CipherReceipt;
pub use claim::ClaimReceipt;
pub use config::{EconomyConfig, VerificationMode};
pub use economy::{
    AccountSummary, Economy, LeaderboardEntry, LeaderboardKind, ReferralEntry, ReferralOverview,
    SweepReport, DEFAULT_LEADERBOARD_LIMIT,
};
pub use referral::{ReferralHarvest, ReferralShare};
pub use shop::{Currency, MultiplierTarget, PurchaseReceipt, StoreItem};
pub use tasks::{Task, TaskClaimReceipt, TaskEvidence, TaskKind, TaskVerification};
pub use verification::{
    verifier_from_config, AlwaysConfirm, MembershipVerifier, TelegramVerifier, VerificationError,
};

/// YARA token constants
pub mod constants {
    use yara_core::{Balance, ONE_YARA};

    /// Token symbol
    pub const SYMBOL: &str = "YARA";

    /// Token name
    pub const NAME: &str = "Yara Play Token";

    /// Base claim before multipliers: 3,500 YARA
    pub const BASE_CLAIM_AMOUNT: Balance = 3_500 * ONE_YARA;

    /// Base claim cooldown: 8 hours
    pub const BASE_CLAIM_COOLDOWN_SECS: u64 = 8 * 3_600;

    /// Daily cipher bonus: 1,000 YARA
    pub const CIPHER_BONUS_AMOUNT: Balance = 1_000 * ONE_YARA;

    /// UTC hour at which the cipher rotates
    pub const CIPHER_RESET_HOUR_UTC: u32 = 12;

    /// Referral harvest cooldown: 24 hours
    pub const REFERRAL_CLAIM_COOLDOWN_SECS: u64 = 24 * 3_600;

    /// Referrer's share of referred earnings: 25%
    pub const REFERRAL_SHARE_BPS: u32 = 2_500;

    /// Daily earnings window: 24 hours
    pub const EARNINGS_WINDOW_SECS: u64 = 24 * 3_600;

    /// Bonus paid to the referrer per signup: 500 YARA
    pub const REFERRAL_SIGNUP_BONUS: Balance = 500 * ONE_YARA;

    /// Delay between task completion and reward claim
    pub const TASK_CLAIM_DELAY_SECS: u64 = 60;

    /// Upper bound on one external verification call
    pub const VERIFICATION_TIMEOUT_MS: u64 = 5_000;
}

pub use constants::*;

#[cfg(test)]
mod tests {
    use super::*;
    use yara_core::ONE_YARA;

    #[test]
    fn test_base_claim() {
        assert_eq!(BASE_CLAIM_AMOUNT, 3_500 * ONE_YARA);
        assert_eq!(BASE_CLAIM_COOLDOWN_SECS, 28_800);
    }

    #[test]
    fn test_referral_share_is_a_quarter() {
        assert_eq!(referral::share_of(1_000, REFERRAL_SHARE_BPS), 250);
    }
}
