//! Persistent game state: accounts, referral edges, task progress
//!
//! Records are plain data. All mutation goes through the economy engines and
//! reaches storage as one atomic commit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, YaraError};
use crate::types::{AccountId, Balance, ItemId, Multiplier, ReferralCode, TaskId, Timestamp};

/// A player's persistent game state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identity
    pub id: AccountId,

    /// Identity at the external platform (e.g. Telegram user id), unique
    pub external_id: String,

    /// Display name
    pub display_name: String,

    /// Token balance, never negative
    pub balance: Balance,

    /// Last successful base claim
    pub last_claim_at: Option<Timestamp>,

    /// Today's cipher solved
    pub cipher_solved: bool,

    /// Next daily cipher boundary after the last solve
    pub next_cipher_at: Option<Timestamp>,

    /// Code others use to sign up under this account
    pub referral_code: ReferralCode,

    /// Last referral harvest
    pub last_referral_claim_at: Option<Timestamp>,

    /// Rolling pool harvested by this account's referrer
    pub daily_earnings: Balance,

    /// Last write to `daily_earnings`
    pub last_earnings_update_at: Option<Timestamp>,

    /// Scales the base claim amount
    pub balance_multiplier: Multiplier,

    /// Scales the displayed mining rate
    pub mining_multiplier: Multiplier,

    /// One-time upgrades already bought with balance
    pub purchased_upgrades: BTreeSet<ItemId>,

    /// Premium-currency purchases, repeatable
    pub premium_purchases: Vec<PremiumPurchase>,

    /// Best mini-game score reported for this account
    pub game_points: u64,

    /// Creation time
    pub created_at: Timestamp,

    /// Optimistic concurrency version, bumped by every commit
    pub version: u64,
}

impl Account {
    /// Fresh account: zero balance, neutral multipliers
    pub fn new(
        id: AccountId,
        external_id: impl Into<String>,
        display_name: impl Into<String>,
        referral_code: ReferralCode,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            display_name: display_name.into(),
            balance: 0,
            last_claim_at: None,
            cipher_solved: false,
            next_cipher_at: None,
            referral_code,
            last_referral_claim_at: None,
            daily_earnings: 0,
            last_earnings_update_at: None,
            balance_multiplier: Multiplier::ONE,
            mining_multiplier: Multiplier::ONE,
            purchased_upgrades: BTreeSet::new(),
            premium_purchases: Vec::new(),
            game_points: 0,
            created_at: now,
            version: 0,
        }
    }

    /// Add to the balance, returning the new balance
    pub fn credit(&mut self, amount: Balance) -> Result<Balance> {
        self.balance = self.balance.checked_add(amount).ok_or_else(|| {
            YaraError::InvalidAmount(format!("crediting {amount} overflows balance of {}", self.id))
        })?;
        Ok(self.balance)
    }

    /// Subtract from the balance, clamped at zero
    pub fn debit(&mut self, amount: Balance) -> Balance {
        self.balance = self.balance.saturating_sub(amount);
        self.balance
    }

    /// Check if a one-time upgrade is owned
    pub fn has_purchased(&self, item: &ItemId) -> bool {
        self.purchased_upgrades.contains(item)
    }
}

/// A premium-currency purchase receipt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumPurchase {
    pub item: ItemId,
    pub purchased_at: Timestamp,
}

/// Directed referral relationship, created once and never deleted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub referrer: AccountId,
    pub referred: AccountId,
    pub created_at: Timestamp,
}

/// One referred account's contribution to a referral harvest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralClaimRecord {
    pub referrer: AccountId,
    pub referred: AccountId,
    pub amount: Balance,
    pub claimed_at: Timestamp,
}

/// Lifecycle of a task for one account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Incomplete,
    Completed,
    /// Terminal
    Claimed,
}

/// Per (account, task) progress
///
/// `completed` is monotonic; `claimed` implies `completed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub account: AccountId,
    pub task: TaskId,
    pub completed: bool,
    pub completed_at: Option<Timestamp>,
    pub claimed: bool,
    pub claimed_at: Option<Timestamp>,
}

impl TaskProgress {
    pub fn new(account: AccountId, task: TaskId) -> Self {
        Self {
            account,
            task,
            completed: false,
            completed_at: None,
            claimed: false,
            claimed_at: None,
        }
    }

    pub fn state(&self) -> TaskState {
        match (self.completed, self.claimed) {
            (_, true) => TaskState::Claimed,
            (true, false) => TaskState::Completed,
            (false, false) => TaskState::Incomplete,
        }
    }

    /// Mark completed; returns false if it already was
    pub fn mark_completed(&mut self, now: Timestamp) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_at = Some(now);
        true
    }

    /// Mark claimed; fails unless completed and unclaimed
    pub fn mark_claimed(&mut self, now: Timestamp) -> Result<()> {
        match self.state() {
            TaskState::Incomplete => Err(YaraError::NotCompleted(self.task.clone())),
            TaskState::Claimed => Err(YaraError::AlreadyClaimed(self.task.clone())),
            TaskState::Completed => {
                self.claimed = true;
                self.claimed_at = Some(now);
                Ok(())
            }
        }
    }
}
