//! # Economy Service
//!
//! Wires the pure engines to the account store, the clock and the membership
//! verifier. Every mutating operation is one optimistic read-modify-write:
//!
//! ```text
//!   read rows ──► engine fn (pure) ──► ChangeSet ──► commit
//!       ▲                                               │
//!       └────────────── Conflict: retry ◄───────────────┘
//! ```
//!
//! Accounts that an operation only reads but depends on (the referred side
//! of a new edge, the owner of a task) are staged unchanged so a concurrent
//! writer forces a retry instead of a lost update.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use yara_core::prelude::*;
use yara_storage::{transact, AccountStore, ChangeSet};

use crate::cipher::{self, CipherReceipt};
use crate::claim::{self, ClaimReceipt};
use crate::config::EconomyConfig;
use crate::referral::{self, ReferralHarvest};
use crate::shop::{self, PurchaseReceipt, StoreItem};
use crate::tasks::{self, RequirementCheck, Task, TaskClaimReceipt, TaskEvidence, TaskVerification};
use crate::verification::{verify_with_timeout, MembershipVerifier};

/// Attempts at drawing an unused referral code before giving up
const CODE_ATTEMPTS: usize = 16;

/// Default leaderboard size
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

/// Account state plus derived timers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account: Account,
    pub mining_rate_per_hour: Balance,
    pub claim_reward: Balance,
    pub next_claim_at: Option<Timestamp>,
    pub claim_ready: bool,
    pub next_cipher_at: Option<Timestamp>,
    pub referral_count: usize,
}

/// One referred account as the referrer sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEntry {
    pub account: AccountId,
    pub display_name: String,
    pub daily_earnings: Balance,
    /// Referrer's share of the current pool
    pub claimable: Balance,
}

/// Read-only view of a referrer's network
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralOverview {
    pub referrer: AccountId,
    pub referral_code: ReferralCode,
    pub entries: Vec<ReferralEntry>,
    pub total_claimable: Balance,
    pub next_claim_at: Option<Timestamp>,
}

/// Leaderboard ordering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaderboardKind {
    #[default]
    Balance,
    GamePoints,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub account: AccountId,
    pub display_name: String,
    pub score: u64,
}

/// Result of one bounded cipher sweep
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Rows examined
    pub scanned: usize,
    /// Solved flags cleared
    pub expired: usize,
    /// The scan reached the end of the table and restarts from the beginning
    pub wrapped: bool,
}

#[derive(Default)]
struct SweepState {
    cursor: Option<AccountId>,
    last_run: Option<Timestamp>,
}

/// The reward & cooldown accrual engine behind one account store
pub struct Economy {
    store: Arc<dyn AccountStore>,
    config: EconomyConfig,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn MembershipVerifier>,
    sweep: Mutex<SweepState>,
}

fn load(store: &dyn AccountStore, id: &AccountId) -> Result<Account> {
    store
        .get(id)?
        .ok_or_else(|| YaraError::AccountNotFound(id.clone()))
}

/// Log a rejected operation at debug level and pass the result through
fn traced<T>(operation: &str, account: &AccountId, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::debug!(account = %account, code = e.code(), "{} rejected: {}", operation, e);
    }
    result
}

impl Economy {
    /// Create the service; the configuration is validated first
    pub fn new(
        store: Arc<dyn AccountStore>,
        config: EconomyConfig,
        clock: Arc<dyn Clock>,
        verifier: Arc<dyn MembershipVerifier>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::debug!("Economy ready with verifier {}", verifier.name());
        Ok(Self {
            store,
            config,
            clock,
            verifier,
            sweep: Mutex::new(SweepState::default()),
        })
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn retries(&self) -> u32 {
        self.config.storage.commit_retries
    }

    // === Accounts ===

    /// Register a player, optionally under a referrer's code
    ///
    /// The account, its referral edge and the referrer's signup bonus are one
    /// commit: a failed signup leaves nothing behind and can be retried.
    pub fn create_account(
        &self,
        external_id: &str,
        display_name: &str,
        referral_code: Option<&str>,
    ) -> Result<Account> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(YaraError::InvalidInput("external id must not be empty".into()));
        }
        let referrer_code = referral_code.map(ReferralCode::parse).transpose()?;
        if let Some(code) = &referrer_code {
            if self.store.get_by_code(code)?.is_none() {
                return Err(YaraError::InvalidReferral(format!("unknown referral code {}", code)));
            }
        }
        if self.store.get_by_external_id(external_id)?.is_some() {
            return Err(YaraError::AccountExists(external_id.to_string()));
        }

        let now = self.now();
        for _ in 0..CODE_ATTEMPTS {
            let code = ReferralCode::generate();
            if self.store.get_by_code(&code)?.is_some() {
                continue;
            }
            let candidate = Account::new(AccountId::generate(), external_id, display_name, code, now);
            let result = transact(self.store.as_ref(), self.retries(), |store| {
                let mut changes = ChangeSet::new();
                let edge = match &referrer_code {
                    Some(code) => {
                        let mut referrer = store.get_by_code(code)?.ok_or_else(|| {
                            YaraError::InvalidReferral(format!("unknown referral code {}", code))
                        })?;
                        let edge = referral::add_referral_edge(&mut referrer, &candidate, &self.config.referral, now)?;
                        changes.put_account(referrer);
                        changes.add_edge(edge.clone());
                        Some(edge)
                    }
                    None => None,
                };
                changes.create_account(candidate.clone());
                Ok((edge, changes))
            });
            match result {
                Ok(edge) => {
                    tracing::info!(account = %candidate.id, code = %candidate.referral_code, "Account created for {}", external_id);
                    if let Some(edge) = edge {
                        tracing::info!(
                            referrer = %edge.referrer,
                            referred = %edge.referred,
                            bonus = self.config.referral.signup_bonus,
                            "Referral edge created"
                        );
                    }
                    return Ok(candidate);
                }
                // Lost a race for the code or id; draw again.
                Err(YaraError::Conflict(id)) if id == candidate.id => continue,
                Err(e) => return traced("signup", &candidate.id, Err(e)),
            }
        }
        Err(YaraError::StorageError("could not allocate a unique referral code".into()))
    }

    pub fn account(&self, id: &AccountId) -> Result<Account> {
        load(self.store.as_ref(), id)
    }

    pub fn account_by_external_id(&self, external_id: &str) -> Result<Account> {
        self.store
            .get_by_external_id(external_id)?
            .ok_or_else(|| YaraError::AccountNotFound(AccountId::new(external_id)))
    }

    /// Account with its derived timers
    pub fn summary(&self, id: &AccountId) -> Result<AccountSummary> {
        let now = self.now();
        let account = self.account(id)?;
        let next_claim_at = claim::next_claim_at(&account, &self.config.claim);
        let next_cipher_at = if cipher::is_expired(&account, now) {
            None
        } else {
            account.next_cipher_at
        };
        Ok(AccountSummary {
            mining_rate_per_hour: claim::mining_rate_per_hour(&account, &self.config.claim),
            claim_reward: claim::reward_amount(&account, &self.config.claim)?,
            claim_ready: cooldown::is_ready(account.last_claim_at, self.config.claim.cooldown(), now),
            next_claim_at,
            next_cipher_at,
            referral_count: self.store.referrals_of(id)?.len(),
            account,
        })
    }

    // === Claim ===

    /// Periodic base claim
    pub fn claim(&self, id: &AccountId) -> Result<ClaimReceipt> {
        let now = self.now();
        let result = transact(self.store.as_ref(), self.retries(), |store| {
            let mut account = load(store, id)?;
            let receipt = claim::claim(&mut account, &self.config.claim, &self.config.referral, now)?;
            Ok((receipt, ChangeSet::new().with_account(account)))
        });
        let receipt = traced("claim", id, result)?;
        tracing::info!(account = %id, amount = receipt.amount, balance = receipt.new_balance, "Claimed");
        Ok(receipt)
    }

    // === Cipher ===

    /// Submit today's cipher solution
    ///
    /// An expiry sweep runs first, subject to the configured minimum interval.
    pub fn solve_cipher(&self, id: &AccountId, solution: &str) -> Result<CipherReceipt> {
        let now = self.now();
        self.maybe_sweep(now);

        let result = transact(self.store.as_ref(), self.retries(), |store| {
            let mut account = load(store, id)?;
            let receipt = cipher::solve(&mut account, solution, &self.config.cipher, &self.config.referral, now)?;
            Ok((receipt, ChangeSet::new().with_account(account)))
        });
        let receipt = traced("cipher", id, result)?;
        tracing::info!(account = %id, bonus = receipt.bonus, balance = receipt.new_balance, "Cipher solved");
        Ok(receipt)
    }

    fn maybe_sweep(&self, now: Timestamp) {
        let interval = i64::try_from(self.config.cipher.sweep_min_interval_secs).unwrap_or(i64::MAX);
        let due = {
            let state = self.sweep.lock();
            state.last_run.map_or(true, |last| now.saturating_sub(last) >= interval)
        };
        if !due {
            return;
        }
        if let Err(e) = self.sweep_at(now) {
            tracing::warn!("Cipher sweep failed: {}", e);
        }
    }

    /// Clear expired "solved" flags on one bounded batch of accounts
    ///
    /// Each call examines at most `sweep_batch_limit` rows, continuing where
    /// the previous call stopped. Very large account tables take several
    /// calls to cover; solve attempts still expire their own account lazily.
    pub fn sweep_expired_ciphers(&self) -> Result<SweepReport> {
        self.sweep_at(self.now())
    }

    fn sweep_at(&self, now: Timestamp) -> Result<SweepReport> {
        let mut state = self.sweep.lock();
        let limit = self.config.cipher.sweep_batch_limit;
        let batch = self.store.scan_accounts(state.cursor.as_ref(), limit)?;

        let mut report = SweepReport {
            scanned: batch.len(),
            wrapped: batch.len() < limit,
            ..SweepReport::default()
        };
        for candidate in batch.iter().filter(|a| cipher::is_expired(a, now)) {
            let expired = transact(self.store.as_ref(), self.retries(), |store| {
                let mut account = load(store, &candidate.id)?;
                if !cipher::expire(&mut account, now) {
                    return Ok((false, ChangeSet::new()));
                }
                Ok((true, ChangeSet::new().with_account(account)))
            });
            match expired {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                // Left for the next pass or the account's own solve.
                Err(e) => tracing::debug!(account = %candidate.id, "Sweep skipped account: {}", e),
            }
        }

        state.cursor = if report.wrapped {
            None
        } else {
            batch.last().map(|a| a.id.clone())
        };
        state.last_run = Some(now);
        tracing::debug!(
            scanned = report.scanned,
            expired = report.expired,
            wrapped = report.wrapped,
            "Cipher sweep done"
        );
        Ok(report)
    }

    // === Referrals ===

    /// Link `referred` under the owner of `referrer_code` and pay the signup bonus
    pub fn add_referral_edge(&self, referrer_code: &str, referred: &AccountId) -> Result<ReferralEdge> {
        let now = self.now();
        let code = ReferralCode::parse(referrer_code)?;
        let result = transact(self.store.as_ref(), self.retries(), |store| {
            let mut referrer = store
                .get_by_code(&code)?
                .ok_or_else(|| YaraError::InvalidReferral(format!("unknown referral code {}", code)))?;
            let referred_account = store
                .get(referred)?
                .ok_or_else(|| YaraError::InvalidReferral(format!("unknown referred account {}", referred)))?;
            if let Some(existing) = store.referrer_of(referred)? {
                return Err(YaraError::InvalidReferral(format!(
                    "{} is already referred by {}",
                    referred, existing
                )));
            }

            let edge = referral::add_referral_edge(&mut referrer, &referred_account, &self.config.referral, now)?;
            let mut changes = ChangeSet::new().with_account(referrer).with_account(referred_account);
            changes.add_edge(edge.clone());
            Ok((edge, changes))
        });
        let edge = traced("referral", referred, result)?;
        tracing::info!(
            referrer = %edge.referrer,
            referred = %edge.referred,
            bonus = self.config.referral.signup_bonus,
            "Referral edge created"
        );
        Ok(edge)
    }

    fn referred_accounts(store: &dyn AccountStore, referrer: &AccountId) -> Result<Vec<Account>> {
        store
            .referrals_of(referrer)?
            .iter()
            .map(|id| load(store, id))
            .collect()
    }

    /// What the referrer could harvest now; never modifies any pool
    pub fn referral_overview(&self, referrer: &AccountId) -> Result<ReferralOverview> {
        let account = self.account(referrer)?;
        let referred = Self::referred_accounts(self.store.as_ref(), referrer)?;
        let share_bps = self.config.referral.share_bps;

        let entries = referred
            .iter()
            .map(|a| ReferralEntry {
                account: a.id.clone(),
                display_name: a.display_name.clone(),
                daily_earnings: a.daily_earnings,
                claimable: referral::share_of(a.daily_earnings, share_bps),
            })
            .collect();
        Ok(ReferralOverview {
            referrer: account.id.clone(),
            referral_code: account.referral_code.clone(),
            entries,
            total_claimable: referral::preview_claimable(&referred, share_bps),
            next_claim_at: cooldown::ready_at(account.last_referral_claim_at, self.config.referral.cooldown()),
        })
    }

    /// Harvest the referrer's share of every referred pool
    pub fn claim_referral_rewards(&self, referrer: &AccountId) -> Result<ReferralHarvest> {
        let now = self.now();
        let result = transact(self.store.as_ref(), self.retries(), |store| {
            let mut account = load(store, referrer)?;
            let mut referred = Self::referred_accounts(store, referrer)?;
            let harvest = referral::claim_referral_rewards(&mut account, &mut referred, &self.config.referral, now)?;

            let mut changes = ChangeSet::new().with_account(account);
            for share in harvest.shares.iter().filter(|s| s.share > 0) {
                changes.add_referral_claim(ReferralClaimRecord {
                    referrer: referrer.clone(),
                    referred: share.referred.clone(),
                    amount: share.share,
                    claimed_at: now,
                });
            }
            for settled in referred {
                changes.put_account(settled);
            }
            Ok((harvest, changes))
        });
        let harvest = traced("referral claim", referrer, result)?;
        tracing::info!(
            account = %referrer,
            amount = harvest.amount,
            balance = harvest.new_balance,
            referrals = harvest.shares.len(),
            "Referral rewards claimed"
        );
        Ok(harvest)
    }

    pub fn referral_claims(&self, referrer: &AccountId) -> Result<Vec<ReferralClaimRecord>> {
        self.account(referrer)?;
        self.store.referral_claims(referrer)
    }

    // === Shop ===

    pub fn shop_items(&self) -> &[StoreItem] {
        &self.config.shop.catalog
    }

    /// Buy an upgrade
    pub fn purchase(&self, id: &AccountId, item: &ItemId) -> Result<PurchaseReceipt> {
        let now = self.now();
        let result = shop::find_item(&self.config.shop.catalog, item).and_then(|item| {
            transact(self.store.as_ref(), self.retries(), |store| {
                let mut account = load(store, id)?;
                let receipt = shop::purchase(&mut account, item, now)?;
                Ok((receipt, ChangeSet::new().with_account(account)))
            })
        });
        let receipt = traced("purchase", id, result)?;
        tracing::info!(
            account = %id,
            item = %receipt.item,
            charged = receipt.charged,
            balance = receipt.new_balance,
            "Upgrade purchased"
        );
        Ok(receipt)
    }

    // === Tasks ===

    pub fn tasks(&self) -> &[Task] {
        &self.config.tasks.catalog
    }

    /// Progress of one task; a never-touched task reads as incomplete
    pub fn task_status(&self, id: &AccountId, task: &TaskId) -> Result<TaskProgress> {
        tasks::find_task(&self.config.tasks.catalog, task)?;
        self.account(id)?;
        Ok(self
            .store
            .task_progress(id, task)?
            .unwrap_or_else(|| TaskProgress::new(id.clone(), task.clone())))
    }

    /// Check a task's requirement and mark it completed when met
    ///
    /// Already-completed tasks return immediately without re-checking.
    /// External checks run before any store access for the commit, so no
    /// lock is held while waiting on the verifier.
    pub async fn verify_task(
        &self,
        id: &AccountId,
        task_id: &TaskId,
        evidence: &TaskEvidence,
    ) -> Result<TaskVerification> {
        let result = self.verify_task_inner(id, task_id, evidence).await;
        let verification = traced("task verify", id, result)?;
        if verification.newly_completed {
            tracing::info!(account = %id, task = %task_id, "Task completed");
        }
        Ok(verification)
    }

    async fn verify_task_inner(
        &self,
        id: &AccountId,
        task_id: &TaskId,
        evidence: &TaskEvidence,
    ) -> Result<TaskVerification> {
        let task = tasks::find_task(&self.config.tasks.catalog, task_id)?;
        let account = self.account(id)?;
        if let Some(progress) = self.store.task_progress(id, task_id)? {
            if progress.completed {
                return Ok(TaskVerification {
                    task: task_id.clone(),
                    completed: true,
                    newly_completed: false,
                });
            }
        }

        let referral_count = self.store.referrals_of(id)?.len();
        let met = match tasks::check_requirement(task, &account, referral_count) {
            RequirementCheck::Met => true,
            RequirementCheck::Unmet => false,
            RequirementCheck::External { url } => {
                verify_with_timeout(
                    self.verifier.as_ref(),
                    evidence.handle.as_deref(),
                    &url,
                    self.config.tasks.verification_timeout(),
                )
                .await?;
                true
            }
        };
        if !met {
            return Ok(TaskVerification {
                task: task_id.clone(),
                completed: false,
                newly_completed: false,
            });
        }

        let now = self.now();
        transact(self.store.as_ref(), self.retries(), |store| {
            let account = load(store, id)?;
            let mut progress = store
                .task_progress(id, task_id)?
                .unwrap_or_else(|| TaskProgress::new(id.clone(), task_id.clone()));
            let verification = tasks::apply_verification(&mut progress, true, now);
            if !verification.newly_completed {
                return Ok((verification, ChangeSet::new()));
            }
            let mut changes = ChangeSet::new().with_account(account);
            changes.put_task_progress(progress);
            Ok((verification, changes))
        })
    }

    /// Collect a completed task's reward
    pub fn claim_task(&self, id: &AccountId, task_id: &TaskId) -> Result<TaskClaimReceipt> {
        let now = self.now();
        let result = tasks::find_task(&self.config.tasks.catalog, task_id).and_then(|task| {
            transact(self.store.as_ref(), self.retries(), |store| {
                let mut account = load(store, id)?;
                let mut progress = store
                    .task_progress(id, task_id)?
                    .unwrap_or_else(|| TaskProgress::new(id.clone(), task_id.clone()));
                let receipt = tasks::claim_task(&mut account, &mut progress, task, self.config.tasks.claim_delay(), now)?;
                let mut changes = ChangeSet::new().with_account(account);
                changes.put_task_progress(progress);
                Ok((receipt, changes))
            })
        });
        let receipt = traced("task claim", id, result)?;
        tracing::info!(account = %id, task = %task_id, reward = receipt.reward, "Task reward claimed");
        Ok(receipt)
    }

    // === Game points & leaderboard ===

    /// Overwrite the account's mini-game score
    pub fn set_game_points(&self, id: &AccountId, points: u64) -> Result<Account> {
        let result = transact(self.store.as_ref(), self.retries(), |store| {
            let mut account = load(store, id)?;
            account.game_points = points;
            Ok(((), ChangeSet::new().with_account(account)))
        });
        traced("game points", id, result)?;
        tracing::info!(account = %id, points, "Game points updated");
        self.account(id)
    }

    /// Top accounts, highest score first
    pub fn leaderboard(&self, kind: LeaderboardKind, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let score = |a: &Account| match kind {
            LeaderboardKind::Balance => a.balance,
            LeaderboardKind::GamePoints => a.game_points,
        };
        let top = self.store.top_accounts(limit, &score)?;
        Ok(top
            .iter()
            .enumerate()
            .map(|(i, a)| LeaderboardEntry {
                rank: i + 1,
                account: a.id.clone(),
                display_name: a.display_name.clone(),
                score: score(a),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::AlwaysConfirm;
    use yara_storage::MemoryStore;

    const HOUR: i64 = 3_600;

    fn economy() -> (Economy, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let economy = Economy::new(
            Arc::new(MemoryStore::new()),
            EconomyConfig::default(),
            clock.clone(),
            Arc::new(AlwaysConfirm),
        )
        .unwrap();
        (economy, clock)
    }

    #[test]
    fn test_create_account_rejects_duplicate_external_id() {
        let (economy, _) = economy();
        let acc = economy.create_account("tg-1", "alice", None).unwrap();
        assert_eq!(acc.balance, 0);
        assert_eq!(acc.referral_code.as_str().len(), ReferralCode::LEN);
        assert_eq!(
            economy.create_account("tg-1", "alice again", None),
            Err(YaraError::AccountExists("tg-1".into()))
        );
    }

    #[test]
    fn test_signup_with_unknown_code_creates_nothing() {
        let (economy, _) = economy();
        assert!(matches!(
            economy.create_account("tg-1", "alice", Some("DEADBEEF")),
            Err(YaraError::InvalidReferral(_))
        ));
        assert_eq!(economy.store().account_count().unwrap(), 0);
    }

    #[test]
    fn test_signup_with_code_pays_referrer() {
        let (economy, _) = economy();
        let referrer = economy.create_account("tg-r", "rita", None).unwrap();
        let lowercase = referrer.referral_code.as_str().to_lowercase();
        let referred = economy.create_account("tg-a", "alice", Some(&lowercase)).unwrap();

        assert_eq!(economy.store().referrer_of(&referred.id).unwrap(), Some(referrer.id.clone()));
        assert_eq!(
            economy.account(&referrer.id).unwrap().balance,
            economy.config().referral.signup_bonus
        );
    }

    /// Store whose commits carrying referral edges lose every race while `busy` is set
    struct BusyReferrerStore {
        inner: MemoryStore,
        busy: std::sync::atomic::AtomicBool,
    }

    impl AccountStore for BusyReferrerStore {
        fn get(&self, id: &AccountId) -> Result<Option<Account>> {
            self.inner.get(id)
        }
        fn get_by_code(&self, code: &ReferralCode) -> Result<Option<Account>> {
            self.inner.get_by_code(code)
        }
        fn get_by_external_id(&self, external_id: &str) -> Result<Option<Account>> {
            self.inner.get_by_external_id(external_id)
        }
        fn create(&self, account: Account) -> Result<Account> {
            self.inner.create(account)
        }
        fn referrals_of(&self, referrer: &AccountId) -> Result<Vec<AccountId>> {
            self.inner.referrals_of(referrer)
        }
        fn referrer_of(&self, referred: &AccountId) -> Result<Option<AccountId>> {
            self.inner.referrer_of(referred)
        }
        fn task_progress(&self, account: &AccountId, task: &TaskId) -> Result<Option<TaskProgress>> {
            self.inner.task_progress(account, task)
        }
        fn referral_claims(&self, referrer: &AccountId) -> Result<Vec<ReferralClaimRecord>> {
            self.inner.referral_claims(referrer)
        }
        fn scan_accounts(&self, after: Option<&AccountId>, limit: usize) -> Result<Vec<Account>> {
            self.inner.scan_accounts(after, limit)
        }
        fn top_accounts(&self, limit: usize, score: &dyn Fn(&Account) -> u64) -> Result<Vec<Account>> {
            self.inner.top_accounts(limit, score)
        }
        fn account_count(&self) -> Result<usize> {
            self.inner.account_count()
        }
        fn commit(&self, changes: ChangeSet) -> Result<()> {
            if let Some(edge) = changes.edges.first() {
                if self.busy.load(std::sync::atomic::Ordering::SeqCst) {
                    return Err(YaraError::Conflict(edge.referrer.clone()));
                }
            }
            self.inner.commit(changes)
        }
    }

    #[test]
    fn test_failed_referred_signup_leaves_no_account() {
        let store = Arc::new(BusyReferrerStore {
            inner: MemoryStore::new(),
            busy: std::sync::atomic::AtomicBool::new(false),
        });
        let economy = Economy::new(
            store.clone(),
            EconomyConfig::default(),
            Arc::new(ManualClock::new(0)),
            Arc::new(AlwaysConfirm),
        )
        .unwrap();
        let referrer = economy.create_account("tg-r", "rita", None).unwrap();

        store.busy.store(true, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(
            economy.create_account("tg-a", "alice", Some(referrer.referral_code.as_str())),
            Err(YaraError::Conflict(referrer.id.clone()))
        );
        assert_eq!(store.get_by_external_id("tg-a").unwrap(), None);
        assert_eq!(store.account_count().unwrap(), 1);
        assert_eq!(economy.account(&referrer.id).unwrap().balance, 0);

        store.busy.store(false, std::sync::atomic::Ordering::SeqCst);
        let referred = economy
            .create_account("tg-a", "alice", Some(referrer.referral_code.as_str()))
            .unwrap();
        assert_eq!(store.referrer_of(&referred.id).unwrap(), Some(referrer.id.clone()));
        assert_eq!(
            economy.account(&referrer.id).unwrap().balance,
            economy.config().referral.signup_bonus
        );
    }

    #[test]
    fn test_second_referrer_rejected() {
        let (economy, _) = economy();
        let r1 = economy.create_account("tg-1", "one", None).unwrap();
        let r2 = economy.create_account("tg-2", "two", None).unwrap();
        let a = economy.create_account("tg-a", "alice", Some(r1.referral_code.as_str())).unwrap();

        assert!(matches!(
            economy.add_referral_edge(r2.referral_code.as_str(), &a.id),
            Err(YaraError::InvalidReferral(_))
        ));
        assert!(matches!(
            economy.add_referral_edge(a.referral_code.as_str(), &a.id),
            Err(YaraError::InvalidReferral(_))
        ));
        assert_eq!(economy.account(&r2.id).unwrap().balance, 0);
    }

    #[test]
    fn test_claim_through_store() {
        let (economy, clock) = economy();
        let acc = economy.create_account("tg-1", "alice", None).unwrap();

        economy.claim(&acc.id).unwrap();
        clock.advance(std::time::Duration::from_secs(HOUR as u64));
        assert!(matches!(economy.claim(&acc.id), Err(YaraError::NotReady { .. })));

        let stored = economy.account(&acc.id).unwrap();
        assert_eq!(stored.balance, economy.config().claim.base_amount);
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn test_summary_timers() {
        let (economy, clock) = economy();
        let acc = economy.create_account("tg-1", "alice", None).unwrap();
        assert!(economy.summary(&acc.id).unwrap().claim_ready);

        clock.set(100);
        economy.claim(&acc.id).unwrap();
        let summary = economy.summary(&acc.id).unwrap();
        assert!(!summary.claim_ready);
        assert_eq!(summary.next_claim_at, Some(100 + 8 * HOUR));
        assert_eq!(summary.claim_reward, economy.config().claim.base_amount);
    }

    #[test]
    fn test_overview_is_read_only() {
        let (economy, _) = economy();
        let r = economy.create_account("tg-r", "rita", None).unwrap();
        let a = economy.create_account("tg-a", "alice", Some(r.referral_code.as_str())).unwrap();
        economy.claim(&a.id).unwrap();

        let first = economy.referral_overview(&r.id).unwrap();
        let second = economy.referral_overview(&r.id).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.entries.len(), 1);
        assert_eq!(first.total_claimable, economy.config().claim.base_amount / 4);
        assert_eq!(
            economy.account(&a.id).unwrap().daily_earnings,
            economy.config().claim.base_amount
        );
    }

    #[test]
    fn test_referral_claim_records_history() {
        let (economy, _) = economy();
        let r = economy.create_account("tg-r", "rita", None).unwrap();
        let a = economy.create_account("tg-a", "alice", Some(r.referral_code.as_str())).unwrap();
        let b = economy.create_account("tg-b", "bob", Some(r.referral_code.as_str())).unwrap();
        economy.claim(&a.id).unwrap();

        let harvest = economy.claim_referral_rewards(&r.id).unwrap();
        assert_eq!(harvest.shares.len(), 2);

        let history = economy.referral_claims(&r.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].referred, a.id);
        assert_eq!(history[0].amount, harvest.amount);
        assert_eq!(economy.account(&b.id).unwrap().daily_earnings, 0);
    }

    #[test]
    fn test_sweep_clears_expired_flags_in_batches() {
        let clock = Arc::new(ManualClock::new(13 * HOUR));
        let mut config = EconomyConfig::default();
        config.cipher.sweep_batch_limit = 2;
        config.cipher.sweep_min_interval_secs = 10 * 24 * HOUR as u64;
        let economy = Economy::new(
            Arc::new(MemoryStore::new()),
            config,
            clock.clone(),
            Arc::new(AlwaysConfirm),
        )
        .unwrap();

        let phrase = cipher::phrase_for(&economy.config().cipher, clock.now()).unwrap().to_string();
        let ids: Vec<AccountId> = (0..3)
            .map(|i| economy.create_account(&format!("tg-{i}"), "p", None).unwrap().id)
            .collect();
        for id in &ids {
            economy.solve_cipher(id, &phrase).unwrap();
        }

        clock.advance(std::time::Duration::from_secs(24 * HOUR as u64));
        // The first solve already swept rows 1-2, so the cursor sits before row 3.
        let first = economy.sweep_expired_ciphers().unwrap();
        assert_eq!(first.scanned, 1);
        assert_eq!(first.expired, 1);
        assert!(first.wrapped);

        let second = economy.sweep_expired_ciphers().unwrap();
        assert_eq!(second.scanned, 2);
        assert_eq!(second.expired, 2);
        assert!(!second.wrapped);

        for id in &ids {
            assert!(!economy.account(id).unwrap().cipher_solved);
        }
    }

    #[test]
    fn test_leaderboard() {
        let (economy, _) = economy();
        let a = economy.create_account("tg-a", "alice", None).unwrap();
        let b = economy.create_account("tg-b", "bob", None).unwrap();
        economy.set_game_points(&a.id, 10).unwrap();
        economy.set_game_points(&b.id, 99).unwrap();
        economy.claim(&a.id).unwrap();

        let by_points = economy.leaderboard(LeaderboardKind::GamePoints, 10).unwrap();
        assert_eq!(by_points[0].account, b.id);
        assert_eq!(by_points[0].score, 99);
        assert_eq!(by_points[1].rank, 2);

        let by_balance = economy.leaderboard(LeaderboardKind::Balance, 1).unwrap();
        assert_eq!(by_balance.len(), 1);
        assert_eq!(by_balance[0].account, a.id);
    }

    #[tokio::test]
    async fn test_external_task_needs_handle() {
        let (economy, _) = economy();
        let acc = economy.create_account("tg-1", "alice", None).unwrap();
        let task = TaskId::new("join-channel");

        assert!(matches!(
            economy.verify_task(&acc.id, &task, &TaskEvidence::default()).await,
            Err(YaraError::VerificationFailed(_))
        ));
        assert_eq!(economy.task_status(&acc.id, &task).unwrap().state(), TaskState::Incomplete);

        let verification = economy.verify_task(&acc.id, &task, &TaskEvidence::handle("42")).await.unwrap();
        assert!(verification.newly_completed);
        assert_eq!(economy.task_status(&acc.id, &task).unwrap().state(), TaskState::Completed);
    }
}
