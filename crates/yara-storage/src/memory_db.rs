//! In-memory account store
//!
//! A single `RwLock` guards every table, so a commit spanning several accounts
//! is validated and applied without any interleaving writer.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

use yara_core::prelude::*;

use crate::store::{AccountStore, ChangeSet};

#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) accounts: BTreeMap<AccountId, Account>,
    by_code: HashMap<ReferralCode, AccountId>,
    by_external: HashMap<String, AccountId>,
    pub(crate) edges: Vec<ReferralEdge>,
    outgoing: HashMap<AccountId, Vec<AccountId>>,
    referrer: HashMap<AccountId, AccountId>,
    pub(crate) task_progress: BTreeMap<(AccountId, TaskId), TaskProgress>,
    pub(crate) referral_claims: Vec<ReferralClaimRecord>,
}

impl Tables {
    fn insert_account(&mut self, account: Account) {
        self.by_code
            .insert(account.referral_code.clone(), account.id.clone());
        self.by_external
            .insert(account.external_id.clone(), account.id.clone());
        self.accounts.insert(account.id.clone(), account);
    }

    fn insert_edge(&mut self, edge: ReferralEdge) {
        self.outgoing
            .entry(edge.referrer.clone())
            .or_default()
            .push(edge.referred.clone());
        self.referrer
            .insert(edge.referred.clone(), edge.referrer.clone());
        self.edges.push(edge);
    }

    /// Rebuild from raw records, recreating every index
    pub(crate) fn from_records(
        accounts: Vec<Account>,
        edges: Vec<ReferralEdge>,
        task_progress: Vec<TaskProgress>,
        referral_claims: Vec<ReferralClaimRecord>,
    ) -> Self {
        let mut tables = Self::default();
        for account in accounts {
            tables.insert_account(account);
        }
        for edge in edges {
            tables.insert_edge(edge);
        }
        for progress in task_progress {
            tables
                .task_progress
                .insert((progress.account.clone(), progress.task.clone()), progress);
        }
        tables.referral_claims = referral_claims;
        tables
    }

    fn validate(&self, changes: &ChangeSet) -> Result<()> {
        let mut externals = HashSet::new();
        let mut codes = HashSet::new();
        let mut created = HashSet::new();
        for account in &changes.created {
            if self.by_external.contains_key(&account.external_id) || !externals.insert(&account.external_id) {
                return Err(YaraError::AccountExists(account.external_id.clone()));
            }
            if self.accounts.contains_key(&account.id)
                || self.by_code.contains_key(&account.referral_code)
                || !codes.insert(&account.referral_code)
                || !created.insert(&account.id)
            {
                return Err(YaraError::Conflict(account.id.clone()));
            }
        }

        let mut seen = HashSet::new();
        for staged in &changes.accounts {
            if created.contains(&staged.id) {
                return Err(YaraError::InvalidInput(format!(
                    "account {} both created and updated in one commit",
                    staged.id
                )));
            }
            if !seen.insert(&staged.id) {
                return Err(YaraError::InvalidInput(format!(
                    "account {} staged twice in one commit",
                    staged.id
                )));
            }
            let stored = self
                .accounts
                .get(&staged.id)
                .ok_or_else(|| YaraError::AccountNotFound(staged.id.clone()))?;
            if stored.version != staged.version {
                return Err(YaraError::Conflict(staged.id.clone()));
            }
            if stored.referral_code != staged.referral_code
                || stored.external_id != staged.external_id
            {
                return Err(YaraError::InvalidInput(format!(
                    "immutable identity fields changed on {}",
                    staged.id
                )));
            }
        }

        let mut newly_referred = HashSet::new();
        for edge in &changes.edges {
            if edge.referrer == edge.referred {
                return Err(YaraError::InvalidReferral(format!(
                    "{} cannot refer itself",
                    edge.referrer
                )));
            }
            for id in [&edge.referrer, &edge.referred] {
                if !self.accounts.contains_key(id) && !created.contains(id) {
                    return Err(YaraError::InvalidReferral(format!("unknown account {id}")));
                }
            }
            if self.referrer.contains_key(&edge.referred) || !newly_referred.insert(&edge.referred) {
                return Err(YaraError::InvalidReferral(format!(
                    "{} already has a referrer",
                    edge.referred
                )));
            }
        }

        for progress in &changes.task_progress {
            if !self.accounts.contains_key(&progress.account) && !created.contains(&progress.account) {
                return Err(YaraError::AccountNotFound(progress.account.clone()));
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for account in changes.created {
            self.insert_account(account);
        }
        for mut account in changes.accounts {
            account.version += 1;
            self.accounts.insert(account.id.clone(), account);
        }
        for edge in changes.edges {
            self.insert_edge(edge);
        }
        for progress in changes.task_progress {
            self.task_progress
                .insert((progress.account.clone(), progress.task.clone()), progress);
        }
        self.referral_claims.extend(changes.referral_claims);
    }
}

/// Account store held entirely in memory
pub struct MemoryStore {
    pub(crate) tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// All referral edges, in creation order
    pub fn edges(&self) -> Vec<ReferralEdge> {
        self.tables.read().edges.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for MemoryStore {
    fn get(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.tables.read().accounts.get(id).cloned())
    }

    fn get_by_code(&self, code: &ReferralCode) -> Result<Option<Account>> {
        let tables = self.tables.read();
        Ok(tables
            .by_code
            .get(code)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    fn get_by_external_id(&self, external_id: &str) -> Result<Option<Account>> {
        let tables = self.tables.read();
        Ok(tables
            .by_external
            .get(external_id)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    fn create(&self, account: Account) -> Result<Account> {
        let mut changes = ChangeSet::new();
        changes.create_account(account.clone());
        self.commit(changes)?;
        Ok(account)
    }

    fn referrals_of(&self, referrer: &AccountId) -> Result<Vec<AccountId>> {
        Ok(self
            .tables
            .read()
            .outgoing
            .get(referrer)
            .cloned()
            .unwrap_or_default())
    }

    fn referrer_of(&self, referred: &AccountId) -> Result<Option<AccountId>> {
        Ok(self.tables.read().referrer.get(referred).cloned())
    }

    fn task_progress(&self, account: &AccountId, task: &TaskId) -> Result<Option<TaskProgress>> {
        Ok(self
            .tables
            .read()
            .task_progress
            .get(&(account.clone(), task.clone()))
            .cloned())
    }

    fn referral_claims(&self, referrer: &AccountId) -> Result<Vec<ReferralClaimRecord>> {
        Ok(self
            .tables
            .read()
            .referral_claims
            .iter()
            .filter(|r| &r.referrer == referrer)
            .cloned()
            .collect())
    }

    fn scan_accounts(&self, after: Option<&AccountId>, limit: usize) -> Result<Vec<Account>> {
        use std::ops::Bound;

        let tables = self.tables.read();
        let lower = match after {
            Some(id) => Bound::Excluded(id.clone()),
            None => Bound::Unbounded,
        };
        Ok(tables
            .accounts
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, a)| a.clone())
            .collect())
    }

    fn top_accounts(&self, limit: usize, score: &dyn Fn(&Account) -> u64) -> Result<Vec<Account>> {
        let tables = self.tables.read();
        let mut ranked: Vec<&Account> = tables.accounts.values().collect();
        // Stable sort keeps id order among equal scores.
        ranked.sort_by(|a, b| score(b).cmp(&score(a)));
        Ok(ranked.into_iter().take(limit).cloned().collect())
    }

    fn account_count(&self) -> Result<usize> {
        Ok(self.tables.read().accounts.len())
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write();
        tables.validate(&changes)?;
        tables.apply(changes);
        Ok(())
    }
}
