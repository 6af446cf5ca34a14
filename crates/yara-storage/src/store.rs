//! Account store contract and the atomic commit unit

use yara_core::prelude::*;

/// Everything one engine operation writes, applied all-or-nothing
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    /// Accounts inserted by this commit
    pub created: Vec<Account>,

    /// Modified accounts, each carrying the version it was read at
    pub accounts: Vec<Account>,

    /// New referral edges
    pub edges: Vec<ReferralEdge>,

    /// Created or updated task progress
    pub task_progress: Vec<TaskProgress>,

    /// Referral harvest history entries
    pub referral_claims: Vec<ReferralClaimRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an account write, replacing an earlier staging of the same id
    pub fn put_account(&mut self, account: Account) {
        match self.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(slot) => *slot = account,
            None => self.accounts.push(account),
        }
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.put_account(account);
        self
    }

    /// Stage a brand-new account; edges in the same set may reference it
    pub fn create_account(&mut self, account: Account) {
        self.created.push(account);
    }

    pub fn add_edge(&mut self, edge: ReferralEdge) {
        self.edges.push(edge);
    }

    pub fn put_task_progress(&mut self, progress: TaskProgress) {
        self.task_progress.push(progress);
    }

    pub fn add_referral_claim(&mut self, record: ReferralClaimRecord) {
        self.referral_claims.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.accounts.is_empty()
            && self.edges.is_empty()
            && self.task_progress.is_empty()
            && self.referral_claims.is_empty()
    }
}

/// Persistent account records keyed by id, referral code and external identity
pub trait AccountStore: Send + Sync {
    /// Load an account by id
    fn get(&self, id: &AccountId) -> Result<Option<Account>>;

    /// Load an account by its referral code
    fn get_by_code(&self, code: &ReferralCode) -> Result<Option<Account>>;

    /// Load an account by its external platform identity
    fn get_by_external_id(&self, external_id: &str) -> Result<Option<Account>>;

    /// Insert a new account
    ///
    /// Fails with `AccountExists` for a taken external identity and with
    /// `Conflict` for a taken id or referral code.
    fn create(&self, account: Account) -> Result<Account>;

    /// Accounts referred by `referrer`, in edge creation order
    fn referrals_of(&self, referrer: &AccountId) -> Result<Vec<AccountId>>;

    /// The account that referred `referred`, if any
    fn referrer_of(&self, referred: &AccountId) -> Result<Option<AccountId>>;

    /// Progress of one task for one account
    fn task_progress(&self, account: &AccountId, task: &TaskId) -> Result<Option<TaskProgress>>;

    /// Referral harvest history of `referrer`, oldest first
    fn referral_claims(&self, referrer: &AccountId) -> Result<Vec<ReferralClaimRecord>>;

    /// Up to `limit` accounts ordered by id, strictly after `after`
    fn scan_accounts(&self, after: Option<&AccountId>, limit: usize) -> Result<Vec<Account>>;

    /// Top `limit` accounts by descending `score`, ties by id
    fn top_accounts(&self, limit: usize, score: &dyn Fn(&Account) -> u64) -> Result<Vec<Account>>;

    /// Number of stored accounts
    fn account_count(&self) -> Result<usize>;

    /// Apply a change set atomically
    ///
    /// Every staged account must still be at the version it was read at;
    /// otherwise nothing is applied and `Conflict` names the stale account.
    /// Created accounts are checked like `create`.
    fn commit(&self, changes: ChangeSet) -> Result<()>;
}

/// Run a read-modify-write operation, retrying on commit conflicts
///
/// `op` reads what it needs from the store and returns its result plus the
/// changes to commit. Engine errors abort without retry.
pub fn transact<S, T, F>(store: &S, retries: u32, mut op: F) -> Result<T>
where
    S: AccountStore + ?Sized,
    F: FnMut(&S) -> Result<(T, ChangeSet)>,
{
    let mut attempt = 0;
    loop {
        let (value, changes) = op(store)?;
        if changes.is_empty() {
            return Ok(value);
        }
        match store.commit(changes) {
            Ok(()) => return Ok(value),
            Err(YaraError::Conflict(id)) if attempt < retries => {
                attempt += 1;
                tracing::debug!(account = %id, attempt, "commit conflict, retrying");
            }
            Err(YaraError::Conflict(id)) => {
                tracing::warn!(account = %id, retries, "commit conflict, retries exhausted");
                return Err(YaraError::Conflict(id));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::cell::Cell;

    fn seed(store: &MemoryStore, id: &str) -> Account {
        store
            .create(Account::new(
                AccountId::new(id),
                format!("ext-{id}"),
                id,
                ReferralCode::generate(),
                0,
            ))
            .unwrap()
    }

    #[test]
    fn test_put_account_replaces_same_id() {
        let store = MemoryStore::new();
        let mut acc = seed(&store, "a");
        let mut changes = ChangeSet::new();
        changes.put_account(acc.clone());
        acc.balance = 7;
        changes.put_account(acc);
        assert_eq!(changes.accounts.len(), 1);
        assert_eq!(changes.accounts[0].balance, 7);
    }

    #[test]
    fn test_transact_retries_after_conflict() {
        let store = MemoryStore::new();
        seed(&store, "a");
        let id = AccountId::new("a");
        let attempts = Cell::new(0);

        let balance = transact(&store, 3, |s| {
            attempts.set(attempts.get() + 1);
            let mut acc = s.get(&id)?.ok_or_else(|| YaraError::AccountNotFound(id.clone()))?;
            if attempts.get() == 1 {
                // A concurrent writer lands between our read and commit.
                let mut other = acc.clone();
                other.balance += 100;
                s.commit(ChangeSet::new().with_account(other))?;
            }
            acc.credit(10)?;
            Ok((acc.balance, ChangeSet::new().with_account(acc)))
        })
        .unwrap();

        assert_eq!(attempts.get(), 2);
        assert_eq!(balance, 110);
        assert_eq!(store.get(&id).unwrap().unwrap().balance, 110);
    }

    #[test]
    fn test_transact_gives_up() {
        let store = MemoryStore::new();
        let stale = seed(&store, "a");
        store
            .commit(ChangeSet::new().with_account(stale.clone()))
            .unwrap();

        let result = transact(&store, 2, |_| Ok(((), ChangeSet::new().with_account(stale.clone()))));
        assert!(matches!(result, Err(YaraError::Conflict(_))));
    }

    #[test]
    fn test_transact_propagates_engine_errors() {
        let store = MemoryStore::new();
        let result: Result<()> = transact(&store, 5, |_| Err(YaraError::NothingToClaim));
        assert_eq!(result, Err(YaraError::NothingToClaim));
    }
}
