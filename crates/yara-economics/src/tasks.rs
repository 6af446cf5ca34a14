//! # Tasks
//!
//! One-time objectives with a fixed reward. Per account and task:
//!
//! ```text
//!   Incomplete ──verify──► Completed ──claim (≥ delay later)──► Claimed
//! ```
//!
//! No transition goes back. Requirements that depend only on local state
//! (referral count, balance) are decided here; external-follow requirements
//! are decided by the injected membership verifier in the service layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use yara_core::prelude::*;

/// Catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub reward_amount: Balance,
    pub requirement: TaskKind,
}

/// What completes a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskKind {
    /// Number of accounts referred
    ReferralCount { required_count: usize },
    /// Membership of an external channel or group
    ExternalFollow { url: String },
    /// Balance reached
    BalanceMilestone { required_balance: Balance },
}

/// Tasks offered when no catalog is configured
pub fn default_catalog() -> Vec<Task> {
    vec![
        Task {
            id: TaskId::new("invite-3-friends"),
            title: "Invite 3 friends".into(),
            reward_amount: 5_000 * ONE_YARA,
            requirement: TaskKind::ReferralCount { required_count: 3 },
        },
        Task {
            id: TaskId::new("join-channel"),
            title: "Join the Yara channel".into(),
            reward_amount: 2_000 * ONE_YARA,
            requirement: TaskKind::ExternalFollow {
                url: "https://t.me/yara_official".into(),
            },
        },
        Task {
            id: TaskId::new("reach-100k"),
            title: "Hold 100,000 YARA".into(),
            reward_amount: 10_000 * ONE_YARA,
            requirement: TaskKind::BalanceMilestone {
                required_balance: 100_000 * ONE_YARA,
            },
        },
    ]
}

/// Caller-supplied proof for a verification
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvidence {
    /// Handle at the external platform, for external-follow tasks
    pub handle: Option<String>,
}

impl TaskEvidence {
    pub fn handle(handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
        }
    }
}

/// Outcome of the local requirement check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequirementCheck {
    Met,
    Unmet,
    /// Needs the membership verifier for this resource
    External { url: String },
}

/// Outcome of a verification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskVerification {
    pub task: TaskId,
    pub completed: bool,
    /// True only for the verification that completed the task
    pub newly_completed: bool,
}

/// Outcome of a reward claim
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskClaimReceipt {
    pub task: TaskId,
    pub reward: Balance,
    pub new_balance: Balance,
}

/// Look up a catalog entry
pub fn find_task<'a>(catalog: &'a [Task], id: &TaskId) -> Result<&'a Task> {
    catalog
        .iter()
        .find(|task| &task.id == id)
        .ok_or_else(|| YaraError::TaskNotFound(id.clone()))
}

/// Decide the requirements that only need local state
pub fn check_requirement(task: &Task, account: &Account, referral_count: usize) -> RequirementCheck {
    let met = match &task.requirement {
        TaskKind::ReferralCount { required_count } => referral_count >= *required_count,
        TaskKind::BalanceMilestone { required_balance } => account.balance >= *required_balance,
        TaskKind::ExternalFollow { url } => return RequirementCheck::External { url: url.clone() },
    };
    if met {
        RequirementCheck::Met
    } else {
        RequirementCheck::Unmet
    }
}

/// Record a verification outcome on `progress`
pub fn apply_verification(progress: &mut TaskProgress, met: bool, now: Timestamp) -> TaskVerification {
    let newly_completed = met && progress.mark_completed(now);
    TaskVerification {
        task: progress.task.clone(),
        completed: progress.completed,
        newly_completed,
    }
}

/// Pay out a completed task
///
/// Checks run in order: not completed, already claimed, then the claim delay
/// after completion (`NotReady`).
pub fn claim_task(
    account: &mut Account,
    progress: &mut TaskProgress,
    task: &Task,
    claim_delay: Duration,
    now: Timestamp,
) -> Result<TaskClaimReceipt> {
    match progress.state() {
        TaskState::Incomplete => return Err(YaraError::NotCompleted(task.id.clone())),
        TaskState::Claimed => return Err(YaraError::AlreadyClaimed(task.id.clone())),
        TaskState::Completed => {}
    }
    cooldown::ensure_ready(progress.completed_at, claim_delay, now)?;

    let mut updated = account.clone();
    let new_balance = updated.credit(task.reward_amount)?;
    progress.mark_claimed(now)?;
    *account = updated;

    Ok(TaskClaimReceipt {
        task: task.id.clone(),
        reward: task.reward_amount,
        new_balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(60);

    fn account() -> Account {
        Account::new(AccountId::new("a"), "tg-a", "alice", ReferralCode::generate(), 0)
    }

    fn task(id: &str) -> Task {
        find_task(&default_catalog(), &TaskId::new(id)).unwrap().clone()
    }

    fn completed_at(at: Timestamp) -> TaskProgress {
        let mut progress = TaskProgress::new(AccountId::new("a"), TaskId::new("reach-100k"));
        progress.mark_completed(at);
        progress
    }

    #[test]
    fn test_referral_count_requirement() {
        let task = task("invite-3-friends");
        assert_eq!(check_requirement(&task, &account(), 2), RequirementCheck::Unmet);
        assert_eq!(check_requirement(&task, &account(), 3), RequirementCheck::Met);
    }

    #[test]
    fn test_balance_milestone_requirement() {
        let task = task("reach-100k");
        let mut acc = account();
        acc.balance = 100_000 * ONE_YARA - 1;
        assert_eq!(check_requirement(&task, &acc, 0), RequirementCheck::Unmet);
        acc.balance += 1;
        assert_eq!(check_requirement(&task, &acc, 0), RequirementCheck::Met);
    }

    #[test]
    fn test_external_requirement_is_deferred() {
        assert_eq!(
            check_requirement(&task("join-channel"), &account(), 10),
            RequirementCheck::External {
                url: "https://t.me/yara_official".into()
            }
        );
    }

    #[test]
    fn test_reverification_is_noop() {
        let mut progress = TaskProgress::new(AccountId::new("a"), TaskId::new("t"));
        assert!(!apply_verification(&mut progress, false, 5).completed);

        let first = apply_verification(&mut progress, true, 10);
        assert!(first.completed && first.newly_completed);

        let again = apply_verification(&mut progress, true, 20);
        assert!(again.completed);
        assert!(!again.newly_completed);
        assert_eq!(progress.completed_at, Some(10));

        // Completion is monotonic even if the requirement stops holding.
        assert!(apply_verification(&mut progress, false, 30).completed);
    }

    #[test]
    fn test_claim_before_completion() {
        let mut acc = account();
        let mut progress = TaskProgress::new(AccountId::new("a"), TaskId::new("reach-100k"));
        assert_eq!(
            claim_task(&mut acc, &mut progress, &task("reach-100k"), DELAY, 1_000),
            Err(YaraError::NotCompleted(TaskId::new("reach-100k")))
        );
    }

    #[test]
    fn test_claim_waits_for_delay() {
        let mut acc = account();
        let mut progress = completed_at(100);

        assert_eq!(
            claim_task(&mut acc, &mut progress, &task("reach-100k"), DELAY, 159),
            Err(YaraError::NotReady { ready_at: 160 })
        );
        assert_eq!(acc.balance, 0);
        assert_eq!(progress.state(), TaskState::Completed);

        let receipt = claim_task(&mut acc, &mut progress, &task("reach-100k"), DELAY, 160).unwrap();
        assert_eq!(receipt.reward, 10_000 * ONE_YARA);
        assert_eq!(acc.balance, 10_000 * ONE_YARA);
        assert_eq!(progress.claimed_at, Some(160));
    }

    #[test]
    fn test_claim_only_once() {
        let mut acc = account();
        let mut progress = completed_at(0);
        claim_task(&mut acc, &mut progress, &task("reach-100k"), DELAY, 60).unwrap();

        assert_eq!(
            claim_task(&mut acc, &mut progress, &task("reach-100k"), DELAY, 600),
            Err(YaraError::AlreadyClaimed(TaskId::new("reach-100k")))
        );
        assert_eq!(acc.balance, 10_000 * ONE_YARA);
    }

    #[test]
    fn test_task_kind_toml_shape() {
        let task: Task = toml::from_str(
            r#"
            id = "join"
            title = "Join"
            reward_amount = 10
            requirement = { kind = "external-follow", url = "https://t.me/x" }
            "#,
        )
        .unwrap();
        assert_eq!(
            task.requirement,
            TaskKind::ExternalFollow {
                url: "https://t.me/x".into()
            }
        );
    }
}
