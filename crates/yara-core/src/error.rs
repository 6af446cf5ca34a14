//! Error types for Yara economy operations

use crate::types::{AccountId, Balance, ItemId, TaskId, Timestamp};
use thiserror::Error;

/// Result type alias for Yara operations
pub type Result<T> = std::result::Result<T, YaraError>;

/// Errors that can occur in Yara economy operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum YaraError {
    // === Gates ===
    /// Cooldown has not elapsed yet
    #[error("Not ready until {ready_at}")]
    NotReady { ready_at: Timestamp },

    // === Lookups ===
    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Task not in the catalog
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Shop item not in the catalog
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// External identity already has an account
    #[error("Account already exists for {0}")]
    AccountExists(String),

    // === Referrals ===
    /// Unknown code, missing referred account or duplicate edge
    #[error("Invalid referral: {0}")]
    InvalidReferral(String),

    /// Referred pools hold nothing to harvest
    #[error("Nothing to claim")]
    NothingToClaim,

    // === Shop ===
    /// Balance does not cover the price
    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: Balance, available: Balance },

    /// One-time upgrade already owned
    #[error("Upgrade already purchased: {0}")]
    AlreadyPurchased(ItemId),

    // === Cipher ===
    /// Today's cipher already solved
    #[error("Cipher already solved")]
    AlreadySolved { next_at: Option<Timestamp> },

    /// Submission does not match the day's phrase
    #[error("Wrong cipher solution")]
    WrongSolution,

    // === Tasks ===
    /// Task not completed yet
    #[error("Task not completed: {0}")]
    NotCompleted(TaskId),

    /// Task reward already claimed
    #[error("Task already claimed: {0}")]
    AlreadyClaimed(TaskId),

    /// External verification did not confirm
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    // === Amounts ===
    /// Amount overflow or invalid configured value
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // === Storage ===
    /// Optimistic commit lost against a concurrent writer
    #[error("Concurrent update conflict on account {0}")]
    Conflict(AccountId),

    /// Storage error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // === General ===
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Fieldless classification of [`YaraError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotReady,
    NotFound,
    AccountExists,
    InvalidReferral,
    InsufficientBalance,
    AlreadyPurchased,
    AlreadySolved,
    WrongSolution,
    NothingToClaim,
    NotCompleted,
    AlreadyClaimed,
    VerificationFailed,
    InvalidAmount,
    Conflict,
    Storage,
    InvalidInput,
}

impl YaraError {
    /// Classification used by interface layers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::AccountNotFound(_) | Self::TaskNotFound(_) | Self::ItemNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::AccountExists(_) => ErrorKind::AccountExists,
            Self::InvalidReferral(_) => ErrorKind::InvalidReferral,
            Self::NothingToClaim => ErrorKind::NothingToClaim,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::AlreadyPurchased(_) => ErrorKind::AlreadyPurchased,
            Self::AlreadySolved { .. } => ErrorKind::AlreadySolved,
            Self::WrongSolution => ErrorKind::WrongSolution,
            Self::NotCompleted(_) => ErrorKind::NotCompleted,
            Self::AlreadyClaimed(_) => ErrorKind::AlreadyClaimed,
            Self::VerificationFailed(_) => ErrorKind::VerificationFailed,
            Self::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::StorageError(_) | Self::SerializationError(_) => ErrorKind::Storage,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self.kind() {
            ErrorKind::NotReady => 1001,
            ErrorKind::NotFound => 1002,
            ErrorKind::AccountExists => 1003,
            ErrorKind::InvalidReferral => 1004,
            ErrorKind::InsufficientBalance => 1005,
            ErrorKind::AlreadyPurchased => 1006,
            ErrorKind::AlreadySolved => 1007,
            ErrorKind::WrongSolution => 1008,
            ErrorKind::NothingToClaim => 1009,
            ErrorKind::NotCompleted => 1010,
            ErrorKind::AlreadyClaimed => 1011,
            ErrorKind::VerificationFailed => 1012,
            ErrorKind::InvalidAmount => 1013,
            ErrorKind::Conflict => 2001,
            ErrorKind::Storage => 2002,
            ErrorKind::InvalidInput => 9999,
        }
    }

    /// Check if retrying later may succeed without changing the request
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotReady { .. }
                | Self::Conflict(_)
                | Self::VerificationFailed(_)
                | Self::StorageError(_)
        )
    }
}
