//! # Yara Core
//!
//! Core data structures for the Yara play-money game economy.
//!
//! This crate provides the building blocks shared by storage and the engines:
//! - `Account` - A player's persistent state (balance, cooldowns, multipliers)
//! - `ReferralEdge` / `TaskProgress` - Lazily created relationship records
//! - `Multiplier` - Exact basis-point reward scaling
//! - `Clock` - Injectable time source
//! - `cooldown` - The Cooldown Gate used by every timed action
//!
//! ## Time-gated actions
//!
//! ```text
//!   base claim ──────── 8h ───────► claim again
//!   referral harvest ── 24h ──────► harvest again
//!   task completed ──── 1 min ────► reward claimable
//!   cipher solved ───── next 12:00 UTC ──► new cipher
//! ```

pub mod account;
pub mod clock;
pub mod cooldown;
pub mod error;
pub mod types;

pub use account::*;
pub use clock::*;
pub use error::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::{
        Account, PremiumPurchase, ReferralClaimRecord, ReferralEdge, TaskProgress, TaskState,
    };
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::cooldown;
    pub use crate::error::{ErrorKind, Result, YaraError};
    pub use crate::types::*;
}
