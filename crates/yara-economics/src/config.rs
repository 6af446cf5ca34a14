//! Economy configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use yara_core::prelude::*;

use crate::constants::*;
use crate::shop::{default_catalog as default_shop_catalog, Currency, StoreItem};
use crate::tasks::{default_catalog as default_task_catalog, Task};

/// Complete economy configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Periodic base claim
    #[serde(default)]
    pub claim: ClaimConfig,

    /// Daily cipher bonus
    #[serde(default)]
    pub cipher: CipherConfig,

    /// Referral income
    #[serde(default)]
    pub referral: ReferralConfig,

    /// Task catalog and claim rules
    #[serde(default)]
    pub tasks: TaskConfig,

    /// Upgrade shop catalog
    #[serde(default)]
    pub shop: ShopConfig,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// External verification capability
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EconomyConfig {
    /// Reject configurations the engines cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.claim.base_amount == 0 {
            return Err(YaraError::InvalidAmount("claim.base_amount must be positive".into()));
        }
        if self.cipher.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(YaraError::InvalidInput("cipher.phrases must not be empty".into()));
        }
        if self.cipher.reset_hour_utc >= 24 {
            return Err(YaraError::InvalidInput(format!(
                "cipher.reset_hour_utc must be below 24, got {}",
                self.cipher.reset_hour_utc
            )));
        }
        if self.cipher.sweep_batch_limit == 0 {
            return Err(YaraError::InvalidInput("cipher.sweep_batch_limit must be positive".into()));
        }
        if self.referral.share_bps > BPS_DENOMINATOR {
            return Err(YaraError::InvalidAmount(format!(
                "referral.share_bps above 100%: {}",
                self.referral.share_bps
            )));
        }

        let mut item_ids = HashSet::new();
        for item in &self.shop.catalog {
            if !item_ids.insert(&item.id) {
                return Err(YaraError::InvalidInput(format!("duplicate shop item {}", item.id)));
            }
            if !item.multiplier.is_valid() {
                return Err(YaraError::InvalidAmount(format!(
                    "item {} multiplier {} is below 1.0x",
                    item.id, item.multiplier
                )));
            }
            if item.currency == Currency::Soft && item.price == 0 {
                return Err(YaraError::InvalidAmount(format!("item {} has no price", item.id)));
            }
        }

        let mut task_ids = HashSet::new();
        for task in &self.tasks.catalog {
            if !task_ids.insert(&task.id) {
                return Err(YaraError::InvalidInput(format!("duplicate task {}", task.id)));
            }
        }
        Ok(())
    }
}

/// Base claim configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// Amount credited per claim before the balance multiplier
    #[serde(default = "default_base_amount")]
    pub base_amount: Balance,

    /// Minimum time between claims in seconds
    #[serde(default = "default_claim_cooldown")]
    pub cooldown_secs: u64,
}

fn default_base_amount() -> Balance {
    BASE_CLAIM_AMOUNT
}

fn default_claim_cooldown() -> u64 {
    BASE_CLAIM_COOLDOWN_SECS
}

impl ClaimConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            base_amount: default_base_amount(),
            cooldown_secs: default_claim_cooldown(),
        }
    }
}

/// Daily cipher configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CipherConfig {
    /// Bonus credited for a correct solution
    #[serde(default = "default_cipher_bonus")]
    pub bonus_amount: Balance,

    /// UTC hour at which a new cipher day starts (0-23)
    #[serde(default = "default_reset_hour")]
    pub reset_hour_utc: u32,

    /// Secret phrases, rotated one per cipher day
    #[serde(default = "default_phrases")]
    pub phrases: Vec<String>,

    /// Maximum rows examined by one expiry sweep
    #[serde(default = "default_sweep_batch_limit")]
    pub sweep_batch_limit: usize,

    /// Minimum seconds between sweeps triggered by solve attempts (0 = every attempt)
    #[serde(default)]
    pub sweep_min_interval_secs: u64,
}

fn default_cipher_bonus() -> Balance {
    CIPHER_BONUS_AMOUNT
}

fn default_reset_hour() -> u32 {
    CIPHER_RESET_HOUR_UTC
}

fn default_phrases() -> Vec<String> {
    ["HELLOWORLD", "MOONSHOTS", "DIAMONDHANDS", "HODLSTRONG", "TOTHEMOON"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_sweep_batch_limit() -> usize {
    1_000
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            bonus_amount: default_cipher_bonus(),
            reset_hour_utc: default_reset_hour(),
            phrases: default_phrases(),
            sweep_batch_limit: default_sweep_batch_limit(),
            sweep_min_interval_secs: 0,
        }
    }
}

/// Referral income configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// Minimum time between referral harvests in seconds
    #[serde(default = "default_referral_cooldown")]
    pub cooldown_secs: u64,

    /// Referrer's share of each referred pool in basis points
    #[serde(default = "default_share_bps")]
    pub share_bps: u32,

    /// Inactivity after which a daily earnings pool restarts, in seconds
    #[serde(default = "default_earnings_window")]
    pub earnings_window_secs: u64,

    /// One-time bonus credited to the referrer when an edge is created
    #[serde(default = "default_signup_bonus")]
    pub signup_bonus: Balance,
}

fn default_referral_cooldown() -> u64 {
    REFERRAL_CLAIM_COOLDOWN_SECS
}

fn default_share_bps() -> u32 {
    REFERRAL_SHARE_BPS
}

fn default_earnings_window() -> u64 {
    EARNINGS_WINDOW_SECS
}

fn default_signup_bonus() -> Balance {
    REFERRAL_SIGNUP_BONUS
}

impl ReferralConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn earnings_window(&self) -> Duration {
        Duration::from_secs(self.earnings_window_secs)
    }
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_referral_cooldown(),
            share_bps: default_share_bps(),
            earnings_window_secs: default_earnings_window(),
            signup_bonus: default_signup_bonus(),
        }
    }
}

/// Task configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Delay between completion and a permitted reward claim, in seconds
    #[serde(default = "default_task_claim_delay")]
    pub claim_delay_secs: u64,

    /// Upper bound on one external verification call, in milliseconds
    #[serde(default = "default_verification_timeout")]
    pub verification_timeout_ms: u64,

    /// Task catalog
    #[serde(default = "default_task_catalog")]
    pub catalog: Vec<Task>,
}

fn default_task_claim_delay() -> u64 {
    TASK_CLAIM_DELAY_SECS
}

fn default_verification_timeout() -> u64 {
    VERIFICATION_TIMEOUT_MS
}

impl TaskConfig {
    pub fn claim_delay(&self) -> Duration {
        Duration::from_secs(self.claim_delay_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            claim_delay_secs: default_task_claim_delay(),
            verification_timeout_ms: default_verification_timeout(),
            catalog: default_task_catalog(),
        }
    }
}

/// Shop configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShopConfig {
    /// Items for sale
    #[serde(default = "default_shop_catalog")]
    pub catalog: Vec<StoreItem>,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            catalog: default_shop_catalog(),
        }
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Retries after an optimistic commit conflict
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,

    /// Snapshot file used by the CLI
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

fn default_commit_retries() -> u32 {
    8
}

fn default_snapshot_path() -> String {
    "~/.yara/yara.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            commit_retries: default_commit_retries(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// Which membership verifier to wire in
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMode {
    /// Confirm every check (development and tests)
    #[default]
    AlwaysConfirm,
    /// Telegram Bot API membership lookup
    Telegram,
}

/// External verification configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default)]
    pub mode: VerificationMode,

    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bot token, required in telegram mode
    pub bot_token: Option<String>,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            mode: VerificationMode::default(),
            api_base: default_api_base(),
            bot_token: None,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
