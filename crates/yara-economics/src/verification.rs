//! External membership verification
//!
//! Tasks of kind external-follow are completed only when an injected
//! [`MembershipVerifier`] confirms the player's membership. Production wires
//! [`TelegramVerifier`]; development and tests wire [`AlwaysConfirm`].
//! Every call is bounded by [`verify_with_timeout`].

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use yara_core::{Result, YaraError};

use crate::config::{VerificationConfig, VerificationMode};

/// Verifier errors
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("No handle supplied")]
    MissingHandle,

    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Platform rejected request: {0}")]
    Rejected(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Confirms a handle's membership of an external resource
#[async_trait]
pub trait MembershipVerifier: Send + Sync {
    /// Check whether `handle` is a member of `resource_url`
    async fn check_membership(
        &self,
        handle: &str,
        resource_url: &str,
    ) -> std::result::Result<bool, VerificationError>;

    /// Verifier name for logs
    fn name(&self) -> &str;
}

/// Confirms every check; for development and tests only
#[derive(Clone, Debug, Default)]
pub struct AlwaysConfirm;

#[async_trait]
impl MembershipVerifier for AlwaysConfirm {
    async fn check_membership(
        &self,
        _handle: &str,
        _resource_url: &str,
    ) -> std::result::Result<bool, VerificationError> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "always-confirm"
    }
}

/// Telegram Bot API membership lookup (`getChatMember`)
pub struct TelegramVerifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<ChatMember>,
}

#[derive(Deserialize)]
struct ChatMember {
    status: String,
}

/// Member statuses that count as joined
const MEMBER_STATUSES: [&str; 4] = ["creator", "administrator", "member", "restricted"];

impl TelegramVerifier {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        request_timeout: Duration,
    ) -> std::result::Result<Self, VerificationError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| VerificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    /// Chat id for a `t.me` link: `https://t.me/yara_official` -> `@yara_official`
    pub fn chat_id(resource_url: &str) -> std::result::Result<String, VerificationError> {
        let path = resource_url
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let name = path
            .strip_prefix("t.me/")
            .or_else(|| path.strip_prefix("telegram.me/"))
            .map(|rest| rest.trim_end_matches('/'))
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| VerificationError::UnsupportedResource(resource_url.to_string()))?;
        Ok(format!("@{}", name.trim_start_matches('@')))
    }
}

#[async_trait]
impl MembershipVerifier for TelegramVerifier {
    async fn check_membership(
        &self,
        handle: &str,
        resource_url: &str,
    ) -> std::result::Result<bool, VerificationError> {
        let chat_id = Self::chat_id(resource_url)?;
        let url = format!("{}/bot{}/getChatMember", self.api_base, self.bot_token);

        let response: ApiResponse = self
            .client
            .get(&url)
            .query(&[("chat_id", chat_id.as_str()), ("user_id", handle)])
            .send()
            .await
            .map_err(|e| VerificationError::Transport(e.without_url().to_string()))?
            .json()
            .await
            .map_err(|e| VerificationError::Transport(e.without_url().to_string()))?;

        if !response.ok {
            return Err(VerificationError::Rejected(
                response.description.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(response
            .result
            .map_or(false, |member| MEMBER_STATUSES.contains(&member.status.as_str())))
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Build the verifier selected by configuration
pub fn verifier_from_config(
    config: &VerificationConfig,
    request_timeout: Duration,
) -> Result<Arc<dyn MembershipVerifier>> {
    match config.mode {
        VerificationMode::AlwaysConfirm => {
            tracing::warn!("Membership verification disabled: every external task check is confirmed");
            Ok(Arc::new(AlwaysConfirm))
        }
        VerificationMode::Telegram => {
            let token = config
                .bot_token
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| YaraError::InvalidInput("verification.bot_token is required in telegram mode".into()))?;
            let verifier = TelegramVerifier::new(&config.api_base, token, request_timeout)
                .map_err(|e| YaraError::InvalidInput(e.to_string()))?;
            Ok(Arc::new(verifier))
        }
    }
}

/// Run one membership check under `timeout`
///
/// Only a confirmed membership returns `Ok`. A negative answer, a verifier
/// error or a timeout all surface as `VerificationFailed`.
pub async fn verify_with_timeout(
    verifier: &dyn MembershipVerifier,
    handle: Option<&str>,
    resource_url: &str,
    timeout: Duration,
) -> Result<()> {
    let handle = handle
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| YaraError::VerificationFailed(VerificationError::MissingHandle.to_string()))?;

    let outcome = tokio::time::timeout(timeout, verifier.check_membership(handle, resource_url))
        .await
        .map_err(|_| VerificationError::Timeout(timeout))
        .and_then(|result| result);

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => Err(YaraError::VerificationFailed(format!(
            "{handle} is not a member of {resource_url}"
        ))),
        Err(e) => Err(YaraError::VerificationFailed(format!("{}: {}", verifier.name(), e))),
    }
}
