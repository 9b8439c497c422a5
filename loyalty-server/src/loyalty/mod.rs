//! Loyalty Card Engine
//!
//! Stamp-card lifecycle: template claim, one-time stamp confirmation
//! codes, sequential stamp issuance with completion detection, and
//! reward redemption.
//!
//! - [`CardEngine`] - claim/stamp/reward orchestration
//! - [`CodeIssuer`] - one-time redemption codes
//! - [`LoyaltyError`] - typed failures, all recoverable at the caller

mod card_engine;
mod code_issuer;

pub use card_engine::CardEngine;
pub use code_issuer::{CodeIssuer, REWARD_CODE_TTL_MS, STAMP_CODE_TTL_MS};

use thiserror::Error;

use crate::db::repository::RepoError;

/// Loyalty operation failures. Every variant maps to a structured API
/// response; none is fatal to the process.
#[derive(Debug, Error)]
pub enum LoyaltyError {
    #[error("Template {0} not found")]
    TemplateNotFound(i64),

    #[error("Card instance {0} not found")]
    InstanceNotFound(i64),

    #[error("Reward link {0} not found")]
    RewardNotFound(i64),

    #[error("Code not found")]
    CodeNotFound,

    #[error("Per-user limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Emission closed: {0}")]
    EmissionClosed(String),

    #[error("Card instance {0} is already complete")]
    InstanceCompleted(i64),

    #[error("Code expired")]
    CodeExpired,

    #[error("Code already used")]
    CodeAlreadyUsed,

    #[error("Reward {0} already redeemed")]
    RewardAlreadyUsed(i64),

    #[error("Rule not satisfied: {0}")]
    RuleNotSatisfied(String),

    #[error("Reward not reached: {0}")]
    RewardNotReached(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub type LoyaltyResult<T> = Result<T, LoyaltyError>;
