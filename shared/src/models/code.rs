//! Redemption Code Models

use serde::{Deserialize, Serialize};

/// What a redemption code is bound to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum CodeScope {
    /// Confirms a stamp at point of sale
    StampConfirm,
    /// Claims a completed reward
    RewardClaim,
}

/// One-time code row, bound to `(scope, resource_id, expires_at)`.
/// At most one live code exists per resource (partial unique index).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct RedemptionCode {
    pub id: i64,
    pub code: String,
    pub scope: CodeScope,
    pub resource_id: i64,
    pub expires_at: i64,
    pub consumed_at: Option<i64>,
    pub revoked_at: Option<i64>,
    pub is_live: bool,
    pub created_at: i64,
}

/// Code issuance response: `{code, expires_at, reused}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: i64,
    /// true when an unexpired, unconsumed code already existed and
    /// was returned instead of a fresh one
    pub reused: bool,
}
