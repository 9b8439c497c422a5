//! Points Ledger Models

use serde::{Deserialize, Serialize};

/// Ledger entry type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum TxType {
    Award,
    Adjustment,
}

/// Immutable ledger entry. The balance is the sum of all entries for
/// a (company, user) pair; the cached balance row is a projection,
/// never the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PointsTransaction {
    pub id: i64,
    pub company_id: i64,
    pub user_id: i64,
    pub tx_type: TxType,
    pub amount: i64,
    /// None for manual adjustments
    pub rule_id: Option<i64>,
    pub description: String,
    pub created_at: i64,
}

/// Materialized balance projection per (company, user)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PointsBalance {
    pub company_id: i64,
    pub user_id: i64,
    pub balance: i64,
    pub updated_at: i64,
}

/// Per-(rule, user) windowed state. Never user-visible directly;
/// callers only see the derived `RuleStatus` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct EligibilityRecord {
    pub id: i64,
    pub rule_id: i64,
    pub user_id: i64,
    pub awarded_count: i64,
    pub cooldown_until: Option<i64>,
    pub last_award_at: Option<i64>,
    pub last_period_end: Option<i64>,
    pub updated_at: i64,
}

impl EligibilityRecord {
    pub fn cooldown_active(&self, now: i64) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

/// One award produced by evaluating an event against a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAward {
    pub rule_id: i64,
    pub rule_type: String,
    pub amount: i64,
}

/// Outcome of processing a business event: zero or more independent
/// awards, plus the resulting balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    pub awards: Vec<RuleAward>,
    pub balance: i64,
}

/// Manual adjustment payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentCreate {
    pub company_id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub description: String,
}
