//! Card Instance & Stamp Models

use serde::{Deserialize, Serialize};

use super::template::CardTemplate;

/// One user's issued stamp card
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CardInstance {
    pub id: i64,
    pub template_id: i64,
    pub user_id: i64,
    pub issued_at: i64,
    pub expires_at: Option<i64>,
    /// Monotone, 0..=stamp_total; never decremented
    pub stamps_given: i32,
    /// Set exactly once, when stamps_given reaches stamp_total
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CardInstance {
    /// Live = not past its expiry (completed cards stay live as a
    /// historical record and still count toward per_user_limit until
    /// they expire)
    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// A single earned position on an instance. Numbered densely from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CardStamp {
    pub id: i64,
    pub instance_id: i64,
    pub stamp_no: i32,
    pub given_at: i64,
    pub given_by: Option<i64>,
}

/// Claim record linking a reached reward position to its redemption.
/// `used` transitions false -> true exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct RewardRedemption {
    /// The link_id used by the claim API
    pub id: i64,
    pub instance_id: i64,
    pub stamp_no: i32,
    pub used: bool,
    pub used_at: Option<i64>,
    pub created_at: i64,
}

/// Instance with template, stamps and redemptions embedded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardInstanceDetail {
    #[serde(flatten)]
    pub instance: CardInstance,
    pub template: CardTemplate,
    pub stamps: Vec<CardStamp>,
    pub redemptions: Vec<RewardRedemption>,
}

/// Result of redeeming a stamp code at point of sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampResult {
    pub instance_id: i64,
    pub stamp_no: i32,
    pub stamps_given: i32,
    pub stamp_total: i32,
    pub completed: bool,
}
