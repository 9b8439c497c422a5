//! Stamp-Card Template Models

use serde::{Deserialize, Serialize};

use super::rule::RuleConfig;

/// Company-defined stamp-card blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CardTemplate {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    /// Stamps required to complete a card, >= 1
    pub stamp_total: i32,
    /// Max live instances per user
    pub per_user_limit: i32,
    pub emission_start: Option<i64>,
    pub emission_end: Option<i64>,
    /// Global cap on issued instances, None = unlimited
    pub emission_limit: Option<i64>,
    /// Instance lifetime in days from claim, None = never expires
    pub instance_ttl_days: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// RewardMap entry: stamp position -> reward
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct TemplateReward {
    pub id: i64,
    pub template_id: i64,
    /// Position in [1, stamp_total], at most one reward per position
    pub stamp_no: i32,
    pub description: String,
}

/// Stamp-earning condition attached to a template, checked against
/// the point-of-sale payload when a stamp code is redeemed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRule {
    pub id: i64,
    pub template_id: i64,
    #[serde(flatten)]
    pub config: RuleConfig,
    pub position: i32,
}

/// Reward input when creating a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRewardInput {
    pub stamp_no: i32,
    pub description: String,
}

/// Create template payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardTemplateCreate {
    pub company_id: i64,
    pub name: String,
    pub stamp_total: i32,
    pub per_user_limit: Option<i32>,
    pub emission_start: Option<i64>,
    pub emission_end: Option<i64>,
    pub emission_limit: Option<i64>,
    pub instance_ttl_days: Option<i64>,
    #[serde(default)]
    pub rewards: Vec<TemplateRewardInput>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Update template payload. `stamp_total` is immutable once instances
/// may exist; rewards/rules are replaced wholesale when provided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardTemplateUpdate {
    pub name: Option<String>,
    pub per_user_limit: Option<i32>,
    pub emission_start: Option<i64>,
    pub emission_end: Option<i64>,
    pub emission_limit: Option<i64>,
    pub instance_ttl_days: Option<i64>,
    pub is_active: Option<bool>,
}

/// Template with rewards and rules (detail/config views)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardTemplateDetail {
    #[serde(flatten)]
    pub template: CardTemplate,
    pub rewards: Vec<TemplateReward>,
    pub rules: Vec<TemplateRule>,
}
