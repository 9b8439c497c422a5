//! Points Rule Models
//!
//! The rule taxonomy is a closed set: each `rule_type` has its own
//! config shape, represented as one variant of [`RuleConfig`]. The
//! evaluator matches exhaustively, so adding a rule type is a
//! compile-time exercise. Malformed configs are rejected when a rule
//! is created, never silently skipped at evaluation time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rule configuration, adjacently tagged so the wire shape is
/// `{"rule_type": "...", "config": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "rule_type", content = "config", rename_all = "snake_case")]
pub enum RuleConfig {
    /// `floor(amount / step) * points` on every spend event
    ValueSpent { step: f64, points: i64 },
    /// Fixed points when a named event fires
    Event { event_name: String, points: i64 },
    /// Bonus when `threshold` qualifying events land in a trailing
    /// window, then a cooldown before the next award
    Frequency {
        threshold: u32,
        window_days: u32,
        bonus_points: i64,
        cooldown_days: u32,
    },
    /// Multiplier on base points for purchases in listed categories
    Category { categories: Vec<i64>, multiplier: f64 },
    /// One-shot bonus on the user's first qualifying event
    FirstPurchase { bonus_points: i64 },
    /// Bonus after N consecutive periods each meeting a threshold
    Recurrence {
        consecutive_periods: u32,
        period_days: u32,
        threshold_per_period: u32,
        bonus_points: i64,
        #[serde(default)]
        cooldown_days: Option<u32>,
    },
    /// Fixed points per occurrence of a listed digital event
    DigitalBehavior { events: Vec<String>, points: i64 },
    /// Multiplier on base points when `now` falls on a calendar date
    /// (`MM-DD`) inside the campaign window
    SpecialDate {
        date: String,
        start: i64,
        end: i64,
        multiplier: f64,
    },
    /// Fixed points for events at a specific branch
    Geolocation { branch_id: i64, points: i64 },
    /// Multiplier on base points for listed inventory items
    Inventory { item_ids: Vec<i64>, multiplier: f64 },
}

/// Validation failure for a rule config payload
#[derive(Debug, Error)]
pub enum RuleConfigError {
    #[error("Malformed rule config: {0}")]
    Malformed(String),

    #[error("Invalid rule config: {0}")]
    Invalid(String),
}

impl RuleConfig {
    /// The `rule_type` discriminant as stored in the DB
    pub fn rule_type(&self) -> &'static str {
        match self {
            RuleConfig::ValueSpent { .. } => "value_spent",
            RuleConfig::Event { .. } => "event",
            RuleConfig::Frequency { .. } => "frequency",
            RuleConfig::Category { .. } => "category",
            RuleConfig::FirstPurchase { .. } => "first_purchase",
            RuleConfig::Recurrence { .. } => "recurrence",
            RuleConfig::DigitalBehavior { .. } => "digital_behavior",
            RuleConfig::SpecialDate { .. } => "special_date",
            RuleConfig::Geolocation { .. } => "geolocation",
            RuleConfig::Inventory { .. } => "inventory",
        }
    }

    /// Rule types whose awards depend on per-user eligibility state
    /// (one-shot or cooldown semantics). Only these answer the
    /// `already_awarded` status check meaningfully.
    pub fn has_eligibility_state(&self) -> bool {
        matches!(
            self,
            RuleConfig::Frequency { .. }
                | RuleConfig::FirstPurchase { .. }
                | RuleConfig::Recurrence { .. }
        )
    }

    /// Rule types that log qualifying events for window counting
    pub fn tracks_events(&self) -> bool {
        matches!(
            self,
            RuleConfig::Frequency { .. } | RuleConfig::Recurrence { .. }
        )
    }

    /// Semantic validation, applied at rule creation
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        match self {
            RuleConfig::ValueSpent { step, points } => {
                if *step <= 0.0 {
                    return Err(RuleConfigError::Invalid("step must be > 0".into()));
                }
                if *points <= 0 {
                    return Err(RuleConfigError::Invalid("points must be > 0".into()));
                }
            }
            RuleConfig::Event { event_name, points } => {
                if event_name.is_empty() {
                    return Err(RuleConfigError::Invalid("event_name must not be empty".into()));
                }
                if *points <= 0 {
                    return Err(RuleConfigError::Invalid("points must be > 0".into()));
                }
            }
            RuleConfig::Frequency {
                threshold,
                window_days,
                bonus_points,
                ..
            } => {
                if *threshold == 0 || *window_days == 0 {
                    return Err(RuleConfigError::Invalid(
                        "threshold and window_days must be >= 1".into(),
                    ));
                }
                if *bonus_points <= 0 {
                    return Err(RuleConfigError::Invalid("bonus_points must be > 0".into()));
                }
            }
            RuleConfig::Category {
                categories,
                multiplier,
            } => {
                if categories.is_empty() {
                    return Err(RuleConfigError::Invalid("categories must not be empty".into()));
                }
                if *multiplier <= 0.0 {
                    return Err(RuleConfigError::Invalid("multiplier must be > 0".into()));
                }
            }
            RuleConfig::FirstPurchase { bonus_points } => {
                if *bonus_points <= 0 {
                    return Err(RuleConfigError::Invalid("bonus_points must be > 0".into()));
                }
            }
            RuleConfig::Recurrence {
                consecutive_periods,
                period_days,
                threshold_per_period,
                bonus_points,
                ..
            } => {
                if *consecutive_periods == 0 || *period_days == 0 || *threshold_per_period == 0 {
                    return Err(RuleConfigError::Invalid(
                        "consecutive_periods, period_days and threshold_per_period must be >= 1"
                            .into(),
                    ));
                }
                if *bonus_points <= 0 {
                    return Err(RuleConfigError::Invalid("bonus_points must be > 0".into()));
                }
            }
            RuleConfig::DigitalBehavior { events, points } => {
                if events.is_empty() {
                    return Err(RuleConfigError::Invalid("events must not be empty".into()));
                }
                if *points <= 0 {
                    return Err(RuleConfigError::Invalid("points must be > 0".into()));
                }
            }
            RuleConfig::SpecialDate {
                date,
                start,
                end,
                multiplier,
            } => {
                if chrono::NaiveDate::parse_from_str(&format!("2024-{date}"), "%Y-%m-%d").is_err() {
                    return Err(RuleConfigError::Invalid(format!(
                        "date must be MM-DD, got '{date}'"
                    )));
                }
                if end <= start {
                    return Err(RuleConfigError::Invalid("end must be after start".into()));
                }
                if *multiplier <= 0.0 {
                    return Err(RuleConfigError::Invalid("multiplier must be > 0".into()));
                }
            }
            RuleConfig::Geolocation { points, .. } => {
                if *points <= 0 {
                    return Err(RuleConfigError::Invalid("points must be > 0".into()));
                }
            }
            RuleConfig::Inventory {
                item_ids,
                multiplier,
            } => {
                if item_ids.is_empty() {
                    return Err(RuleConfigError::Invalid("item_ids must not be empty".into()));
                }
                if *multiplier <= 0.0 {
                    return Err(RuleConfigError::Invalid("multiplier must be > 0".into()));
                }
            }
        }
        Ok(())
    }

    /// Rebuild from the two DB columns (`rule_type` TEXT, `config` JSON TEXT)
    pub fn from_parts(rule_type: &str, config_json: &str) -> Result<Self, RuleConfigError> {
        let config: serde_json::Value = serde_json::from_str(config_json)
            .map_err(|e| RuleConfigError::Malformed(format!("config is not JSON: {e}")))?;
        serde_json::from_value(serde_json::json!({
            "rule_type": rule_type,
            "config": config,
        }))
        .map_err(|e| RuleConfigError::Malformed(e.to_string()))
    }

    /// Split into the two DB columns (`rule_type`, `config` JSON text)
    pub fn to_parts(&self) -> Result<(String, String), RuleConfigError> {
        let value = serde_json::to_value(self)
            .map_err(|e| RuleConfigError::Malformed(e.to_string()))?;
        let config = value
            .get("config")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        let config_json = serde_json::to_string(&config)
            .map_err(|e| RuleConfigError::Malformed(e.to_string()))?;
        Ok((self.rule_type().to_string(), config_json))
    }
}

/// Points rule entity. Wire shape: `{id, rule_type, config, order, active, ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsRule {
    pub id: i64,
    pub company_id: i64,
    #[serde(flatten)]
    pub config: RuleConfig,
    pub order: i32,
    pub active: bool,
    pub visible: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create rule payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsRuleCreate {
    pub company_id: i64,
    #[serde(flatten)]
    pub config: RuleConfig,
    pub order: Option<i32>,
    pub visible: Option<bool>,
}

/// Update rule payload. A new `rule_type`/`config` pair replaces the
/// config wholesale (no partial config merge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsRuleUpdate {
    #[serde(flatten)]
    pub config: Option<RuleConfig>,
    pub order: Option<i32>,
    pub active: Option<bool>,
    pub visible: Option<bool>,
}

/// Eligibility view for one-shot/cooldown rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleStatus {
    pub already_awarded: bool,
    pub message: String,
}
