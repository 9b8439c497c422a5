//! Business Event Model
//!
//! One inbound shape covers purchases, visits, digital actions and
//! geolocation pings; rule variants read the fields they care about
//! and ignore the rest.

use serde::{Deserialize, Serialize};

/// Inbound business event, from a purchase webhook or point of sale
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EarnEvent {
    pub company_id: i64,
    pub user_id: i64,
    /// Named event (event / digital_behavior rules)
    #[serde(default)]
    pub event_name: Option<String>,
    /// Purchase amount (value_spent, template stamp conditions)
    #[serde(default)]
    pub amount: Option<f64>,
    /// Category of the purchase (category rules)
    #[serde(default)]
    pub category_id: Option<i64>,
    /// Base points the purchase would earn before multipliers
    #[serde(default)]
    pub base_points: Option<i64>,
    /// Purchased item IDs (inventory rules)
    #[serde(default)]
    pub purchased_items: Vec<i64>,
    #[serde(default)]
    pub service_id: Option<i64>,
    /// Branch the event occurred at (geolocation rules)
    #[serde(default)]
    pub branch_id: Option<i64>,
    #[serde(default)]
    pub visit_count: Option<i32>,
    /// Unix millis; the server clock is used when absent
    #[serde(default)]
    pub occurred_at: Option<i64>,
}
