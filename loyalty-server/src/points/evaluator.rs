//! Rule Evaluator
//!
//! Pure function of `(config, event, snapshot, now)`. All DB reads
//! happen before the call (the snapshot), all writes after it, so
//! the award logic itself is trivially testable.

use chrono::{TimeZone, Utc};

use shared::models::{EarnEvent, EligibilityRecord, RuleConfig};
use shared::util::DAY_MS;

/// Per-user state read before evaluation. `window_count` and
/// `period_counts` already include the incoming event.
#[derive(Debug, Default)]
pub struct EligibilitySnapshot {
    pub record: Option<EligibilityRecord>,
    /// Qualifying events in the trailing window (frequency rules)
    pub window_count: i64,
    /// Per-period counts, most recent period first (recurrence rules)
    pub period_counts: Vec<i64>,
}

impl EligibilitySnapshot {
    fn cooldown_active(&self, now: i64) -> bool {
        self.record.as_ref().is_some_and(|r| r.cooldown_active(now))
    }

    fn ever_awarded(&self) -> bool {
        self.record.as_ref().is_some_and(|r| r.awarded_count > 0)
    }
}

/// A positive evaluation: the amount plus the eligibility-state
/// updates the engine must persist alongside the ledger entry
#[derive(Debug, PartialEq, Eq)]
pub struct AwardOutcome {
    pub amount: i64,
    pub cooldown_until: Option<i64>,
    /// Recurrence rules mark the period boundary so the counter
    /// restarts from here
    pub period_end: Option<i64>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Evaluation {
    Award(AwardOutcome),
    NotEligible,
}

fn award(amount: i64) -> Evaluation {
    Evaluation::Award(AwardOutcome {
        amount,
        cooldown_until: None,
        period_end: None,
    })
}

/// Does the event satisfy the rule's predicate, ignoring any per-user
/// state. Also used for template stamp conditions, where the
/// stateful rule types impose no per-event constraint.
pub fn matches_event(config: &RuleConfig, event: &EarnEvent, now: i64) -> bool {
    match config {
        RuleConfig::ValueSpent { step, .. } => {
            event.amount.is_some_and(|amount| amount >= *step)
        }
        RuleConfig::Event { event_name, .. } => {
            event.event_name.as_deref() == Some(event_name.as_str())
        }
        RuleConfig::Category { categories, .. } => {
            event.category_id.is_some_and(|c| categories.contains(&c))
        }
        RuleConfig::DigitalBehavior { events, .. } => event
            .event_name
            .as_ref()
            .is_some_and(|name| events.contains(name)),
        RuleConfig::SpecialDate {
            date, start, end, ..
        } => *start <= now && now <= *end && calendar_date(now) == *date,
        RuleConfig::Geolocation { branch_id, .. } => event.branch_id == Some(*branch_id),
        RuleConfig::Inventory { item_ids, .. } => event
            .purchased_items
            .iter()
            .any(|item| item_ids.contains(item)),
        RuleConfig::Frequency { .. }
        | RuleConfig::FirstPurchase { .. }
        | RuleConfig::Recurrence { .. } => true,
    }
}

/// Evaluate one rule against one event
pub fn evaluate(
    config: &RuleConfig,
    event: &EarnEvent,
    snapshot: &EligibilitySnapshot,
    now: i64,
) -> Evaluation {
    match config {
        RuleConfig::ValueSpent { step, points } => {
            let Some(amount) = event.amount else {
                return Evaluation::NotEligible;
            };
            let units = (amount / step).floor() as i64;
            if units < 1 {
                return Evaluation::NotEligible;
            }
            award(units * points)
        }

        RuleConfig::Event { points, .. } => {
            if matches_event(config, event, now) {
                award(*points)
            } else {
                Evaluation::NotEligible
            }
        }

        RuleConfig::Frequency {
            threshold,
            bonus_points,
            cooldown_days,
            ..
        } => {
            if snapshot.cooldown_active(now) {
                return Evaluation::NotEligible;
            }
            if snapshot.window_count < *threshold as i64 {
                return Evaluation::NotEligible;
            }
            Evaluation::Award(AwardOutcome {
                amount: *bonus_points,
                cooldown_until: Some(now + *cooldown_days as i64 * DAY_MS),
                period_end: None,
            })
        }

        RuleConfig::Category { multiplier, .. } => {
            if !matches_event(config, event, now) {
                return Evaluation::NotEligible;
            }
            match event.base_points {
                Some(base) => award(multiply(base, *multiplier)),
                None => Evaluation::NotEligible,
            }
        }

        RuleConfig::FirstPurchase { bonus_points } => {
            if snapshot.ever_awarded() {
                Evaluation::NotEligible
            } else {
                award(*bonus_points)
            }
        }

        RuleConfig::Recurrence {
            consecutive_periods,
            threshold_per_period,
            bonus_points,
            cooldown_days,
            ..
        } => {
            if snapshot.cooldown_active(now) {
                return Evaluation::NotEligible;
            }
            if snapshot.period_counts.len() < *consecutive_periods as usize {
                return Evaluation::NotEligible;
            }
            let all_met = snapshot
                .period_counts
                .iter()
                .take(*consecutive_periods as usize)
                .all(|&count| count >= *threshold_per_period as i64);
            if !all_met {
                return Evaluation::NotEligible;
            }
            Evaluation::Award(AwardOutcome {
                amount: *bonus_points,
                cooldown_until: cooldown_days.map(|days| now + days as i64 * DAY_MS),
                period_end: Some(now),
            })
        }

        RuleConfig::DigitalBehavior { points, .. } => {
            if matches_event(config, event, now) {
                award(*points)
            } else {
                Evaluation::NotEligible
            }
        }

        RuleConfig::SpecialDate { multiplier, .. } => {
            if !matches_event(config, event, now) {
                return Evaluation::NotEligible;
            }
            match event.base_points {
                Some(base) => award(multiply(base, *multiplier)),
                None => Evaluation::NotEligible,
            }
        }

        RuleConfig::Geolocation { points, .. } => {
            if matches_event(config, event, now) {
                award(*points)
            } else {
                Evaluation::NotEligible
            }
        }

        RuleConfig::Inventory { multiplier, .. } => {
            if !matches_event(config, event, now) {
                return Evaluation::NotEligible;
            }
            match event.base_points {
                Some(base) => award(multiply(base, *multiplier)),
                None => Evaluation::NotEligible,
            }
        }
    }
}

fn multiply(base: i64, multiplier: f64) -> i64 {
    (base as f64 * multiplier).floor() as i64
}

/// `MM-DD` of the instant, UTC
fn calendar_date(now: i64) -> String {
    match Utc.timestamp_millis_opt(now).single() {
        Some(dt) => dt.format("%m-%d").to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(amount: f64) -> EarnEvent {
        EarnEvent {
            company_id: 1,
            user_id: 5,
            amount: Some(amount),
            ..EarnEvent::default()
        }
    }

    fn record(awarded_count: i64, cooldown_until: Option<i64>) -> EligibilityRecord {
        EligibilityRecord {
            id: 1,
            rule_id: 1,
            user_id: 5,
            awarded_count,
            cooldown_until,
            last_award_at: None,
            last_period_end: None,
            updated_at: 0,
        }
    }

    #[test]
    fn test_value_spent_floors_units() {
        let config = RuleConfig::ValueSpent {
            step: 10.0,
            points: 3,
        };
        let snap = EligibilitySnapshot::default();
        assert_eq!(evaluate(&config, &purchase(35.0), &snap, 0), award(9));
        assert_eq!(evaluate(&config, &purchase(10.0), &snap, 0), award(3));
        assert_eq!(
            evaluate(&config, &purchase(9.99), &snap, 0),
            Evaluation::NotEligible
        );
    }

    #[test]
    fn test_event_rule_matches_by_name() {
        let config = RuleConfig::Event {
            event_name: "birthday".into(),
            points: 50,
        };
        let snap = EligibilitySnapshot::default();
        let event = EarnEvent {
            event_name: Some("birthday".into()),
            ..EarnEvent::default()
        };
        assert_eq!(evaluate(&config, &event, &snap, 0), award(50));
        assert_eq!(
            evaluate(&config, &EarnEvent::default(), &snap, 0),
            Evaluation::NotEligible
        );
    }

    #[test]
    fn test_frequency_threshold_and_cooldown() {
        let config = RuleConfig::Frequency {
            threshold: 3,
            window_days: 7,
            bonus_points: 100,
            cooldown_days: 14,
        };
        let now = 1_000_000;

        let below = EligibilitySnapshot {
            window_count: 2,
            ..EligibilitySnapshot::default()
        };
        assert_eq!(
            evaluate(&config, &EarnEvent::default(), &below, now),
            Evaluation::NotEligible
        );

        let met = EligibilitySnapshot {
            window_count: 3,
            ..EligibilitySnapshot::default()
        };
        assert_eq!(
            evaluate(&config, &EarnEvent::default(), &met, now),
            Evaluation::Award(AwardOutcome {
                amount: 100,
                cooldown_until: Some(now + 14 * DAY_MS),
                period_end: None,
            })
        );

        let cooling = EligibilitySnapshot {
            record: Some(record(1, Some(now + 1))),
            window_count: 5,
            ..EligibilitySnapshot::default()
        };
        assert_eq!(
            evaluate(&config, &EarnEvent::default(), &cooling, now),
            Evaluation::NotEligible
        );
    }

    #[test]
    fn test_category_multiplier_floors() {
        let config = RuleConfig::Category {
            categories: vec![7, 8],
            multiplier: 1.5,
        };
        let snap = EligibilitySnapshot::default();
        let event = EarnEvent {
            category_id: Some(7),
            base_points: Some(11),
            ..EarnEvent::default()
        };
        // floor(11 * 1.5) = 16
        assert_eq!(evaluate(&config, &event, &snap, 0), award(16));

        let other = EarnEvent {
            category_id: Some(9),
            base_points: Some(11),
            ..EarnEvent::default()
        };
        assert_eq!(
            evaluate(&config, &other, &snap, 0),
            Evaluation::NotEligible
        );
    }

    #[test]
    fn test_first_purchase_is_one_shot() {
        let config = RuleConfig::FirstPurchase { bonus_points: 200 };
        let fresh = EligibilitySnapshot::default();
        assert_eq!(evaluate(&config, &purchase(1.0), &fresh, 0), award(200));

        let awarded = EligibilitySnapshot {
            record: Some(record(1, None)),
            ..EligibilitySnapshot::default()
        };
        assert_eq!(
            evaluate(&config, &purchase(1.0), &awarded, 0),
            Evaluation::NotEligible
        );
    }

    #[test]
    fn test_recurrence_needs_every_period_met() {
        let config = RuleConfig::Recurrence {
            consecutive_periods: 3,
            period_days: 30,
            threshold_per_period: 2,
            bonus_points: 500,
            cooldown_days: None,
        };
        let now = 10 * DAY_MS;

        let gap = EligibilitySnapshot {
            period_counts: vec![2, 0, 2],
            ..EligibilitySnapshot::default()
        };
        assert_eq!(
            evaluate(&config, &EarnEvent::default(), &gap, now),
            Evaluation::NotEligible
        );

        let met = EligibilitySnapshot {
            period_counts: vec![2, 3, 2],
            ..EligibilitySnapshot::default()
        };
        assert_eq!(
            evaluate(&config, &EarnEvent::default(), &met, now),
            Evaluation::Award(AwardOutcome {
                amount: 500,
                cooldown_until: None,
                period_end: Some(now),
            })
        );
    }

    #[test]
    fn test_special_date_checks_calendar_and_window() {
        // 2026-12-25 12:00:00 UTC
        let christmas = 1_798_200_000_000;
        let config = RuleConfig::SpecialDate {
            date: "12-25".into(),
            start: christmas - DAY_MS,
            end: christmas + DAY_MS,
            multiplier: 2.0,
        };
        let snap = EligibilitySnapshot::default();
        let event = EarnEvent {
            base_points: Some(10),
            ..EarnEvent::default()
        };
        assert_eq!(evaluate(&config, &event, &snap, christmas), award(20));
        // Inside the window but the wrong calendar day
        assert_eq!(
            evaluate(&config, &event, &snap, christmas + DAY_MS),
            Evaluation::NotEligible
        );
        // Right day of a different year, outside the window
        assert_eq!(
            evaluate(&config, &event, &snap, christmas - 365 * DAY_MS),
            Evaluation::NotEligible
        );
    }

    #[test]
    fn test_geolocation_and_inventory() {
        let geo = RuleConfig::Geolocation {
            branch_id: 3,
            points: 15,
        };
        let snap = EligibilitySnapshot::default();
        let here = EarnEvent {
            branch_id: Some(3),
            ..EarnEvent::default()
        };
        assert_eq!(evaluate(&geo, &here, &snap, 0), award(15));

        let inv = RuleConfig::Inventory {
            item_ids: vec![10, 11],
            multiplier: 3.0,
        };
        let basket = EarnEvent {
            purchased_items: vec![9, 11],
            base_points: Some(4),
            ..EarnEvent::default()
        };
        assert_eq!(evaluate(&inv, &basket, &snap, 0), award(12));

        let miss = EarnEvent {
            purchased_items: vec![9],
            base_points: Some(4),
            ..EarnEvent::default()
        };
        assert_eq!(evaluate(&inv, &miss, &snap, 0), Evaluation::NotEligible);
    }

    #[test]
    fn test_digital_behavior_matches_listed_events() {
        let config = RuleConfig::DigitalBehavior {
            events: vec!["app_open".into(), "share".into()],
            points: 2,
        };
        let snap = EligibilitySnapshot::default();
        let event = EarnEvent {
            event_name: Some("share".into()),
            ..EarnEvent::default()
        };
        assert_eq!(evaluate(&config, &event, &snap, 0), award(2));
    }
}
