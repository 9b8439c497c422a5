//! Event Processing Engine
//!
//! Evaluates every active rule of a company against an inbound
//! business event. Rules award independently; a repository failure
//! under one rule is logged and the remaining rules still run.

use sqlx::SqlitePool;
use tracing::{info, warn};

use shared::models::{
    AdjustmentCreate, EarnEvent, EventOutcome, PointsBalance, PointsRule, PointsTransaction,
    RuleAward, RuleConfig, RuleStatus, TxType,
};
use shared::util::{DAY_MS, now_millis};

use crate::db::repository::{RepoError, RepoResult, eligibility, ledger, rule};

use super::evaluator::{self, EligibilitySnapshot, Evaluation};

#[derive(Debug, Clone)]
pub struct PointsEngine {
    pool: SqlitePool,
}

impl PointsEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run an event through every active rule of its company.
    /// Each matching rule appends its own ledger entry.
    pub async fn process_event(&self, event: &EarnEvent) -> RepoResult<EventOutcome> {
        let now = event.occurred_at.unwrap_or_else(now_millis);
        let rules = rule::find_active(&self.pool, event.company_id).await?;

        let mut awards = Vec::new();
        for rule in &rules {
            match self.apply_rule(rule, event, now).await {
                Ok(Some(award)) => awards.push(award),
                Ok(None) => {}
                Err(e) => {
                    warn!(rule_id = rule.id, error = %e, "Rule evaluation failed, skipping");
                }
            }
        }

        let balance = ledger::balance(&self.pool, event.company_id, event.user_id)
            .await?
            .balance;
        info!(
            company_id = event.company_id,
            user_id = event.user_id,
            awards = awards.len(),
            balance,
            "Event processed"
        );
        Ok(EventOutcome { awards, balance })
    }

    async fn apply_rule(
        &self,
        rule: &PointsRule,
        event: &EarnEvent,
        now: i64,
    ) -> RepoResult<Option<RuleAward>> {
        let snapshot = self.snapshot(rule, event, now).await?;
        let evaluation = evaluator::evaluate(&rule.config, event, &snapshot, now);

        // Windowed rules log every inbound event, awarded or not, so
        // later window counts see it. occurred_at = now keeps it out
        // of this evaluation's own half-open window.
        if rule.config.tracks_events() {
            eligibility::record_event(&self.pool, rule.id, event.user_id, now).await?;
        }

        let outcome = match evaluation {
            Evaluation::NotEligible => return Ok(None),
            Evaluation::Award(outcome) => outcome,
        };

        if rule.config.has_eligibility_state() {
            // The guarded claim is the transaction's first statement,
            // so concurrent claimants serialize on the write lock and
            // exactly one of them gets the award. The ledger entry
            // commits together with the claimed state.
            let mut tx = self.pool.begin().await?;
            let first_only = matches!(rule.config, RuleConfig::FirstPurchase { .. });
            let claimed = eligibility::claim_award(
                &mut tx,
                rule.id,
                event.user_id,
                now,
                outcome.cooldown_until,
                outcome.period_end,
                first_only,
            )
            .await?;
            if !claimed {
                return Ok(None);
            }
            ledger::append_in_tx(
                &mut tx,
                event.company_id,
                event.user_id,
                TxType::Award,
                outcome.amount,
                Some(rule.id),
                rule.config.rule_type(),
            )
            .await?;
            tx.commit().await?;
        } else {
            ledger::append(
                &self.pool,
                event.company_id,
                event.user_id,
                TxType::Award,
                outcome.amount,
                Some(rule.id),
                rule.config.rule_type(),
            )
            .await?;
        }

        Ok(Some(RuleAward {
            rule_id: rule.id,
            rule_type: rule.config.rule_type().to_string(),
            amount: outcome.amount,
        }))
    }

    /// Read the per-user state a rule's evaluation depends on. The
    /// incoming event is folded into the counts here, before it is
    /// logged.
    async fn snapshot(
        &self,
        rule: &PointsRule,
        event: &EarnEvent,
        now: i64,
    ) -> RepoResult<EligibilitySnapshot> {
        let record = if rule.config.has_eligibility_state() {
            eligibility::get(&self.pool, rule.id, event.user_id).await?
        } else {
            None
        };

        let mut snapshot = EligibilitySnapshot {
            record,
            ..EligibilitySnapshot::default()
        };

        match &rule.config {
            RuleConfig::Frequency { window_days, .. } => {
                let start = now - *window_days as i64 * DAY_MS;
                let prior =
                    eligibility::count_events_between(&self.pool, rule.id, event.user_id, start, now)
                        .await?;
                snapshot.window_count = prior + 1;
            }
            RuleConfig::Recurrence {
                consecutive_periods,
                period_days,
                ..
            } => {
                // A prior award's period boundary censors older
                // events, so the counter genuinely restarts
                let floor = snapshot
                    .record
                    .as_ref()
                    .and_then(|r| r.last_period_end)
                    .unwrap_or(i64::MIN);
                let period_ms = *period_days as i64 * DAY_MS;
                for i in 0..*consecutive_periods as i64 {
                    let start = (now - (i + 1) * period_ms).max(floor);
                    let end = now - i * period_ms;
                    let mut count = if start < end {
                        eligibility::count_events_between(
                            &self.pool,
                            rule.id,
                            event.user_id,
                            start,
                            end,
                        )
                        .await?
                    } else {
                        0
                    };
                    if i == 0 {
                        count += 1;
                    }
                    snapshot.period_counts.push(count);
                }
            }
            _ => {}
        }

        Ok(snapshot)
    }

    /// Read-only eligibility view for one-shot/cooldown rules
    pub async fn check_rule_status(&self, rule_id: i64, user_id: i64) -> RepoResult<RuleStatus> {
        let rule = rule::find_by_id(&self.pool, rule_id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("Rule {rule_id} not found")))?;

        if !rule.config.has_eligibility_state() {
            return Ok(RuleStatus {
                already_awarded: false,
                message: format!("Rule '{}' is always eligible", rule.config.rule_type()),
            });
        }

        let now = now_millis();
        let record = eligibility::get(&self.pool, rule_id, user_id).await?;
        let status = match (&rule.config, record) {
            (RuleConfig::FirstPurchase { .. }, Some(r)) if r.awarded_count > 0 => RuleStatus {
                already_awarded: true,
                message: "Bonus already claimed".into(),
            },
            (_, Some(r)) if r.cooldown_active(now) => RuleStatus {
                already_awarded: true,
                message: format!(
                    "In cooldown until {}",
                    r.cooldown_until.unwrap_or_default()
                ),
            },
            _ => RuleStatus {
                already_awarded: false,
                message: "Eligible".into(),
            },
        };
        Ok(status)
    }

    /// Manual ledger adjustment, positive or negative
    pub async fn adjust(&self, data: AdjustmentCreate) -> RepoResult<PointsTransaction> {
        if data.amount == 0 {
            return Err(RepoError::Validation("amount must be non-zero".into()));
        }
        if data.description.trim().is_empty() {
            return Err(RepoError::Validation("description is required".into()));
        }
        ledger::append(
            &self.pool,
            data.company_id,
            data.user_id,
            TxType::Adjustment,
            data.amount,
            None,
            &data.description,
        )
        .await
    }

    pub async fn balance(&self, company_id: i64, user_id: i64) -> RepoResult<PointsBalance> {
        ledger::balance(&self.pool, company_id, user_id).await
    }

    pub async fn transactions(
        &self,
        company_id: i64,
        user_id: i64,
        limit: i64,
    ) -> RepoResult<Vec<PointsTransaction>> {
        ledger::transactions(&self.pool, company_id, user_id, limit).await
    }

    pub async fn recompute_balance(&self, company_id: i64, user_id: i64) -> RepoResult<i64> {
        ledger::recompute_balance(&self.pool, company_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use shared::models::PointsRuleCreate;

    async fn engine() -> PointsEngine {
        let db = DbService::new_in_memory().await.unwrap();
        PointsEngine::new(db.pool)
    }

    async fn add_rule(engine: &PointsEngine, config: RuleConfig) -> i64 {
        rule::create(
            &engine.pool,
            PointsRuleCreate {
                company_id: 1,
                config,
                order: None,
                visible: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn purchase(amount: f64) -> EarnEvent {
        EarnEvent {
            company_id: 1,
            user_id: 5,
            amount: Some(amount),
            ..EarnEvent::default()
        }
    }

    #[tokio::test]
    async fn test_multiple_rules_award_independently() {
        let engine = engine().await;
        add_rule(&engine, RuleConfig::ValueSpent { step: 10.0, points: 1 }).await;
        add_rule(&engine, RuleConfig::FirstPurchase { bonus_points: 50 }).await;

        let outcome = engine.process_event(&purchase(35.0)).await.unwrap();
        assert_eq!(outcome.awards.len(), 2);
        // 3 spend units + first purchase bonus
        assert_eq!(outcome.balance, 53);

        let txs = engine.transactions(1, 5, 10).await.unwrap();
        assert_eq!(txs.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_events_award_first_purchase_once() {
        // File-backed pool so events really race over separate
        // connections
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.db");
        let db = DbService::new(path.to_str().unwrap()).await.unwrap();
        let engine = PointsEngine::new(db.pool);
        add_rule(&engine, RuleConfig::FirstPurchase { bonus_points: 100 }).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.process_event(&purchase(10.0)).await.unwrap().awards.len()
            }));
        }
        let mut awards = 0;
        for handle in handles {
            awards += handle.await.unwrap();
        }

        assert_eq!(awards, 1);
        assert_eq!(engine.balance(1, 5).await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_first_purchase_awards_once() {
        let engine = engine().await;
        add_rule(&engine, RuleConfig::FirstPurchase { bonus_points: 50 }).await;

        let first = engine.process_event(&purchase(5.0)).await.unwrap();
        assert_eq!(first.balance, 50);

        let second = engine.process_event(&purchase(5.0)).await.unwrap();
        assert!(second.awards.is_empty());
        assert_eq!(second.balance, 50);
    }

    #[tokio::test]
    async fn test_frequency_awards_at_threshold_then_cools_down() {
        let engine = engine().await;
        let rule_id = add_rule(
            &engine,
            RuleConfig::Frequency {
                threshold: 3,
                window_days: 7,
                bonus_points: 100,
                cooldown_days: 14,
            },
        )
        .await;
        let base = now_millis();

        let at = |offset: i64| EarnEvent {
            occurred_at: Some(base + offset),
            ..purchase(5.0)
        };

        assert!(engine.process_event(&at(0)).await.unwrap().awards.is_empty());
        assert!(engine.process_event(&at(1000)).await.unwrap().awards.is_empty());

        let third = engine.process_event(&at(2000)).await.unwrap();
        assert_eq!(third.awards.len(), 1);
        assert_eq!(third.balance, 100);

        // Threshold still met but the cooldown holds
        let fourth = engine.process_event(&at(3000)).await.unwrap();
        assert!(fourth.awards.is_empty());

        let status = engine.check_rule_status(rule_id, 5).await.unwrap();
        assert!(status.already_awarded);
    }

    #[tokio::test]
    async fn test_frequency_window_excludes_old_events() {
        let engine = engine().await;
        add_rule(
            &engine,
            RuleConfig::Frequency {
                threshold: 3,
                window_days: 7,
                bonus_points: 100,
                cooldown_days: 14,
            },
        )
        .await;
        let base = now_millis();

        let at = |offset: i64| EarnEvent {
            occurred_at: Some(base + offset),
            ..purchase(5.0)
        };

        engine.process_event(&at(0)).await.unwrap();
        engine.process_event(&at(1000)).await.unwrap();

        // Third event lands 8 days later; the first two have rolled
        // out of the 7-day window
        let late = engine.process_event(&at(8 * DAY_MS)).await.unwrap();
        assert!(late.awards.is_empty());
    }

    #[tokio::test]
    async fn test_recurrence_awards_after_consecutive_periods() {
        let engine = engine().await;
        add_rule(
            &engine,
            RuleConfig::Recurrence {
                consecutive_periods: 2,
                period_days: 7,
                threshold_per_period: 2,
                bonus_points: 500,
                cooldown_days: None,
            },
        )
        .await;
        let base = now_millis();

        let at = |offset: i64| EarnEvent {
            occurred_at: Some(base + offset),
            ..purchase(5.0)
        };

        // Two events in the older period, one in the recent period
        engine.process_event(&at(0)).await.unwrap();
        engine.process_event(&at(1000)).await.unwrap();
        engine.process_event(&at(8 * DAY_MS)).await.unwrap();

        // Second event of the recent period completes both periods
        let outcome = engine.process_event(&at(13 * DAY_MS)).await.unwrap();
        assert_eq!(outcome.awards.len(), 1);
        assert_eq!(outcome.balance, 500);

        // The period marker censors everything before the award, so
        // the streak restarts instead of re-firing immediately
        let after = engine.process_event(&at(13 * DAY_MS + 1000)).await.unwrap();
        assert!(after.awards.is_empty());
    }

    #[tokio::test]
    async fn test_rules_scoped_to_company() {
        let engine = engine().await;
        add_rule(&engine, RuleConfig::ValueSpent { step: 10.0, points: 1 }).await;

        let other_company = EarnEvent {
            company_id: 2,
            ..purchase(100.0)
        };
        let outcome = engine.process_event(&other_company).await.unwrap();
        assert!(outcome.awards.is_empty());
    }

    #[tokio::test]
    async fn test_status_of_continuous_rule_is_always_eligible() {
        let engine = engine().await;
        let rule_id = add_rule(&engine, RuleConfig::ValueSpent { step: 10.0, points: 1 }).await;
        let status = engine.check_rule_status(rule_id, 5).await.unwrap();
        assert!(!status.already_awarded);
    }

    #[tokio::test]
    async fn test_adjust_validates_and_updates_balance() {
        let engine = engine().await;
        let err = engine
            .adjust(AdjustmentCreate {
                company_id: 1,
                user_id: 5,
                amount: 0,
                description: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));

        engine
            .adjust(AdjustmentCreate {
                company_id: 1,
                user_id: 5,
                amount: -25,
                description: "support correction".into(),
            })
            .await
            .unwrap();
        assert_eq!(engine.balance(1, 5).await.unwrap().balance, -25);
        assert_eq!(engine.recompute_balance(1, 5).await.unwrap(), -25);
    }
}
