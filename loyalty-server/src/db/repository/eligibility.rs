//! Rule Eligibility Repository
//!
//! Per-(rule, user) state for one-shot and windowed rules, plus the
//! rule_event log that feeds trailing-window counts.

use sqlx::{SqliteConnection, SqlitePool};

use shared::models::EligibilityRecord;
use shared::util::snowflake_id;

use super::RepoResult;

pub async fn get(
    pool: &SqlitePool,
    rule_id: i64,
    user_id: i64,
) -> RepoResult<Option<EligibilityRecord>> {
    let row = sqlx::query_as::<_, EligibilityRecord>(
        "SELECT id, rule_id, user_id, awarded_count, cooldown_until, last_award_at, last_period_end, updated_at FROM rule_eligibility WHERE rule_id = ? AND user_id = ?",
    )
    .bind(rule_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Log a qualifying event for window counting
pub async fn record_event(
    pool: &SqlitePool,
    rule_id: i64,
    user_id: i64,
    occurred_at: i64,
) -> RepoResult<()> {
    sqlx::query("INSERT INTO rule_event (id, rule_id, user_id, occurred_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(snowflake_id())
        .bind(rule_id)
        .bind(user_id)
        .bind(occurred_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Events in the half-open interval `[start, end)`
pub async fn count_events_between(
    pool: &SqlitePool,
    rule_id: i64,
    user_id: i64,
    start: i64,
    end: i64,
) -> RepoResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM rule_event WHERE rule_id = ? AND user_id = ? AND occurred_at >= ? AND occurred_at < ?",
    )
    .bind(rule_id)
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Try to take an award for a (rule, user) pair. The upsert carries
/// its own guards, so of any number of concurrent claimants exactly
/// one gets `true`:
///   - `first_only` rules claim only while `awarded_count` is 0
///   - an active cooldown blocks the claim
///   - `last_period_end` may only move forward
///
/// On success the counter is bumped and the cooldown and period
/// markers are overwritten with the values the evaluator derived.
pub async fn claim_award(
    conn: &mut SqliteConnection,
    rule_id: i64,
    user_id: i64,
    now: i64,
    cooldown_until: Option<i64>,
    last_period_end: Option<i64>,
    first_only: bool,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "INSERT INTO rule_eligibility (id, rule_id, user_id, awarded_count, cooldown_until, last_award_at, last_period_end, updated_at) \
         VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?5) \
         ON CONFLICT(rule_id, user_id) DO UPDATE SET \
           awarded_count = awarded_count + 1, \
           cooldown_until = excluded.cooldown_until, \
           last_award_at = excluded.last_award_at, \
           last_period_end = COALESCE(excluded.last_period_end, last_period_end), \
           updated_at = excluded.updated_at \
         WHERE (?7 = 0 OR rule_eligibility.awarded_count = 0) \
           AND (rule_eligibility.cooldown_until IS NULL OR rule_eligibility.cooldown_until <= ?5) \
           AND (?6 IS NULL OR rule_eligibility.last_period_end IS NULL OR rule_eligibility.last_period_end < ?6)",
    )
    .bind(snowflake_id())
    .bind(rule_id)
    .bind(user_id)
    .bind(cooldown_until)
    .bind(now)
    .bind(last_period_end)
    .bind(first_only)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::rule;
    use shared::models::{PointsRuleCreate, RuleConfig};

    async fn seed_rule() -> (SqlitePool, i64) {
        let pool = DbService::new_in_memory().await.unwrap().pool;
        let rule = rule::create(
            &pool,
            PointsRuleCreate {
                company_id: 1,
                config: RuleConfig::Frequency {
                    threshold: 3,
                    window_days: 7,
                    bonus_points: 100,
                    cooldown_days: 14,
                },
                order: None,
                visible: None,
            },
        )
        .await
        .unwrap();
        (pool, rule.id)
    }

    #[tokio::test]
    async fn test_window_count_is_half_open() {
        let (pool, rule_id) = seed_rule().await;
        record_event(&pool, rule_id, 5, 1000).await.unwrap();
        record_event(&pool, rule_id, 5, 2000).await.unwrap();
        record_event(&pool, rule_id, 5, 3000).await.unwrap();

        // [1000, 3000): the event at 3000 is excluded, 1000 included
        assert_eq!(count_events_between(&pool, rule_id, 5, 1000, 3000).await.unwrap(), 2);
        assert_eq!(count_events_between(&pool, rule_id, 5, 999, 3001).await.unwrap(), 3);
        // Other users do not leak in
        assert_eq!(count_events_between(&pool, rule_id, 6, 0, 10_000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_award_respects_cooldown() {
        let (pool, rule_id) = seed_rule().await;
        assert!(get(&pool, rule_id, 5).await.unwrap().is_none());

        let mut conn = pool.acquire().await.unwrap();
        assert!(claim_award(&mut conn, rule_id, 5, 1000, Some(9999), None, false).await.unwrap());
        // Cooldown still running: the claim is refused
        assert!(!claim_award(&mut conn, rule_id, 5, 1000, Some(9999), None, false).await.unwrap());
        // Cooldown elapsed
        assert!(claim_award(&mut conn, rule_id, 5, 9999, None, None, false).await.unwrap());
        drop(conn);

        let rec = get(&pool, rule_id, 5).await.unwrap().unwrap();
        assert_eq!(rec.awarded_count, 2);
        assert_eq!(rec.cooldown_until, None);
        assert_eq!(rec.last_award_at, Some(9999));
    }

    #[tokio::test]
    async fn test_claim_award_first_only_is_one_shot() {
        let (pool, rule_id) = seed_rule().await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(claim_award(&mut conn, rule_id, 5, 1000, None, None, true).await.unwrap());
        assert!(!claim_award(&mut conn, rule_id, 5, 2000, None, None, true).await.unwrap());
        drop(conn);

        let rec = get(&pool, rule_id, 5).await.unwrap().unwrap();
        assert_eq!(rec.awarded_count, 1);
    }

    #[tokio::test]
    async fn test_claim_award_period_end_only_advances() {
        let (pool, rule_id) = seed_rule().await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(claim_award(&mut conn, rule_id, 5, 1000, None, Some(100), false).await.unwrap());
        // Same period end again: refused
        assert!(!claim_award(&mut conn, rule_id, 5, 1000, None, Some(100), false).await.unwrap());
        assert!(claim_award(&mut conn, rule_id, 5, 1000, None, Some(200), false).await.unwrap());
        drop(conn);

        let rec = get(&pool, rule_id, 5).await.unwrap().unwrap();
        assert_eq!(rec.last_period_end, Some(200));
    }

    #[tokio::test]
    async fn test_cooldown_active_window() {
        let (pool, rule_id) = seed_rule().await;
        let mut conn = pool.acquire().await.unwrap();
        claim_award(&mut conn, rule_id, 5, 1000, Some(5000), None, false).await.unwrap();
        drop(conn);
        let rec = get(&pool, rule_id, 5).await.unwrap().unwrap();
        assert!(rec.cooldown_active(4999));
        assert!(!rec.cooldown_active(5000));
    }
}
