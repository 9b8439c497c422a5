//! Card Instance Repository
//!
//! The claim insert and the stamp increment are both written as
//! guarded single statements so concurrent requests race on the DB
//! row, not on application state.

use sqlx::{SqliteConnection, SqlitePool};

use shared::models::{CardInstance, CardStamp, CardTemplate, RewardRedemption, StampResult};
use shared::util::{DAY_MS, now_millis, snowflake_id};

use super::RepoResult;

const INSTANCE_SELECT: &str = "SELECT id, template_id, user_id, issued_at, expires_at, stamps_given, completed_at, created_at, updated_at FROM card_instance";

/// Insert a new instance only while both the per-user live count and
/// the template emission cap allow it. Returns None when a guard
/// failed; the caller re-counts to tell which one.
pub async fn claim_instance(
    pool: &SqlitePool,
    template: &CardTemplate,
    user_id: i64,
    now: i64,
) -> RepoResult<Option<CardInstance>> {
    let id = snowflake_id();
    let expires_at = template.instance_ttl_days.map(|days| now + days * DAY_MS);

    let rows = sqlx::query(
        "INSERT INTO card_instance (id, template_id, user_id, issued_at, expires_at, stamps_given, completed_at, created_at, updated_at) \
         SELECT ?1, ?2, ?3, ?4, ?5, 0, NULL, ?4, ?4 \
         WHERE (SELECT COUNT(*) FROM card_instance WHERE template_id = ?2 AND user_id = ?3 AND (expires_at IS NULL OR expires_at > ?4)) < ?6 \
           AND (?7 IS NULL OR (SELECT COUNT(*) FROM card_instance WHERE template_id = ?2) < ?7)",
    )
    .bind(id)
    .bind(template.id)
    .bind(user_id)
    .bind(now)
    .bind(expires_at)
    .bind(template.per_user_limit)
    .bind(template.emission_limit)
    .execute(pool)
    .await?;

    if rows.rows_affected() == 0 {
        return Ok(None);
    }
    find_instance(pool, id).await
}

pub async fn find_instance(pool: &SqlitePool, id: i64) -> RepoResult<Option<CardInstance>> {
    let row = sqlx::query_as::<_, CardInstance>(&format!("{INSTANCE_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_user(pool: &SqlitePool, user_id: i64) -> RepoResult<Vec<CardInstance>> {
    let rows = sqlx::query_as::<_, CardInstance>(&format!(
        "{INSTANCE_SELECT} WHERE user_id = ? ORDER BY issued_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_live_for_user(
    pool: &SqlitePool,
    template_id: i64,
    user_id: i64,
    now: i64,
) -> RepoResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM card_instance WHERE template_id = ? AND user_id = ? AND (expires_at IS NULL OR expires_at > ?)",
    )
    .bind(template_id)
    .bind(user_id)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn count_issued(pool: &SqlitePool, template_id: i64) -> RepoResult<i64> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM card_instance WHERE template_id = ?")
            .bind(template_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

pub async fn find_stamps(pool: &SqlitePool, instance_id: i64) -> RepoResult<Vec<CardStamp>> {
    let rows = sqlx::query_as::<_, CardStamp>(
        "SELECT id, instance_id, stamp_no, given_at, given_by FROM card_stamp WHERE instance_id = ? ORDER BY stamp_no",
    )
    .bind(instance_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_redemptions(
    pool: &SqlitePool,
    instance_id: i64,
) -> RepoResult<Vec<RewardRedemption>> {
    let rows = sqlx::query_as::<_, RewardRedemption>(
        "SELECT id, instance_id, stamp_no, used, used_at, created_at FROM reward_redemption WHERE instance_id = ? ORDER BY stamp_no",
    )
    .bind(instance_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_redemption(pool: &SqlitePool, id: i64) -> RepoResult<Option<RewardRedemption>> {
    let row = sqlx::query_as::<_, RewardRedemption>(
        "SELECT id, instance_id, stamp_no, used, used_at, created_at FROM reward_redemption WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Grant the next stamp inside the caller's transaction.
///
/// The increment is guarded by `stamps_given < stamp_total`, so a
/// completed card yields None instead of stamp_total + 1. Sets
/// `completed_at` when the last position is reached and materializes
/// the reward_redemption row if the template maps a reward to the
/// reached position.
pub async fn apply_stamp(
    conn: &mut SqliteConnection,
    instance_id: i64,
    given_by: Option<i64>,
    now: i64,
) -> RepoResult<Option<StampResult>> {
    let rows = sqlx::query(
        "UPDATE card_instance SET stamps_given = stamps_given + 1, updated_at = ?1 \
         WHERE id = ?2 AND stamps_given < (SELECT stamp_total FROM card_template WHERE id = card_instance.template_id)",
    )
    .bind(now)
    .bind(instance_id)
    .execute(&mut *conn)
    .await?;
    if rows.rows_affected() == 0 {
        return Ok(None);
    }

    let (stamp_no, stamp_total, template_id) = sqlx::query_as::<_, (i32, i32, i64)>(
        "SELECT ci.stamps_given, ct.stamp_total, ct.id FROM card_instance ci \
         JOIN card_template ct ON ct.id = ci.template_id WHERE ci.id = ?",
    )
    .bind(instance_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO card_stamp (id, instance_id, stamp_no, given_at, given_by) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(snowflake_id())
    .bind(instance_id)
    .bind(stamp_no)
    .bind(now)
    .bind(given_by)
    .execute(&mut *conn)
    .await?;

    let completed = stamp_no == stamp_total;
    if completed {
        sqlx::query(
            "UPDATE card_instance SET completed_at = ?1 WHERE id = ?2 AND completed_at IS NULL",
        )
        .bind(now)
        .bind(instance_id)
        .execute(&mut *conn)
        .await?;
    }

    let has_reward = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM template_reward WHERE template_id = ? AND stamp_no = ?",
    )
    .bind(template_id)
    .bind(stamp_no)
    .fetch_one(&mut *conn)
    .await?;
    if has_reward > 0 {
        sqlx::query(
            "INSERT INTO reward_redemption (id, instance_id, stamp_no, used, used_at, created_at) VALUES (?1, ?2, ?3, 0, NULL, ?4)",
        )
        .bind(snowflake_id())
        .bind(instance_id)
        .bind(stamp_no)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(Some(StampResult {
        instance_id,
        stamp_no,
        stamps_given: stamp_no,
        stamp_total,
        completed,
    }))
}

/// Flip `used` exactly once. Returns false when the claim was already
/// burned by a concurrent request.
pub async fn mark_redemption_used(conn: &mut SqliteConnection, id: i64) -> RepoResult<bool> {
    let now = now_millis();
    let rows =
        sqlx::query("UPDATE reward_redemption SET used = 1, used_at = ?1 WHERE id = ?2 AND used = 0")
            .bind(now)
            .bind(id)
            .execute(conn)
            .await?;
    Ok(rows.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::template;
    use shared::models::{CardTemplateCreate, TemplateRewardInput};

    async fn seed(stamp_total: i32, per_user_limit: i32) -> (SqlitePool, CardTemplate) {
        let pool = DbService::new_in_memory().await.unwrap().pool;
        let detail = template::create(
            &pool,
            CardTemplateCreate {
                company_id: 1,
                name: "Lunch Card".into(),
                stamp_total,
                per_user_limit: Some(per_user_limit),
                emission_start: None,
                emission_end: None,
                emission_limit: None,
                instance_ttl_days: None,
                rewards: vec![TemplateRewardInput {
                    stamp_no: stamp_total,
                    description: "Free lunch".into(),
                }],
                rules: vec![],
            },
        )
        .await
        .unwrap();
        (pool, detail.template)
    }

    #[tokio::test]
    async fn test_claim_respects_per_user_limit() {
        let (pool, tpl) = seed(3, 1).await;
        let now = now_millis();

        let first = claim_instance(&pool, &tpl, 100, now).await.unwrap();
        assert!(first.is_some());

        let second = claim_instance(&pool, &tpl, 100, now).await.unwrap();
        assert!(second.is_none());

        // Different user is unaffected
        let other = claim_instance(&pool, &tpl, 200, now).await.unwrap();
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn test_claim_respects_emission_limit() {
        let (pool, mut tpl) = seed(3, 5).await;
        tpl.emission_limit = Some(2);
        let now = now_millis();

        assert!(claim_instance(&pool, &tpl, 1, now).await.unwrap().is_some());
        assert!(claim_instance(&pool, &tpl, 2, now).await.unwrap().is_some());
        assert!(claim_instance(&pool, &tpl, 3, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stamps_number_densely_and_stop_at_total() {
        let (pool, tpl) = seed(2, 1).await;
        let now = now_millis();
        let instance = claim_instance(&pool, &tpl, 7, now).await.unwrap().unwrap();

        let mut tx = pool.begin().await.unwrap();
        let r1 = apply_stamp(&mut *tx, instance.id, None, now).await.unwrap().unwrap();
        let r2 = apply_stamp(&mut *tx, instance.id, None, now).await.unwrap().unwrap();
        let r3 = apply_stamp(&mut *tx, instance.id, None, now).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(r1.stamp_no, 1);
        assert!(!r1.completed);
        assert_eq!(r2.stamp_no, 2);
        assert!(r2.completed);
        assert!(r3.is_none());

        let refreshed = find_instance(&pool, instance.id).await.unwrap().unwrap();
        assert_eq!(refreshed.stamps_given, 2);
        assert!(refreshed.completed_at.is_some());

        let stamps = find_stamps(&pool, instance.id).await.unwrap();
        assert_eq!(
            stamps.iter().map(|s| s.stamp_no).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_reward_row_created_at_mapped_position() {
        let (pool, tpl) = seed(2, 1).await;
        let now = now_millis();
        let instance = claim_instance(&pool, &tpl, 7, now).await.unwrap().unwrap();

        let mut tx = pool.begin().await.unwrap();
        apply_stamp(&mut *tx, instance.id, None, now).await.unwrap();
        tx.commit().await.unwrap();
        assert!(find_redemptions(&pool, instance.id).await.unwrap().is_empty());

        let mut tx = pool.begin().await.unwrap();
        apply_stamp(&mut *tx, instance.id, None, now).await.unwrap();
        tx.commit().await.unwrap();

        let redemptions = find_redemptions(&pool, instance.id).await.unwrap();
        assert_eq!(redemptions.len(), 1);
        assert_eq!(redemptions[0].stamp_no, 2);
        assert!(!redemptions[0].used);
    }

    #[tokio::test]
    async fn test_mark_redemption_used_is_one_shot() {
        let (pool, tpl) = seed(1, 1).await;
        let now = now_millis();
        let instance = claim_instance(&pool, &tpl, 7, now).await.unwrap().unwrap();

        let mut tx = pool.begin().await.unwrap();
        apply_stamp(&mut *tx, instance.id, None, now).await.unwrap();
        tx.commit().await.unwrap();

        let redemption = &find_redemptions(&pool, instance.id).await.unwrap()[0];

        let mut conn = pool.acquire().await.unwrap();
        assert!(mark_redemption_used(&mut *conn, redemption.id).await.unwrap());
        assert!(!mark_redemption_used(&mut *conn, redemption.id).await.unwrap());
    }
}
