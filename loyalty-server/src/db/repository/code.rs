//! Redemption Code Repository
//!
//! Codes are never deleted. A code leaves the live set by being
//! consumed, revoked, or retired after expiry; the partial unique
//! index on (scope, resource_id) only sees live rows.

use sqlx::{SqliteConnection, SqlitePool};

use shared::models::{CodeScope, RedemptionCode};
use shared::util::snowflake_id;

use super::RepoResult;

const CODE_SELECT: &str = "SELECT id, code, scope, resource_id, expires_at, consumed_at, revoked_at, is_live, created_at FROM redemption_code";

pub async fn find_by_code(pool: &SqlitePool, code: &str) -> RepoResult<Option<RedemptionCode>> {
    let row = sqlx::query_as::<_, RedemptionCode>(&format!("{CODE_SELECT} WHERE code = ?"))
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// The live, unexpired code for a resource, if one exists
pub async fn find_live(
    pool: &SqlitePool,
    scope: CodeScope,
    resource_id: i64,
    now: i64,
) -> RepoResult<Option<RedemptionCode>> {
    let row = sqlx::query_as::<_, RedemptionCode>(&format!(
        "{CODE_SELECT} WHERE scope = ? AND resource_id = ? AND is_live = 1 AND expires_at > ?"
    ))
    .bind(scope)
    .bind(resource_id)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Drop expired codes out of the live set so a fresh insert does not
/// hit the partial unique index
pub async fn retire_expired(
    pool: &SqlitePool,
    scope: CodeScope,
    resource_id: i64,
    now: i64,
) -> RepoResult<()> {
    sqlx::query(
        "UPDATE redemption_code SET is_live = 0 WHERE scope = ? AND resource_id = ? AND is_live = 1 AND expires_at <= ?",
    )
    .bind(scope)
    .bind(resource_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a fresh live code. Fails with `RepoError::Duplicate` when a
/// concurrent issuer won the race on the live index.
pub async fn insert(
    pool: &SqlitePool,
    code: &str,
    scope: CodeScope,
    resource_id: i64,
    expires_at: i64,
    now: i64,
) -> RepoResult<RedemptionCode> {
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO redemption_code (id, code, scope, resource_id, expires_at, consumed_at, revoked_at, is_live, created_at) VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, 1, ?6)",
    )
    .bind(id)
    .bind(code)
    .bind(scope)
    .bind(resource_id)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(RedemptionCode {
        id,
        code: code.to_string(),
        scope,
        resource_id,
        expires_at,
        consumed_at: None,
        revoked_at: None,
        is_live: true,
        created_at: now,
    })
}

/// Atomically consume a code. The WHERE clause holds the whole
/// validity check, so only one caller can ever see a true result.
pub async fn consume(
    conn: &mut SqliteConnection,
    code: &str,
    scope: CodeScope,
    now: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE redemption_code SET consumed_at = ?1, is_live = 0 \
         WHERE code = ?2 AND scope = ?3 AND consumed_at IS NULL AND revoked_at IS NULL AND expires_at > ?1",
    )
    .bind(now)
    .bind(code)
    .bind(scope)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Revoke the live code for a resource, if any
pub async fn revoke(
    pool: &SqlitePool,
    scope: CodeScope,
    resource_id: i64,
    now: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE redemption_code SET revoked_at = ?1, is_live = 0 WHERE scope = ?2 AND resource_id = ?3 AND is_live = 1",
    )
    .bind(now)
    .bind(scope)
    .bind(resource_id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::RepoError;
    use shared::util::now_millis;

    async fn test_pool() -> SqlitePool {
        DbService::new_in_memory().await.unwrap().pool
    }

    #[tokio::test]
    async fn test_one_live_code_per_resource() {
        let pool = test_pool().await;
        let now = now_millis();
        insert(&pool, "AAAA1111", CodeScope::StampConfirm, 42, now + 60_000, now)
            .await
            .unwrap();
        let err = insert(&pool, "BBBB2222", CodeScope::StampConfirm, 42, now + 60_000, now)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(_)));

        // Same resource under a different scope is a separate slot
        insert(&pool, "CCCC3333", CodeScope::RewardClaim, 42, now + 60_000, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_consume_is_one_shot() {
        let pool = test_pool().await;
        let now = now_millis();
        insert(&pool, "AAAA1111", CodeScope::StampConfirm, 42, now + 60_000, now)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert!(consume(&mut *conn, "AAAA1111", CodeScope::StampConfirm, now).await.unwrap());
        assert!(!consume(&mut *conn, "AAAA1111", CodeScope::StampConfirm, now).await.unwrap());
        drop(conn);

        let code = find_by_code(&pool, "AAAA1111").await.unwrap().unwrap();
        assert!(code.consumed_at.is_some());
        assert!(!code.is_live);
    }

    #[tokio::test]
    async fn test_consume_rejects_wrong_scope_and_expired() {
        let pool = test_pool().await;
        let now = now_millis();
        insert(&pool, "AAAA1111", CodeScope::StampConfirm, 42, now + 60_000, now)
            .await
            .unwrap();
        insert(&pool, "DDDD4444", CodeScope::RewardClaim, 43, now - 1, now - 60_000)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert!(!consume(&mut *conn, "AAAA1111", CodeScope::RewardClaim, now).await.unwrap());
        assert!(!consume(&mut *conn, "DDDD4444", CodeScope::RewardClaim, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_retire_expired_frees_the_slot() {
        let pool = test_pool().await;
        let now = now_millis();
        insert(&pool, "AAAA1111", CodeScope::StampConfirm, 42, now - 1, now - 60_000)
            .await
            .unwrap();

        assert!(find_live(&pool, CodeScope::StampConfirm, 42, now).await.unwrap().is_none());
        retire_expired(&pool, CodeScope::StampConfirm, 42, now).await.unwrap();
        let fresh = insert(&pool, "BBBB2222", CodeScope::StampConfirm, 42, now + 60_000, now)
            .await
            .unwrap();
        assert!(fresh.is_live);
    }

    #[tokio::test]
    async fn test_revoke_then_consume_fails() {
        let pool = test_pool().await;
        let now = now_millis();
        insert(&pool, "AAAA1111", CodeScope::RewardClaim, 9, now + 60_000, now)
            .await
            .unwrap();
        assert!(revoke(&pool, CodeScope::RewardClaim, 9, now).await.unwrap());

        let mut conn = pool.acquire().await.unwrap();
        assert!(!consume(&mut *conn, "AAAA1111", CodeScope::RewardClaim, now).await.unwrap());
    }
}
