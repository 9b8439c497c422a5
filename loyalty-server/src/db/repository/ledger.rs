//! Points Ledger Repository
//!
//! The ledger is append-only. Every append also bumps the
//! materialized points_balance row in the same transaction, so the
//! projection can lag the ledger only by a crashed transaction, which
//! rolls back both.

use sqlx::{SqliteConnection, SqlitePool};

use shared::models::{PointsBalance, PointsTransaction, TxType};
use shared::util::{now_millis, snowflake_id};

use super::RepoResult;

/// Append one ledger entry and bump the balance projection
pub async fn append(
    pool: &SqlitePool,
    company_id: i64,
    user_id: i64,
    tx_type: TxType,
    amount: i64,
    rule_id: Option<i64>,
    description: &str,
) -> RepoResult<PointsTransaction> {
    let mut tx = pool.begin().await?;
    let entry = append_in_tx(&mut tx, company_id, user_id, tx_type, amount, rule_id, description)
        .await?;
    tx.commit().await?;
    Ok(entry)
}

/// Append within a caller-owned transaction, for writes that must
/// commit together with other state
pub async fn append_in_tx(
    conn: &mut SqliteConnection,
    company_id: i64,
    user_id: i64,
    tx_type: TxType,
    amount: i64,
    rule_id: Option<i64>,
    description: &str,
) -> RepoResult<PointsTransaction> {
    let now = now_millis();
    let id = snowflake_id();

    sqlx::query(
        "INSERT INTO points_transaction (id, company_id, user_id, tx_type, amount, rule_id, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(id)
    .bind(company_id)
    .bind(user_id)
    .bind(tx_type)
    .bind(amount)
    .bind(rule_id)
    .bind(description)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO points_balance (company_id, user_id, balance, updated_at) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(company_id, user_id) DO UPDATE SET balance = balance + excluded.balance, updated_at = excluded.updated_at",
    )
    .bind(company_id)
    .bind(user_id)
    .bind(amount)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(PointsTransaction {
        id,
        company_id,
        user_id,
        tx_type,
        amount,
        rule_id,
        description: description.to_string(),
        created_at: now,
    })
}

/// Current balance projection; a user with no ledger entries reads 0
pub async fn balance(pool: &SqlitePool, company_id: i64, user_id: i64) -> RepoResult<PointsBalance> {
    let row = sqlx::query_as::<_, PointsBalance>(
        "SELECT company_id, user_id, balance, updated_at FROM points_balance WHERE company_id = ? AND user_id = ?",
    )
    .bind(company_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.unwrap_or(PointsBalance {
        company_id,
        user_id,
        balance: 0,
        updated_at: 0,
    }))
}

pub async fn transactions(
    pool: &SqlitePool,
    company_id: i64,
    user_id: i64,
    limit: i64,
) -> RepoResult<Vec<PointsTransaction>> {
    let rows = sqlx::query_as::<_, PointsTransaction>(
        "SELECT id, company_id, user_id, tx_type, amount, rule_id, description, created_at FROM points_transaction WHERE company_id = ? AND user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(company_id)
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Rebuild the projection from the ledger. Repair path only; normal
/// writes keep the two in step.
pub async fn recompute_balance(
    pool: &SqlitePool,
    company_id: i64,
    user_id: i64,
) -> RepoResult<i64> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount), 0) FROM points_transaction WHERE company_id = ? AND user_id = ?",
    )
    .bind(company_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    sqlx::query(
        "INSERT INTO points_balance (company_id, user_id, balance, updated_at) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(company_id, user_id) DO UPDATE SET balance = excluded.balance, updated_at = excluded.updated_at",
    )
    .bind(company_id)
    .bind(user_id)
    .bind(total)
    .bind(now_millis())
    .execute(pool)
    .await?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;

    async fn test_pool() -> SqlitePool {
        DbService::new_in_memory().await.unwrap().pool
    }

    #[tokio::test]
    async fn test_balance_is_sum_of_entries() {
        let pool = test_pool().await;
        append(&pool, 1, 5, TxType::Award, 30, Some(99), "value_spent").await.unwrap();
        append(&pool, 1, 5, TxType::Award, 20, Some(98), "event: birthday").await.unwrap();
        append(&pool, 1, 5, TxType::Adjustment, -10, None, "support correction").await.unwrap();

        let bal = balance(&pool, 1, 5).await.unwrap();
        assert_eq!(bal.balance, 40);

        // Projection agrees with a full recompute
        assert_eq!(recompute_balance(&pool, 1, 5).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_unknown_user_reads_zero() {
        let pool = test_pool().await;
        assert_eq!(balance(&pool, 1, 404).await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_companies_are_isolated() {
        let pool = test_pool().await;
        append(&pool, 1, 5, TxType::Award, 30, None, "a").await.unwrap();
        append(&pool, 2, 5, TxType::Award, 7, None, "b").await.unwrap();

        assert_eq!(balance(&pool, 1, 5).await.unwrap().balance, 30);
        assert_eq!(balance(&pool, 2, 5).await.unwrap().balance, 7);
    }

    #[tokio::test]
    async fn test_transactions_newest_first() {
        let pool = test_pool().await;
        append(&pool, 1, 5, TxType::Award, 1, None, "first").await.unwrap();
        append(&pool, 1, 5, TxType::Award, 2, None, "second").await.unwrap();

        let txs = transactions(&pool, 1, 5, 50).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description, "second");
        assert_eq!(txs[1].description, "first");
    }
}
