//! Points Rule Repository

use sqlx::SqlitePool;

use shared::models::{PointsRule, PointsRuleCreate, PointsRuleUpdate, RuleConfig};
use shared::util::{now_millis, snowflake_id};

use super::{RepoError, RepoResult};

const RULE_SELECT: &str = "SELECT id, company_id, rule_type, config, sort_order, is_active, is_visible, created_at, updated_at FROM points_rule";

/// Raw points_rule row; the two text columns rebuild [`RuleConfig`]
#[derive(sqlx::FromRow)]
struct RuleRow {
    id: i64,
    company_id: i64,
    rule_type: String,
    config: String,
    sort_order: i32,
    is_active: bool,
    is_visible: bool,
    created_at: i64,
    updated_at: i64,
}

impl RuleRow {
    fn into_model(self) -> RepoResult<PointsRule> {
        let config = RuleConfig::from_parts(&self.rule_type, &self.config)
            .map_err(|e| RepoError::Database(format!("Stored rule {} is corrupt: {e}", self.id)))?;
        Ok(PointsRule {
            id: self.id,
            company_id: self.company_id,
            config,
            order: self.sort_order,
            active: self.is_active,
            visible: self.is_visible,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub async fn find_all(pool: &SqlitePool, company_id: i64) -> RepoResult<Vec<PointsRule>> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "{RULE_SELECT} WHERE company_id = ? ORDER BY sort_order, created_at"
    ))
    .bind(company_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(RuleRow::into_model).collect()
}

/// Active rules only, the set the event engine evaluates
pub async fn find_active(pool: &SqlitePool, company_id: i64) -> RepoResult<Vec<PointsRule>> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "{RULE_SELECT} WHERE company_id = ? AND is_active = 1 ORDER BY sort_order, created_at"
    ))
    .bind(company_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(RuleRow::into_model).collect()
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<PointsRule>> {
    let row = sqlx::query_as::<_, RuleRow>(&format!("{RULE_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(RuleRow::into_model).transpose()
}

pub async fn create(pool: &SqlitePool, data: PointsRuleCreate) -> RepoResult<PointsRule> {
    data.config
        .validate()
        .map_err(|e| RepoError::Validation(e.to_string()))?;
    let (rule_type, config) = data
        .config
        .to_parts()
        .map_err(|e| RepoError::Validation(e.to_string()))?;

    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO points_rule (id, company_id, rule_type, config, sort_order, is_active, is_visible, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?7)",
    )
    .bind(id)
    .bind(data.company_id)
    .bind(rule_type)
    .bind(config)
    .bind(data.order.unwrap_or(0))
    .bind(data.visible.unwrap_or(true))
    .bind(now)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create rule".into()))
}

/// Update a rule. A provided config replaces the stored one wholesale
/// after validation; flags and ordering merge field by field.
pub async fn update(pool: &SqlitePool, id: i64, data: PointsRuleUpdate) -> RepoResult<PointsRule> {
    let parts = match &data.config {
        Some(config) => {
            config
                .validate()
                .map_err(|e| RepoError::Validation(e.to_string()))?;
            let (rule_type, json) = config
                .to_parts()
                .map_err(|e| RepoError::Validation(e.to_string()))?;
            Some((rule_type, json))
        }
        None => None,
    };

    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE points_rule SET rule_type = COALESCE(?1, rule_type), config = COALESCE(?2, config), sort_order = COALESCE(?3, sort_order), is_active = COALESCE(?4, is_active), is_visible = COALESCE(?5, is_visible), updated_at = ?6 WHERE id = ?7",
    )
    .bind(parts.as_ref().map(|(t, _)| t.clone()))
    .bind(parts.as_ref().map(|(_, c)| c.clone()))
    .bind(data.order)
    .bind(data.active)
    .bind(data.visible)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Rule {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Rule {id} not found")))
}

/// Soft delete. The row stays because ledger entries and eligibility
/// records reference it.
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE points_rule SET is_active = 0, is_visible = 0, updated_at = ? WHERE id = ? AND is_active = 1",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;

    async fn test_pool() -> SqlitePool {
        DbService::new_in_memory().await.unwrap().pool
    }

    fn spend_rule(company_id: i64) -> PointsRuleCreate {
        PointsRuleCreate {
            company_id,
            config: RuleConfig::ValueSpent {
                step: 10.0,
                points: 1,
            },
            order: None,
            visible: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_round_trip_config() {
        let pool = test_pool().await;
        let rule = create(&pool, spend_rule(1)).await.unwrap();
        assert!(rule.active);
        assert!(rule.visible);

        let found = find_by_id(&pool, rule.id).await.unwrap().unwrap();
        assert_eq!(
            found.config,
            RuleConfig::ValueSpent {
                step: 10.0,
                points: 1
            }
        );
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_config() {
        let pool = test_pool().await;
        let err = create(
            &pool,
            PointsRuleCreate {
                company_id: 1,
                config: RuleConfig::Category {
                    categories: vec![],
                    multiplier: 2.0,
                },
                order: None,
                visible: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_replaces_config_wholesale() {
        let pool = test_pool().await;
        let rule = create(&pool, spend_rule(1)).await.unwrap();

        let updated = update(
            &pool,
            rule.id,
            PointsRuleUpdate {
                config: Some(RuleConfig::FirstPurchase { bonus_points: 50 }),
                order: Some(3),
                active: None,
                visible: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.config, RuleConfig::FirstPurchase { bonus_points: 50 });
        assert_eq!(updated.order, 3);
        assert!(updated.active);
    }

    #[tokio::test]
    async fn test_deactivated_rule_leaves_active_set() {
        let pool = test_pool().await;
        let rule = create(&pool, spend_rule(1)).await.unwrap();
        create(&pool, spend_rule(1)).await.unwrap();

        assert!(delete(&pool, rule.id).await.unwrap());
        assert_eq!(find_active(&pool, 1).await.unwrap().len(), 1);
        assert_eq!(find_all(&pool, 1).await.unwrap().len(), 2);
    }
}
