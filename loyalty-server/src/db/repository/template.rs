//! Card Template Repository

use sqlx::SqlitePool;

use shared::models::{
    CardTemplate, CardTemplateCreate, CardTemplateDetail, CardTemplateUpdate, RuleConfig,
    TemplateReward, TemplateRule,
};
use shared::util::{now_millis, snowflake_id};

use super::{RepoError, RepoResult};

const TEMPLATE_SELECT: &str = "SELECT id, company_id, name, stamp_total, per_user_limit, emission_start, emission_end, emission_limit, instance_ttl_days, is_active, created_at, updated_at FROM card_template";

/// Raw template_rule row; `config` is validated JSON text
#[derive(sqlx::FromRow)]
struct TemplateRuleRow {
    id: i64,
    template_id: i64,
    rule_type: String,
    config: String,
    position: i32,
}

impl TemplateRuleRow {
    fn into_model(self) -> RepoResult<TemplateRule> {
        let config = RuleConfig::from_parts(&self.rule_type, &self.config)
            .map_err(|e| RepoError::Database(format!("Stored rule {} is corrupt: {e}", self.id)))?;
        Ok(TemplateRule {
            id: self.id,
            template_id: self.template_id,
            config,
            position: self.position,
        })
    }
}

pub async fn find_all(pool: &SqlitePool, company_id: Option<i64>) -> RepoResult<Vec<CardTemplate>> {
    let rows = match company_id {
        Some(cid) => {
            sqlx::query_as::<_, CardTemplate>(&format!(
                "{TEMPLATE_SELECT} WHERE company_id = ? AND is_active = 1 ORDER BY created_at DESC"
            ))
            .bind(cid)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, CardTemplate>(&format!(
                "{TEMPLATE_SELECT} WHERE is_active = 1 ORDER BY created_at DESC"
            ))
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<CardTemplate>> {
    let row = sqlx::query_as::<_, CardTemplate>(&format!("{TEMPLATE_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_detail(pool: &SqlitePool, id: i64) -> RepoResult<Option<CardTemplateDetail>> {
    let Some(template) = find_by_id(pool, id).await? else {
        return Ok(None);
    };
    let rewards = find_rewards(pool, id).await?;
    let rules = find_rules(pool, id).await?;
    Ok(Some(CardTemplateDetail {
        template,
        rewards,
        rules,
    }))
}

pub async fn find_rewards(pool: &SqlitePool, template_id: i64) -> RepoResult<Vec<TemplateReward>> {
    let rows = sqlx::query_as::<_, TemplateReward>(
        "SELECT id, template_id, stamp_no, description FROM template_reward WHERE template_id = ? ORDER BY stamp_no",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_rules(pool: &SqlitePool, template_id: i64) -> RepoResult<Vec<TemplateRule>> {
    let rows = sqlx::query_as::<_, TemplateRuleRow>(
        "SELECT id, template_id, rule_type, config, position FROM template_rule WHERE template_id = ? ORDER BY position",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(TemplateRuleRow::into_model).collect()
}

/// Create a template with its reward map and stamp rules in one
/// transaction. Rejects out-of-range or duplicate reward positions
/// and malformed rule configs before anything is persisted.
pub async fn create(pool: &SqlitePool, data: CardTemplateCreate) -> RepoResult<CardTemplateDetail> {
    if data.stamp_total < 1 {
        return Err(RepoError::Validation("stamp_total must be >= 1".into()));
    }
    let per_user_limit = data.per_user_limit.unwrap_or(1);
    if per_user_limit < 1 {
        return Err(RepoError::Validation("per_user_limit must be >= 1".into()));
    }

    let mut seen = std::collections::HashSet::new();
    for reward in &data.rewards {
        if reward.stamp_no < 1 || reward.stamp_no > data.stamp_total {
            return Err(RepoError::Validation(format!(
                "reward stamp_no {} outside [1, {}]",
                reward.stamp_no, data.stamp_total
            )));
        }
        if !seen.insert(reward.stamp_no) {
            return Err(RepoError::Validation(format!(
                "duplicate reward at stamp_no {}",
                reward.stamp_no
            )));
        }
    }
    for rule in &data.rules {
        rule.validate()
            .map_err(|e| RepoError::Validation(e.to_string()))?;
    }

    let now = now_millis();
    let id = snowflake_id();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO card_template (id, company_id, name, stamp_total, per_user_limit, emission_start, emission_end, emission_limit, instance_ttl_days, is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
    )
    .bind(id)
    .bind(data.company_id)
    .bind(&data.name)
    .bind(data.stamp_total)
    .bind(per_user_limit)
    .bind(data.emission_start)
    .bind(data.emission_end)
    .bind(data.emission_limit)
    .bind(data.instance_ttl_days)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for reward in &data.rewards {
        sqlx::query(
            "INSERT INTO template_reward (id, template_id, stamp_no, description) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(snowflake_id())
        .bind(id)
        .bind(reward.stamp_no)
        .bind(&reward.description)
        .execute(&mut *tx)
        .await?;
    }

    for (position, rule) in data.rules.iter().enumerate() {
        let (rule_type, config) = rule
            .to_parts()
            .map_err(|e| RepoError::Validation(e.to_string()))?;
        sqlx::query(
            "INSERT INTO template_rule (id, template_id, rule_type, config, position) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(snowflake_id())
        .bind(id)
        .bind(rule_type)
        .bind(config)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    find_detail(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create template".into()))
}

pub async fn update(
    pool: &SqlitePool,
    id: i64,
    data: CardTemplateUpdate,
) -> RepoResult<CardTemplate> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE card_template SET name = COALESCE(?1, name), per_user_limit = COALESCE(?2, per_user_limit), emission_start = COALESCE(?3, emission_start), emission_end = COALESCE(?4, emission_end), emission_limit = COALESCE(?5, emission_limit), instance_ttl_days = COALESCE(?6, instance_ttl_days), is_active = COALESCE(?7, is_active), updated_at = ?8 WHERE id = ?9",
    )
    .bind(&data.name)
    .bind(data.per_user_limit)
    .bind(data.emission_start)
    .bind(data.emission_end)
    .bind(data.emission_limit)
    .bind(data.instance_ttl_days)
    .bind(data.is_active)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Template {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Template {id} not found")))
}

/// Soft delete; instances remain as historical records
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let now = now_millis();
    let rows =
        sqlx::query("UPDATE card_template SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1")
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
    Ok(rows.rows_affected() > 0)
}
