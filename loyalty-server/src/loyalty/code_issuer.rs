//! Redemption Code Issuer
//!
//! Short one-time codes bound to `(scope, resource_id)`. Issuance is
//! get-or-create: while a live code exists for a resource it is
//! returned with `reused = true`, so re-opening a claim screen never
//! produces two simultaneously valid codes.

use rand::{Rng, distributions::Alphanumeric};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use shared::models::{CodeScope, IssuedCode, RedemptionCode};
use shared::util::now_millis;

use crate::db::repository::{RepoError, code};

use super::{LoyaltyError, LoyaltyResult};

/// Stamp confirmation codes live 5 minutes
pub const STAMP_CODE_TTL_MS: i64 = 5 * 60 * 1000;
/// Reward claim codes live 5 minutes
pub const REWARD_CODE_TTL_MS: i64 = 5 * 60 * 1000;

const CODE_LEN: usize = 8;
const INSERT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct CodeIssuer {
    pool: SqlitePool,
}

impl CodeIssuer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Return the live code for a resource, or mint a fresh one.
    /// `reused` reports which branch was taken.
    pub async fn issue_or_reuse(
        &self,
        scope: CodeScope,
        resource_id: i64,
        ttl_ms: i64,
    ) -> LoyaltyResult<IssuedCode> {
        let now = now_millis();
        code::retire_expired(&self.pool, scope, resource_id, now).await?;

        if let Some(live) = code::find_live(&self.pool, scope, resource_id, now).await? {
            return Ok(IssuedCode {
                code: live.code,
                expires_at: live.expires_at,
                reused: true,
            });
        }

        let expires_at = now + ttl_ms;
        for _ in 0..INSERT_ATTEMPTS {
            let candidate = generate_code();
            match code::insert(&self.pool, &candidate, scope, resource_id, expires_at, now).await {
                Ok(fresh) => {
                    debug!(?scope, resource_id, "Issued redemption code");
                    return Ok(IssuedCode {
                        code: fresh.code,
                        expires_at: fresh.expires_at,
                        reused: false,
                    });
                }
                Err(RepoError::Duplicate(_)) => {
                    // Either a concurrent issuer won the live-index
                    // race (return theirs) or the code string itself
                    // collided (retry with a new string)
                    if let Some(live) = code::find_live(&self.pool, scope, resource_id, now).await?
                    {
                        return Ok(IssuedCode {
                            code: live.code,
                            expires_at: live.expires_at,
                            reused: true,
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LoyaltyError::Conflict(
            "Failed to allocate a unique code".into(),
        ))
    }

    /// Validate a code without consuming it
    pub async fn validate(&self, raw: &str, scope: CodeScope) -> LoyaltyResult<RedemptionCode> {
        let now = now_millis();
        let found = code::find_by_code(&self.pool, raw)
            .await?
            .filter(|c| c.scope == scope)
            .ok_or(LoyaltyError::CodeNotFound)?;
        if found.consumed_at.is_some() || found.revoked_at.is_some() {
            return Err(LoyaltyError::CodeAlreadyUsed);
        }
        if found.expires_at <= now {
            return Err(LoyaltyError::CodeExpired);
        }
        Ok(found)
    }

    /// Atomically consume a code inside the caller's transaction.
    /// When the guarded update misses, the row is re-read on the same
    /// connection to name the reason.
    pub async fn consume_in_tx(
        &self,
        conn: &mut SqliteConnection,
        raw: &str,
        scope: CodeScope,
        now: i64,
    ) -> LoyaltyResult<()> {
        if code::consume(conn, raw, scope, now).await? {
            return Ok(());
        }
        let found = sqlx::query_as::<_, RedemptionCode>(
            "SELECT id, code, scope, resource_id, expires_at, consumed_at, revoked_at, is_live, created_at FROM redemption_code WHERE code = ?",
        )
        .bind(raw)
        .fetch_optional(conn)
        .await
        .map_err(RepoError::from)?
        .filter(|c| c.scope == scope);

        match found {
            None => Err(LoyaltyError::CodeNotFound),
            Some(c) if c.consumed_at.is_some() || c.revoked_at.is_some() => {
                Err(LoyaltyError::CodeAlreadyUsed)
            }
            Some(_) => Err(LoyaltyError::CodeExpired),
        }
    }

    /// Idempotent admin revoke of the live code for a resource
    pub async fn revoke(&self, scope: CodeScope, resource_id: i64) -> LoyaltyResult<bool> {
        let now = now_millis();
        Ok(code::revoke(&self.pool, scope, resource_id, now).await?)
    }
}

fn generate_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}
