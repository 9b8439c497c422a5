//! Card Engine
//!
//! Drives the stamp-card lifecycle. Every mutation rides on a guarded
//! statement or a single transaction, so racing POS terminals lose
//! cleanly instead of corrupting the stamp count.

use sqlx::SqlitePool;
use tracing::info;

use shared::models::{
    CardInstance, CardInstanceDetail, CodeScope, EarnEvent, IssuedCode, RewardRedemption,
    StampResult,
};
use shared::util::now_millis;

use crate::db::repository::{RepoError, card, template};
use crate::points::evaluator;

use super::code_issuer::{CodeIssuer, REWARD_CODE_TTL_MS, STAMP_CODE_TTL_MS};
use super::{LoyaltyError, LoyaltyResult};

#[derive(Debug, Clone)]
pub struct CardEngine {
    pool: SqlitePool,
    issuer: CodeIssuer,
}

impl CardEngine {
    pub fn new(pool: SqlitePool) -> Self {
        let issuer = CodeIssuer::new(pool.clone());
        Self { pool, issuer }
    }

    pub fn issuer(&self) -> &CodeIssuer {
        &self.issuer
    }

    /// Claim a card instance for a user.
    ///
    /// The insert itself carries the per-user and emission-cap
    /// guards; when it misses, the counts are re-read to name the
    /// reason.
    pub async fn claim(&self, template_id: i64, user_id: i64) -> LoyaltyResult<CardInstance> {
        let now = now_millis();
        let tpl = template::find_by_id(&self.pool, template_id)
            .await?
            .ok_or(LoyaltyError::TemplateNotFound(template_id))?;

        if !tpl.is_active {
            return Err(LoyaltyError::EmissionClosed("Template is inactive".into()));
        }
        if tpl.emission_start.is_some_and(|start| now < start) {
            return Err(LoyaltyError::EmissionClosed(
                "Emission has not started".into(),
            ));
        }
        if tpl.emission_end.is_some_and(|end| now > end) {
            return Err(LoyaltyError::EmissionClosed("Emission has ended".into()));
        }

        match card::claim_instance(&self.pool, &tpl, user_id, now).await? {
            Some(instance) => {
                info!(template_id, user_id, instance_id = instance.id, "Card claimed");
                Ok(instance)
            }
            None => {
                let live = card::count_live_for_user(&self.pool, template_id, user_id, now).await?;
                if live >= tpl.per_user_limit as i64 {
                    Err(LoyaltyError::LimitExceeded(format!(
                        "User already holds {live} live instance(s), limit {}",
                        tpl.per_user_limit
                    )))
                } else {
                    Err(LoyaltyError::EmissionClosed(
                        "Emission limit reached".into(),
                    ))
                }
            }
        }
    }

    pub async fn card_detail(&self, instance_id: i64) -> LoyaltyResult<CardInstanceDetail> {
        let instance = card::find_instance(&self.pool, instance_id)
            .await?
            .ok_or(LoyaltyError::InstanceNotFound(instance_id))?;
        let tpl = template::find_by_id(&self.pool, instance.template_id)
            .await?
            .ok_or(LoyaltyError::TemplateNotFound(instance.template_id))?;
        let stamps = card::find_stamps(&self.pool, instance_id).await?;
        let redemptions = card::find_redemptions(&self.pool, instance_id).await?;
        Ok(CardInstanceDetail {
            instance,
            template: tpl,
            stamps,
            redemptions,
        })
    }

    /// All of a user's cards with template, stamps and redemptions
    pub async fn list_cards(&self, user_id: i64) -> LoyaltyResult<Vec<CardInstanceDetail>> {
        let instances = card::find_by_user(&self.pool, user_id).await?;
        let mut details = Vec::with_capacity(instances.len());
        for instance in instances {
            details.push(self.card_detail(instance.id).await?);
        }
        Ok(details)
    }

    /// Issue (or re-display) the stamp confirmation code for a card
    pub async fn request_stamp_code(&self, instance_id: i64) -> LoyaltyResult<IssuedCode> {
        let now = now_millis();
        let instance = card::find_instance(&self.pool, instance_id)
            .await?
            .ok_or(LoyaltyError::InstanceNotFound(instance_id))?;
        if instance.is_completed() {
            return Err(LoyaltyError::InstanceCompleted(instance_id));
        }
        if !instance.is_live(now) {
            return Err(LoyaltyError::Conflict("Card instance has expired".into()));
        }
        self.issuer
            .issue_or_reuse(CodeScope::StampConfirm, instance_id, STAMP_CODE_TTL_MS)
            .await
    }

    /// Redeem a stamp code at point of sale.
    ///
    /// Template rule conditions are checked before the code is
    /// consumed, so an unsatisfied condition leaves the code valid
    /// for a corrected retry. The consume + increment + completion
    /// check then commits as one transaction.
    pub async fn redeem_stamp(&self, raw: &str, payload: &EarnEvent) -> LoyaltyResult<StampResult> {
        let now = now_millis();
        let code = self.issuer.validate(raw, CodeScope::StampConfirm).await?;
        let instance_id = code.resource_id;

        let instance = card::find_instance(&self.pool, instance_id)
            .await?
            .ok_or(LoyaltyError::InstanceNotFound(instance_id))?;
        if instance.is_completed() {
            return Err(LoyaltyError::InstanceCompleted(instance_id));
        }
        if !instance.is_live(now) {
            return Err(LoyaltyError::Conflict("Card instance has expired".into()));
        }

        let rules = template::find_rules(&self.pool, instance.template_id).await?;
        for rule in &rules {
            if !evaluator::matches_event(&rule.config, payload, now) {
                return Err(LoyaltyError::RuleNotSatisfied(format!(
                    "Condition '{}' not met",
                    rule.config.rule_type()
                )));
            }
        }

        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;
        self.issuer
            .consume_in_tx(&mut tx, raw, CodeScope::StampConfirm, now)
            .await?;
        let result = card::apply_stamp(&mut tx, instance_id, None, now)
            .await?
            .ok_or(LoyaltyError::InstanceCompleted(instance_id))?;
        tx.commit().await.map_err(RepoError::from)?;

        info!(
            instance_id,
            stamp_no = result.stamp_no,
            completed = result.completed,
            "Stamp redeemed"
        );
        Ok(result)
    }

    /// Issue (or re-display) the claim code for a reached reward.
    /// `link_id` may also name a template reward the card has not
    /// reached yet, which is reported as not-reached rather than
    /// not-found.
    pub async fn request_reward_code(
        &self,
        instance_id: i64,
        link_id: i64,
    ) -> LoyaltyResult<IssuedCode> {
        let instance = card::find_instance(&self.pool, instance_id)
            .await?
            .ok_or(LoyaltyError::InstanceNotFound(instance_id))?;

        if let Some(redemption) = card::find_redemption(&self.pool, link_id).await? {
            if redemption.instance_id != instance_id {
                return Err(LoyaltyError::RewardNotFound(link_id));
            }
            if redemption.used {
                return Err(LoyaltyError::RewardAlreadyUsed(link_id));
            }
            return self
                .issuer
                .issue_or_reuse(CodeScope::RewardClaim, redemption.id, REWARD_CODE_TTL_MS)
                .await;
        }

        let rewards = template::find_rewards(&self.pool, instance.template_id).await?;
        if let Some(reward) = rewards.iter().find(|r| r.id == link_id) {
            return Err(LoyaltyError::RewardNotReached(format!(
                "Stamp {} of this card not reached yet ({} given)",
                reward.stamp_no, instance.stamps_given
            )));
        }
        Err(LoyaltyError::RewardNotFound(link_id))
    }

    /// Redeem a reward code: consume the code and flip `used`, both
    /// in one transaction
    pub async fn redeem_reward(&self, raw: &str) -> LoyaltyResult<RewardRedemption> {
        let now = now_millis();
        let code = self.issuer.validate(raw, CodeScope::RewardClaim).await?;
        let link_id = code.resource_id;

        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;
        self.issuer
            .consume_in_tx(&mut tx, raw, CodeScope::RewardClaim, now)
            .await?;
        if !card::mark_redemption_used(&mut tx, link_id).await? {
            return Err(LoyaltyError::RewardAlreadyUsed(link_id));
        }
        tx.commit().await.map_err(RepoError::from)?;

        info!(link_id, "Reward redeemed");
        card::find_redemption(&self.pool, link_id)
            .await?
            .ok_or(LoyaltyError::RewardNotFound(link_id))
    }

    /// Admin revoke of an unexpired, unused code
    pub async fn revoke_code(&self, scope: CodeScope, resource_id: i64) -> LoyaltyResult<bool> {
        self.issuer.revoke(scope, resource_id).await
    }
}
