//! Administrative write path for rules and role assignments.
//!
//! Every mutation here lands through [`PolicyStore::apply_mutation`], so the
//! change and its audit entry commit together or not at all. Conditions are
//! validated before persistence; a malformed predicate is rejected at write
//! time rather than silently failing closed at evaluation time.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditTargetType};
use crate::error::{AuthzError, Result};
use crate::policy::{PermissionRule, PolicyMutation, PolicyStore};
use crate::types::ActorContext;

/// Rule and role-assignment mutations on behalf of an administrator.
pub struct AdminService {
    store: Arc<dyn PolicyStore>,
}

impl AdminService {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Persist a new rule with its creation audit entry.
    pub async fn create_rule(
        &self,
        actor: &ActorContext,
        rule: PermissionRule,
        reason: Option<String>,
    ) -> Result<PermissionRule> {
        if let Some(condition) = &rule.condition {
            condition.validate()?;
        }

        let entry = AuditEntry::new(
            actor.user_id,
            AuditTargetType::Role,
            rule.role_id,
            "rule_created",
            None,
            Some(rule.snapshot()),
            reason,
        );
        self.store
            .apply_mutation(PolicyMutation::CreateRule(rule.clone()), entry)
            .await?;

        info!(rule = %rule.id, role = %rule.role_id, "rule created");
        Ok(rule)
    }

    /// Replace an existing rule's effect, scope or condition.
    ///
    /// A submission that changes nothing must carry a reason; without one it
    /// is rejected, keeping the audit trail free of meaningless entries.
    pub async fn update_rule(
        &self,
        actor: &ActorContext,
        mut rule: PermissionRule,
        reason: Option<String>,
    ) -> Result<PermissionRule> {
        if let Some(condition) = &rule.condition {
            condition.validate()?;
        }

        let before = self
            .store
            .get_rule(rule.id)
            .await?
            .ok_or(AuthzError::RuleNotFound(rule.id))?;

        let unchanged = before.effect == rule.effect
            && before.scope == rule.scope
            && before.condition == rule.condition
            && before.enabled == rule.enabled;
        if unchanged && reason.is_none() {
            return Err(AuthzError::Validation(
                "update changes nothing; supply a reason to record it anyway".into(),
            ));
        }

        // Tuple identity is immutable; only the rule body may move.
        rule.role_id = before.role_id;
        rule.resource_id = before.resource_id;
        rule.action_id = before.action_id;
        rule.created_at = before.created_at;
        rule.updated_at = chrono::Utc::now();

        let entry = AuditEntry::new(
            actor.user_id,
            AuditTargetType::Role,
            rule.role_id,
            "rule_updated",
            Some(before.snapshot()),
            Some(rule.snapshot()),
            reason,
        );
        self.store
            .apply_mutation(PolicyMutation::UpdateRule(rule.clone()), entry)
            .await?;

        info!(rule = %rule.id, "rule updated");
        Ok(rule)
    }

    /// Soft-delete a rule. The row survives disabled so historical audit
    /// entries keep a referent.
    pub async fn disable_rule(
        &self,
        actor: &ActorContext,
        rule_id: Uuid,
        reason: Option<String>,
    ) -> Result<()> {
        let before = self
            .store
            .get_rule(rule_id)
            .await?
            .ok_or(AuthzError::RuleNotFound(rule_id))?;

        let mut after = before.clone();
        after.enabled = false;
        after.updated_at = chrono::Utc::now();

        let entry = AuditEntry::new(
            actor.user_id,
            AuditTargetType::Role,
            before.role_id,
            "rule_disabled",
            Some(before.snapshot()),
            Some(after.snapshot()),
            reason,
        );
        self.store
            .apply_mutation(PolicyMutation::DisableRule(rule_id), entry)
            .await?;

        info!(rule = %rule_id, "rule disabled");
        Ok(())
    }

    /// Record a role assignment change. The user row itself is owned by the
    /// user store; only the audit entry lands here.
    pub async fn record_role_assignment(
        &self,
        actor: &ActorContext,
        user_id: Uuid,
        previous_role: Option<Uuid>,
        new_role: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<()> {
        let payload = |role: Option<Uuid>| {
            role.map(|id| serde_json::json!({ "role_id": id }))
        };

        let entry = AuditEntry::new(
            actor.user_id,
            AuditTargetType::User,
            user_id,
            "role_assigned",
            payload(previous_role),
            payload(new_role),
            reason,
        );
        self.store
            .apply_mutation(PolicyMutation::AuditOnly, entry)
            .await?;

        info!(user = %user_id, "role assignment recorded");
        Ok(())
    }
}
