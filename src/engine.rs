//! The decision engine: combines matching rules and condition results into
//! a single allow/deny decision plus a resolved scope.
//!
//! # Pipeline
//!
//! 1. Fetch candidate rules for `(actor_role, resource, action)`
//! 2. Drop rules whose condition evaluates to false (unconditional rules
//!    always remain)
//! 3. Apply deny-overrides-at-equal-or-broader-scope, with `deny/none`
//!    acting as a kill switch
//! 4. If any allow survives, resolve the narrowest surviving allow scope
//!    (least privilege); otherwise default deny
//!
//! The engine is request-scoped and stateless between calls: every `decide`
//! reads shared store state and holds nothing across invocations, so
//! concurrent calls are safely independent.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::policy::{Effect, PermissionRule, PolicyStore};
use crate::scope::{ScopeFilter, ScopeKind};
use crate::types::{ActorContext, AuthorizationRequest, Decision, TargetAttributes};

/// Decision engine over a policy store.
pub struct DecisionEngine {
    store: Arc<dyn PolicyStore>,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Decide an authorization request.
    ///
    /// Denial is data: an empty or fully-denied rule set yields
    /// `allowed = false, scope = none`, never an error. Errors surface only
    /// for catalog/configuration defects or storage failures.
    pub async fn decide(&self, request: &AuthorizationRequest) -> Result<Decision> {
        let rules = self
            .store
            .rules_for(request.actor.role_id, request.resource_id, request.action_id)
            .await?;

        if rules.is_empty() {
            debug!(
                role = %request.actor.role_id,
                resource = %request.resource_id,
                action = %request.action_id,
                "no rules for tuple, default deny"
            );
            return Ok(Decision::deny(Vec::new()));
        }

        // Conditional rules that fail their predicate drop out; missing
        // attributes fail closed inside the evaluator.
        let attributes = request.condition_attributes();
        let candidates: Vec<&PermissionRule> = rules
            .iter()
            .filter(|rule| {
                rule.condition
                    .as_ref()
                    .map_or(true, |cond| cond.evaluate(&attributes))
            })
            .collect();

        let matched_rule_ids: Vec<Uuid> = candidates.iter().map(|r| r.id).collect();

        if candidates.is_empty() {
            debug!("all candidate rules filtered by conditions, default deny");
            return Ok(Decision::deny(matched_rule_ids));
        }

        // A deny at scope `none` is a kill switch: it blocks every allow,
        // including strictly broader ones.
        if candidates
            .iter()
            .any(|r| r.effect == Effect::Deny && r.scope == ScopeKind::None)
        {
            debug!("deny/none kill switch matched");
            return Ok(Decision::deny(matched_rule_ids));
        }

        let resolved = match &request.target {
            Some(target) => decide_for_target(&candidates, &request.actor, target),
            None => decide_for_collection(&candidates),
        };

        let decision = match resolved {
            Some(scope) => Decision::allow(scope, matched_rule_ids),
            None => Decision::deny(matched_rule_ids),
        };

        debug!(
            allowed = decision.allowed,
            scope = %decision.scope,
            matched = decision.matched_rule_ids.len(),
            "decision resolved"
        );

        Ok(decision)
    }

    /// Translate a decision's resolved scope into a data-layer filter.
    /// Callers must not query at all on a denied decision; translating one
    /// anyway yields a match-nothing guard.
    pub fn filter_for(&self, decision: &Decision, actor: &ActorContext) -> ScopeFilter {
        ScopeFilter::for_scope(decision.scope, actor)
    }
}

/// Classify the target record's relation to the actor: the narrowest scope
/// breadth that still reaches the record.
fn target_level(actor: &ActorContext, target: &TargetAttributes) -> ScopeKind {
    if target.owner_id == Some(actor.user_id) {
        ScopeKind::Own
    } else if target.branch_id.is_some() && target.branch_id == actor.branch_id {
        ScopeKind::Branch
    } else {
        ScopeKind::All
    }
}

/// Record-level resolution: a rule covers the target iff its scope breadth
/// reaches the target's relation to the actor. Any covering deny blocks
/// every allow for that record.
fn decide_for_target(
    candidates: &[&PermissionRule],
    actor: &ActorContext,
    target: &TargetAttributes,
) -> Option<ScopeKind> {
    let level = target_level(actor, target);

    let covering: Vec<&&PermissionRule> = candidates
        .iter()
        .filter(|r| r.scope != ScopeKind::None && r.scope >= level)
        .collect();

    if covering.iter().any(|r| r.effect == Effect::Deny) {
        return None;
    }

    covering
        .iter()
        .filter(|r| r.effect == Effect::Allow)
        .map(|r| r.scope)
        .min()
}

/// Collection-level resolution over declared scopes: a deny at breadth S
/// blocks every allow at breadth S or narrower; a strictly broader allow
/// survives. The resolved scope is the narrowest surviving allow. An allow
/// at scope `none` grants no breadth at all, so it never produces an
/// allowed decision — `none` pairs only with denial.
fn decide_for_collection(candidates: &[&PermissionRule]) -> Option<ScopeKind> {
    let deny_scopes: Vec<ScopeKind> = candidates
        .iter()
        .filter(|r| r.effect == Effect::Deny)
        .map(|r| r.scope)
        .collect();

    candidates
        .iter()
        .filter(|r| r.effect == Effect::Allow && r.scope != ScopeKind::None)
        .filter(|r| !deny_scopes.iter().any(|d| *d >= r.scope))
        .map(|r| r.scope)
        .min()
}
