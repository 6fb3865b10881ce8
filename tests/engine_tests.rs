//! End-to-end decision tests over the in-memory store: rule combination,
//! condition filtering and scope resolution as a caller sees them.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use salepoint_authz::{
    ActionDef, ActorContext, AuditEntry, AuditTargetType, AuthorizationRequest, Catalog,
    Condition, DecisionEngine, Effect, InMemoryPolicyStore, PermissionRule, PolicyMutation,
    PolicyStore, ResourceDef, Role, ScopeFilter, ScopeKind, TargetAttributes,
};

struct Harness {
    engine: DecisionEngine,
    store: Arc<InMemoryPolicyStore>,
    role: Role,
    resource: Uuid,
    action: Uuid,
}

impl Harness {
    fn new() -> Self {
        let role = Role::new("cashier", "Cashier");
        let resource = Uuid::new_v4();
        let action = Uuid::new_v4();
        let catalog = Catalog::new()
            .with_role(role.clone())
            .with_resource(ResourceDef {
                id: resource,
                name: "orders".into(),
            })
            .with_action(ActionDef {
                id: action,
                name: "update".into(),
            });
        let store = Arc::new(InMemoryPolicyStore::new(catalog));
        Self {
            engine: DecisionEngine::new(store.clone()),
            store,
            role,
            resource,
            action,
        }
    }

    async fn rule(&self, effect: Effect, scope: ScopeKind) -> PermissionRule {
        self.conditional_rule(effect, scope, None).await
    }

    async fn conditional_rule(
        &self,
        effect: Effect,
        scope: ScopeKind,
        condition: Option<Condition>,
    ) -> PermissionRule {
        let mut rule =
            PermissionRule::new(self.role.id, self.resource, self.action, effect, scope);
        if let Some(c) = condition {
            rule = rule.with_condition(c);
        }
        let entry = AuditEntry::new(
            Uuid::new_v4(),
            AuditTargetType::Role,
            self.role.id,
            "rule_created",
            None,
            Some(rule.snapshot()),
            None,
        );
        self.store
            .apply_mutation(PolicyMutation::CreateRule(rule.clone()), entry)
            .await
            .unwrap();
        rule
    }

    fn request(&self, actor: ActorContext) -> AuthorizationRequest {
        AuthorizationRequest::new(actor, self.resource, self.action)
    }

    fn actor(&self) -> ActorContext {
        ActorContext::new(Uuid::new_v4(), self.role.id)
    }
}

#[tokio::test]
async fn test_no_rules_is_default_deny() {
    let h = Harness::new();
    let decision = h.engine.decide(&h.request(h.actor())).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.scope, ScopeKind::None);
}

#[tokio::test]
async fn test_unknown_tuple_is_configuration_error_not_deny() {
    let h = Harness::new();
    let request = AuthorizationRequest::new(h.actor(), Uuid::new_v4(), h.action);
    let err = h.engine.decide(&request).await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_least_privilege_picks_narrowest_allow() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::All).await;
    h.rule(Effect::Allow, ScopeKind::Own).await;
    h.rule(Effect::Allow, ScopeKind::Branch).await;

    let decision = h.engine.decide(&h.request(h.actor())).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.scope, ScopeKind::Own);
    assert_eq!(decision.matched_rule_ids.len(), 3);
}

#[tokio::test]
async fn test_deny_blocks_equal_and_narrower_allows() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::Own).await;
    h.rule(Effect::Allow, ScopeKind::Branch).await;
    h.rule(Effect::Deny, ScopeKind::Branch).await;

    let decision = h.engine.decide(&h.request(h.actor())).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.scope, ScopeKind::None);
}

#[tokio::test]
async fn test_strictly_broader_allow_survives_deny() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::Branch).await;
    h.rule(Effect::Deny, ScopeKind::Own).await;

    let decision = h.engine.decide(&h.request(h.actor())).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.scope, ScopeKind::Branch);
}

#[tokio::test]
async fn test_allow_none_grants_nothing() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::None).await;

    // Zero breadth: the decision stays denied, for collections and for a
    // concrete record alike.
    let actor = h.actor();
    let decision = h.engine.decide(&h.request(actor.clone())).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.scope, ScopeKind::None);

    let targeted = h
        .request(actor.clone())
        .with_target(TargetAttributes::owned_by(actor.user_id));
    assert!(!h.engine.decide(&targeted).await.unwrap().allowed);
}

#[tokio::test]
async fn test_deny_none_blocks_everything() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::All).await;
    h.rule(Effect::Deny, ScopeKind::None).await;

    let decision = h.engine.decide(&h.request(h.actor())).await.unwrap();
    assert!(!decision.allowed);
}

#[tokio::test]
async fn test_own_scope_covers_own_record_only() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::Own).await;

    let u1 = h.actor();
    let mine = h
        .request(u1.clone())
        .with_target(TargetAttributes::owned_by(u1.user_id));
    let decision = h.engine.decide(&mine).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.scope, ScopeKind::Own);

    let theirs = h
        .request(u1)
        .with_target(TargetAttributes::owned_by(Uuid::new_v4()));
    let decision = h.engine.decide(&theirs).await.unwrap();
    assert!(!decision.allowed);
}

#[tokio::test]
async fn test_covering_deny_blocks_broader_allow_on_own_record() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::Branch).await;
    h.rule(Effect::Deny, ScopeKind::Own).await;

    // With a concrete record owned by the actor, the own-scope deny covers
    // it, so the branch allow does not help.
    let actor = h.actor();
    let request = h
        .request(actor.clone())
        .with_target(TargetAttributes::owned_by(actor.user_id));
    let decision = h.engine.decide(&request).await.unwrap();
    assert!(!decision.allowed);
}

#[tokio::test]
async fn test_branch_record_out_of_reach_of_own_allow() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::Branch).await;
    h.rule(Effect::Deny, ScopeKind::Own).await;

    // A colleague's record in the same branch sits at branch level; the
    // own-scope deny does not cover it and the branch allow does.
    let branch = Uuid::new_v4();
    let actor = h.actor().with_branch(branch);
    let request = h
        .request(actor)
        .with_target(TargetAttributes::owned_by(Uuid::new_v4()).with_branch(branch));
    let decision = h.engine.decide(&request).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.scope, ScopeKind::Branch);
}

#[tokio::test]
async fn test_foreign_branch_record_needs_all_scope() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::Branch).await;

    let actor = h.actor().with_branch(Uuid::new_v4());
    let request = h
        .request(actor)
        .with_target(TargetAttributes::owned_by(Uuid::new_v4()).with_branch(Uuid::new_v4()));
    let decision = h.engine.decide(&request).await.unwrap();
    assert!(!decision.allowed);
}

#[tokio::test]
async fn test_false_condition_drops_rule() {
    let h = Harness::new();
    let cond = Condition::Eq {
        attr: "target.status".into(),
        value: json!("open"),
    };
    h.conditional_rule(Effect::Allow, ScopeKind::Own, Some(cond))
        .await;

    let actor = h.actor();
    let open = h.request(actor.clone()).with_target(
        TargetAttributes::owned_by(actor.user_id).with_extra("status", json!("open")),
    );
    assert!(h.engine.decide(&open).await.unwrap().allowed);

    let closed = h.request(actor.clone()).with_target(
        TargetAttributes::owned_by(actor.user_id).with_extra("status", json!("closed")),
    );
    assert!(!h.engine.decide(&closed).await.unwrap().allowed);

    // Missing attribute fails closed, same as false.
    let missing = h
        .request(actor.clone())
        .with_target(TargetAttributes::owned_by(actor.user_id));
    assert!(!h.engine.decide(&missing).await.unwrap().allowed);
}

#[tokio::test]
async fn test_conditional_deny_out_of_play_when_false() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::Branch).await;
    let cond = Condition::Eq {
        attr: "actor.global_admin".into(),
        value: json!(false),
    };
    h.conditional_rule(Effect::Deny, ScopeKind::Branch, Some(cond))
        .await;

    // For a global admin the deny's condition is false, so it drops out and
    // the allow stands.
    let admin = h.actor().as_global_admin();
    assert!(h.engine.decide(&h.request(admin)).await.unwrap().allowed);

    // For a regular actor it bites.
    assert!(!h.engine.decide(&h.request(h.actor())).await.unwrap().allowed);
}

#[tokio::test]
async fn test_disabled_rule_is_invisible() {
    let h = Harness::new();
    let rule = h.rule(Effect::Allow, ScopeKind::All).await;
    assert!(h.engine.decide(&h.request(h.actor())).await.unwrap().allowed);

    let entry = AuditEntry::new(
        Uuid::new_v4(),
        AuditTargetType::Role,
        h.role.id,
        "rule_disabled",
        Some(rule.snapshot()),
        None,
        None,
    );
    h.store
        .apply_mutation(PolicyMutation::DisableRule(rule.id), entry)
        .await
        .unwrap();

    assert!(!h.engine.decide(&h.request(h.actor())).await.unwrap().allowed);
}

#[tokio::test]
async fn test_scope_filter_translation() {
    let h = Harness::new();
    h.rule(Effect::Allow, ScopeKind::Branch).await;

    let branch = Uuid::new_v4();
    let actor = h.actor().with_branch(branch);
    let decision = h.engine.decide(&h.request(actor.clone())).await.unwrap();
    assert_eq!(
        h.engine.filter_for(&decision, &actor),
        ScopeFilter::BranchEquals { branch_id: branch }
    );

    // Branch scope without a branch assignment must not widen: it matches
    // nothing.
    let branchless = h.actor();
    let decision = h.engine.decide(&h.request(branchless.clone())).await.unwrap();
    assert_eq!(
        h.engine.filter_for(&decision, &branchless),
        ScopeFilter::MatchNothing
    );
}
