//! Permission rules, the role/resource/action catalog, and policy storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tokio::sync::RwLock;
use uuid::Uuid;

use async_trait::async_trait;

use crate::audit::{AuditEntry, AuditQuery};
use crate::condition::Condition;
use crate::error::{AuthzError, Result};
use crate::scope::ScopeKind;
use crate::types::Role;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresPolicyStore;

/// Rule effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Grant access
    Allow,
    /// Explicitly revoke access
    Deny,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl std::str::FromStr for Effect {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(AuthzError::Validation(format!("unknown effect `{other}`"))),
        }
    }
}

/// The central policy entity: one rule assigning an effect and a scope to a
/// `(role, resource, action)` tuple, optionally narrowed by a condition.
///
/// Multiple rules may coexist for the same tuple; the decision engine, not
/// the data model, resolves conflicts. Rules are never hard-deleted —
/// `enabled = false` preserves audit referential integrity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub id: Uuid,
    pub role_id: Uuid,
    pub resource_id: Uuid,
    pub action_id: Uuid,
    pub effect: Effect,
    #[serde(default)]
    pub scope: ScopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl PermissionRule {
    pub fn new(
        role_id: Uuid,
        resource_id: Uuid,
        action_id: Uuid,
        effect: Effect,
        scope: ScopeKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            role_id,
            resource_id,
            action_id,
            effect,
            scope,
            condition: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// JSON snapshot used as an audit payload.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A protected resource type (e.g. orders, products). The catalog of these
/// is external reference data; the engine treats ids as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDef {
    pub id: Uuid,
    pub name: String,
}

/// A named operation on a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    pub id: Uuid,
    pub name: String,
}

/// Immutable reference data: the known roles, resources and actions.
///
/// Loaded once at store construction and swapped wholesale on explicit
/// reload — never mutated in place, so decisions see a consistent catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    roles: HashMap<Uuid, Role>,
    resources: HashMap<Uuid, ResourceDef>,
    actions: HashMap<Uuid, ActionDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role.id, role);
        self
    }

    pub fn with_resource(mut self, resource: ResourceDef) -> Self {
        self.resources.insert(resource.id, resource);
        self
    }

    pub fn with_action(mut self, action: ActionDef) -> Self {
        self.actions.insert(action.id, action);
        self
    }

    pub fn role(&self, id: Uuid) -> Option<&Role> {
        self.roles.get(&id)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceDef> {
        self.resources.values()
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionDef> {
        self.actions.values()
    }

    /// Validate that a `(role, resource, action)` tuple names known catalog
    /// identities. Failure here is a configuration error, not a deny.
    pub fn ensure_tuple(&self, role_id: Uuid, resource_id: Uuid, action_id: Uuid) -> Result<()> {
        if !self.roles.contains_key(&role_id) {
            return Err(AuthzError::UnknownRole(role_id));
        }
        if !self.resources.contains_key(&resource_id) {
            return Err(AuthzError::UnknownResource(resource_id));
        }
        if !self.actions.contains_key(&action_id) {
            return Err(AuthzError::UnknownAction(action_id));
        }
        Ok(())
    }
}

/// A rule/role mutation, applied atomically with its audit entry.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyMutation {
    /// Insert a new rule
    CreateRule(PermissionRule),
    /// Replace an existing rule (matched by id)
    UpdateRule(PermissionRule),
    /// Soft-delete a rule, preserving audit referential integrity
    DisableRule(Uuid),
    /// No rule change; the row being audited lives elsewhere (role
    /// assignment is owned by the user store)
    AuditOnly,
}

/// Storage contract for rules and their audit trail.
///
/// `apply_mutation` is the only write path for rules, and it is atomic by
/// contract: the mutation and its audit entry both persist or neither does.
/// Partial application is a correctness violation and must abort the whole
/// operation.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// All enabled rules for the tuple, ordered by scope breadth descending
    /// then `updated_at` descending. Returns a configuration error if the
    /// tuple names unknown catalog identities.
    async fn rules_for(
        &self,
        role_id: Uuid,
        resource_id: Uuid,
        action_id: Uuid,
    ) -> Result<Vec<PermissionRule>>;

    /// Fetch one rule by id.
    async fn get_rule(&self, id: Uuid) -> Result<Option<PermissionRule>>;

    /// Apply a mutation and its audit entry as one atomic unit.
    async fn apply_mutation(&self, mutation: PolicyMutation, audit: AuditEntry) -> Result<()>;

    /// Audit entries for the given selector, time-descending, capped at
    /// `limit`.
    async fn query_audit(&self, query: AuditQuery, limit: usize) -> Result<Vec<AuditEntry>>;

    /// Delete audit entries strictly older than `cutoff`, returning the
    /// count. Raw primitive — authorization lives in
    /// [`RetentionEnforcer`](crate::retention::RetentionEnforcer), which is
    /// the only caller.
    async fn purge_audit_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Swap in a fresh catalog snapshot.
    async fn reload_catalog(&self, catalog: Catalog) -> Result<()>;
}

/// Sort rules by scope breadth descending, then most recently updated.
pub(crate) fn order_rules(rules: &mut [PermissionRule]) {
    rules.sort_by(|a, b| {
        b.scope
            .cmp(&a.scope)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}

struct StoreState {
    catalog: Catalog,
    rules: HashMap<Uuid, PermissionRule>,
    audit: Vec<AuditEntry>,
}

/// In-memory policy store, used for embedding and tests.
///
/// A single lock covers rules and audit entries, which is what makes
/// `apply_mutation` trivially atomic here; the Postgres store gets the same
/// guarantee from a transaction. The same single lock means a retention
/// purge briefly holds up concurrent audit writes — fine at the data
/// volumes this store is meant for; deployments where tail deletion must
/// not contend with appends use [`PostgresPolicyStore`], where `DELETE` on
/// old rows does not block new inserts.
pub struct InMemoryPolicyStore {
    state: RwLock<StoreState>,
    /// Crash-fault hook for the test suite: when armed, the next
    /// `apply_mutation` fails after staging the rule change but before
    /// anything becomes visible, proving rollback.
    fail_next_apply: AtomicBool,
}

impl InMemoryPolicyStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            state: RwLock::new(StoreState {
                catalog,
                rules: HashMap::new(),
                audit: Vec::new(),
            }),
            fail_next_apply: AtomicBool::new(false),
        }
    }

    /// Arm the crash-fault hook. The next `apply_mutation` call aborts as if
    /// the process died between the rule write and the audit write.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, AtomicOrdering::SeqCst);
    }

    /// Total number of audit entries currently held (test support).
    pub async fn audit_len(&self) -> usize {
        self.state.read().await.audit.len()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn rules_for(
        &self,
        role_id: Uuid,
        resource_id: Uuid,
        action_id: Uuid,
    ) -> Result<Vec<PermissionRule>> {
        let state = self.state.read().await;
        state.catalog.ensure_tuple(role_id, resource_id, action_id)?;

        let mut rules: Vec<PermissionRule> = state
            .rules
            .values()
            .filter(|r| {
                r.enabled
                    && r.role_id == role_id
                    && r.resource_id == resource_id
                    && r.action_id == action_id
            })
            .cloned()
            .collect();

        order_rules(&mut rules);
        Ok(rules)
    }

    async fn get_rule(&self, id: Uuid) -> Result<Option<PermissionRule>> {
        let state = self.state.read().await;
        Ok(state.rules.get(&id).cloned())
    }

    async fn apply_mutation(&self, mutation: PolicyMutation, audit: AuditEntry) -> Result<()> {
        let mut state = self.state.write().await;

        // Stage the rule change without touching live state, so a failure
        // before the audit append leaves nothing behind.
        let staged: Option<PermissionRule> = match mutation {
            PolicyMutation::CreateRule(rule) => {
                if state.rules.contains_key(&rule.id) {
                    return Err(AuthzError::Validation(format!(
                        "rule {} already exists",
                        rule.id
                    )));
                }
                Some(rule)
            }
            PolicyMutation::UpdateRule(rule) => {
                if !state.rules.contains_key(&rule.id) {
                    return Err(AuthzError::RuleNotFound(rule.id));
                }
                Some(rule)
            }
            PolicyMutation::DisableRule(id) => {
                let mut rule = state
                    .rules
                    .get(&id)
                    .cloned()
                    .ok_or(AuthzError::RuleNotFound(id))?;
                rule.enabled = false;
                rule.updated_at = Utc::now();
                Some(rule)
            }
            PolicyMutation::AuditOnly => None,
        };

        if self.fail_next_apply.swap(false, AtomicOrdering::SeqCst) {
            return Err(AuthzError::Internal(
                "simulated crash between rule mutation and audit write".into(),
            ));
        }

        if let Some(rule) = staged {
            state.rules.insert(rule.id, rule);
        }
        state.audit.push(audit);
        Ok(())
    }

    async fn query_audit(&self, query: AuditQuery, limit: usize) -> Result<Vec<AuditEntry>> {
        let state = self.state.read().await;

        let mut entries: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| match &query {
                AuditQuery::ByTarget {
                    target_type,
                    target_id,
                } => e.target_type == *target_type && e.target_id == *target_id,
                AuditQuery::ByActor { actor_user_id } => e.actor_user_id == *actor_user_id,
            })
            .cloned()
            .collect();

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn purge_audit_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.audit.len();
        state.audit.retain(|e| e.created_at >= cutoff);
        Ok((before - state.audit.len()) as u64)
    }

    async fn reload_catalog(&self, catalog: Catalog) -> Result<()> {
        let mut state = self.state.write().await;
        state.catalog = catalog;
        Ok(())
    }
}
