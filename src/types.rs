//! Core authorization types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::scope::ScopeKind;

/// A role identity. Referenced by permission rules and by user role
/// assignment. The identity is stable once referenced by audit history;
/// renaming updates `name`/`label` in place, it never mints a new id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Stable role identifier
    pub id: Uuid,

    /// Unique machine name (e.g. "cashier", "branch_manager")
    pub name: String,

    /// Human-facing display label
    pub label: String,
}

impl Role {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            label: label.into(),
        }
    }
}

/// The actor on whose behalf an authorization request is made.
///
/// `branch_id` is the actor's active branch scope, if any. A global
/// administrator operating inside a branch still carries that branch id,
/// which is what the retention predicate inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    /// Actor's user id
    pub user_id: Uuid,

    /// Actor's assigned role
    pub role_id: Uuid,

    /// Actor's active branch, if branch-scoped
    #[serde(default)]
    pub branch_id: Option<Uuid>,

    /// Whether the actor holds global-administrator standing
    #[serde(default)]
    pub global_admin: bool,
}

impl ActorContext {
    pub fn new(user_id: Uuid, role_id: Uuid) -> Self {
        Self {
            user_id,
            role_id,
            branch_id: None,
            global_admin: false,
        }
    }

    pub fn with_branch(mut self, branch_id: Uuid) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn as_global_admin(mut self) -> Self {
        self.global_admin = true;
        self
    }
}

/// Ownership/branch context of the record an action targets, when the
/// action touches a specific record rather than a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetAttributes {
    /// Owner of the target record
    #[serde(default)]
    pub owner_id: Option<Uuid>,

    /// Branch of the target record
    #[serde(default)]
    pub branch_id: Option<Uuid>,

    /// Additional attributes exposed to condition evaluation
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl TargetAttributes {
    pub fn owned_by(owner_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch_id: Uuid) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Transient authorization request. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Who is acting
    pub actor: ActorContext,

    /// Protected resource type identifier (catalog-owned)
    pub resource_id: Uuid,

    /// Action identifier (catalog-owned)
    pub action_id: Uuid,

    /// Target record context, absent for collection-level checks
    #[serde(default)]
    pub target: Option<TargetAttributes>,
}

impl AuthorizationRequest {
    pub fn new(actor: ActorContext, resource_id: Uuid, action_id: Uuid) -> Self {
        Self {
            actor,
            resource_id,
            action_id,
            target: None,
        }
    }

    pub fn with_target(mut self, target: TargetAttributes) -> Self {
        self.target = Some(target);
        self
    }

    /// Flat attribute object handed to condition evaluation: actor fields
    /// under `actor`, target fields under `target`.
    pub fn condition_attributes(&self) -> Value {
        let mut actor = Map::new();
        actor.insert("id".into(), Value::String(self.actor.user_id.to_string()));
        actor.insert(
            "role_id".into(),
            Value::String(self.actor.role_id.to_string()),
        );
        if let Some(branch) = self.actor.branch_id {
            actor.insert("branch_id".into(), Value::String(branch.to_string()));
        }
        actor.insert("global_admin".into(), Value::Bool(self.actor.global_admin));

        let mut root = Map::new();
        root.insert("actor".into(), Value::Object(actor));

        if let Some(target) = &self.target {
            let mut t = Map::new();
            if let Some(owner) = target.owner_id {
                t.insert("owner_id".into(), Value::String(owner.to_string()));
            }
            if let Some(branch) = target.branch_id {
                t.insert("branch_id".into(), Value::String(branch.to_string()));
            }
            for (k, v) in &target.extra {
                t.insert(k.clone(), v.clone());
            }
            root.insert("target".into(), Value::Object(t));
        }

        Value::Object(root)
    }
}

/// Authorization decision. Transient; returned to the caller and never
/// persisted. `matched_rule_ids` lists every rule that participated in the
/// decision, for caller-side audit traceability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Row-level visibility constraint the caller must apply
    pub scope: ScopeKind,

    /// Rules that participated in this decision
    pub matched_rule_ids: Vec<Uuid>,

    /// Decision timestamp
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn allow(scope: ScopeKind, matched_rule_ids: Vec<Uuid>) -> Self {
        Self {
            allowed: true,
            scope,
            matched_rule_ids,
            decided_at: Utc::now(),
        }
    }

    pub fn deny(matched_rule_ids: Vec<Uuid>) -> Self {
        Self {
            allowed: false,
            scope: ScopeKind::None,
            matched_rule_ids,
            decided_at: Utc::now(),
        }
    }
}
