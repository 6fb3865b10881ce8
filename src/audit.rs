//! Audit trail types for permission and role mutations.
//!
//! Every mutation to a permission rule or to a user's role assignment is
//! captured as an append-only [`AuditEntry`] with before/after snapshots.
//! Entries are written atomically with the mutation they describe (see
//! [`PolicyStore::apply_mutation`](crate::policy::PolicyStore::apply_mutation))
//! and are never updated or deleted afterwards, except through the
//! [`RetentionEnforcer`](crate::retention::RetentionEnforcer).
//!
//! The store must serve two access patterns efficiently, which is why the
//! schema carries compound indexes on `(target_type, target_id, created_at)`
//! and `(actor_user_id, created_at)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What kind of entity a mutation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditTargetType {
    /// A role (its permission rules)
    Role,
    /// A user (their role assignment)
    User,
}

impl AuditTargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::User => "user",
        }
    }
}

impl std::str::FromStr for AuditTargetType {
    type Err = crate::error::AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role" => Ok(Self::Role),
            "user" => Ok(Self::User),
            other => Err(crate::error::AuthzError::Validation(format!(
                "unknown audit target type `{other}`"
            ))),
        }
    }
}

/// One immutable audit row.
///
/// `payload_before` is null only for creation events; `payload_after` is
/// null only for deletion/revocation events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry id
    pub id: Uuid,

    /// Who performed the mutation
    pub actor_user_id: Uuid,

    /// Kind of entity targeted
    pub target_type: AuditTargetType,

    /// Targeted role or user id
    pub target_id: Uuid,

    /// Free-form classification, e.g. "rule_created", "rule_updated",
    /// "rule_disabled", "role_assigned", "role_revoked"
    pub action_type: String,

    /// Snapshot before the mutation, if the target existed
    pub payload_before: Option<Value>,

    /// Snapshot after the mutation, if the target still exists
    pub payload_after: Option<Value>,

    /// Optional operator-supplied justification
    pub reason: Option<String>,

    /// Append timestamp
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an entry for a yet-to-commit mutation. The store assigns this
    /// entry and the mutation to the same transaction.
    pub fn new(
        actor_user_id: Uuid,
        target_type: AuditTargetType,
        target_id: Uuid,
        action_type: impl Into<String>,
        payload_before: Option<Value>,
        payload_after: Option<Value>,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_user_id,
            target_type,
            target_id,
            action_type: action_type.into(),
            payload_before,
            payload_after,
            reason,
            created_at: Utc::now(),
        }
    }
}

/// Query selector for the two indexed audit access patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditQuery {
    /// Entries for one target, time-descending
    ByTarget {
        target_type: AuditTargetType,
        target_id: Uuid,
    },
    /// Entries performed by one actor, time-descending
    ByActor { actor_user_id: Uuid },
}
