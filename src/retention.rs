//! Retention enforcement for the audit trail.
//!
//! Purging audit entries is the single destructive operation in the crate,
//! so it gets its own authorization check rather than a rule lookup: only a
//! branchless global administrator may run it. A branch-scoped admin, even
//! one flagged global, is refused — a purge is organization-wide by nature
//! and must not originate from inside one branch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{AuthzError, Result};
use crate::policy::PolicyStore;
use crate::types::ActorContext;

pub struct RetentionEnforcer {
    store: Arc<dyn PolicyStore>,
}

impl RetentionEnforcer {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Delete audit entries strictly older than `cutoff`. Entries stamped
    /// exactly at the cutoff survive.
    ///
    /// Refusals are security events and are logged as warnings with the
    /// requesting actor before any row is touched.
    pub async fn purge_older_than(
        &self,
        actor: &ActorContext,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        if !actor.global_admin || actor.branch_id.is_some() {
            warn!(
                actor = %actor.user_id,
                global_admin = actor.global_admin,
                branch_scoped = actor.branch_id.is_some(),
                "audit purge refused"
            );
            return Err(AuthzError::RetentionForbidden(format!(
                "actor {} is not a branchless global administrator",
                actor.user_id
            )));
        }

        let deleted = self.store.purge_audit_older_than(cutoff).await?;
        info!(actor = %actor.user_id, %cutoff, deleted, "audit purge completed");
        Ok(deleted)
    }
}
