//! Role-based authorization and audit engine for a point-of-sale backend.
//!
//! The crate answers one question — "may this actor perform this action on
//! this resource, and how much of it may they see?" — and keeps a tamper-
//! evident record of every change to the rules that produce the answer.
//!
//! # Architecture
//!
//! - [`policy`] — rule entities, the reference-data catalog, and the
//!   [`PolicyStore`] contract with in-memory and Postgres implementations
//! - [`condition`] — attribute predicates stored as data on rules,
//!   validated at write time and evaluated fail-closed at decision time
//! - [`engine`] — the decision pipeline: deny-overrides combination and
//!   least-privilege scope resolution
//! - [`scope`] — scope breadth ordering and translation of a resolved
//!   scope into data-layer filters
//! - [`audit`] — append-only audit entries and their query selectors
//! - [`admin`] — the administrative write path; every mutation commits
//!   atomically with its audit entry
//! - [`retention`] — the guarded purge of aged audit entries
//! - [`gate`] — coarse role-membership pre-checks for whole surfaces
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use salepoint_authz::{
//!     AuthorizationRequest, Catalog, DecisionEngine, InMemoryPolicyStore,
//! };
//! # async fn run() -> salepoint_authz::Result<()> {
//! # let (actor, resource_id, action_id) = todo!();
//! let store = Arc::new(InMemoryPolicyStore::new(Catalog::new()));
//! let engine = DecisionEngine::new(store);
//!
//! let request = AuthorizationRequest::new(actor, resource_id, action_id);
//! let decision = engine.decide(&request).await?;
//! if decision.allowed {
//!     let filter = engine.filter_for(&decision, &request.actor);
//!     // apply `filter` to the data query
//! }
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod audit;
pub mod condition;
pub mod engine;
pub mod error;
pub mod gate;
pub mod policy;
pub mod retention;
pub mod scope;
pub mod types;

pub use admin::AdminService;
pub use audit::{AuditEntry, AuditQuery, AuditTargetType};
pub use condition::Condition;
pub use engine::DecisionEngine;
pub use error::{AuthzError, Result};
pub use gate::{GateOutcome, RoleGate};
pub use policy::{
    ActionDef, Catalog, Effect, InMemoryPolicyStore, PermissionRule, PolicyMutation, PolicyStore,
    ResourceDef,
};
#[cfg(feature = "postgres")]
pub use policy::PostgresPolicyStore;
pub use retention::RetentionEnforcer;
pub use scope::{ScopeFilter, ScopeKind};
pub use types::{ActorContext, AuthorizationRequest, Decision, Role, TargetAttributes};

/// Crate version, surfaced by the server health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
