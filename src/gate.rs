//! Coarse pre-check gating entire surfaces by role name.
//!
//! This is the fast outer ring: a surface (an admin console, a reporting
//! area) declares the role names permitted to enter at all, and the gate
//! answers from list membership before any rule lookup runs. A refusal here
//! must short-circuit the caller before the decision engine is invoked.
//! Passing the gate grants nothing by itself; every operation behind it
//! still goes through the decision engine.

use std::collections::HashSet;

/// Outcome of a coarse role check. The two refusal cases are distinct for
/// observability only — a missing role assignment is an account problem, a
/// non-permitted role an access problem — and must collapse to the same
/// access-denied response at the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Allowed,
    NoRoleAssigned,
    RoleNotPermitted,
}

impl GateOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateOutcome::Allowed)
    }
}

/// A named surface and the role names allowed through it.
#[derive(Debug, Clone)]
pub struct RoleGate {
    surface: String,
    permitted: HashSet<String>,
}

impl RoleGate {
    pub fn new<I, S>(surface: impl Into<String>, permitted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            surface: surface.into(),
            permitted: permitted.into_iter().map(Into::into).collect(),
        }
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    /// Check a user's role name against the gate. `None` means the user has
    /// no role assigned at all.
    pub fn check(&self, role_name: Option<&str>) -> GateOutcome {
        match role_name {
            None => GateOutcome::NoRoleAssigned,
            Some(name) if self.permitted.contains(name) => GateOutcome::Allowed,
            Some(_) => GateOutcome::RoleNotPermitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_outcomes_are_distinct() {
        let gate = RoleGate::new("admin-console", ["owner", "manager"]);

        assert_eq!(gate.check(Some("manager")), GateOutcome::Allowed);
        assert!(gate.check(Some("manager")).is_allowed());

        assert_eq!(gate.check(None), GateOutcome::NoRoleAssigned);
        assert_eq!(gate.check(Some("cashier")), GateOutcome::RoleNotPermitted);
        assert!(!gate.check(None).is_allowed());
    }

    #[test]
    fn test_gate_is_exact_match() {
        let gate = RoleGate::new("reports", ["manager"]);
        assert_eq!(gate.check(Some("Manager")), GateOutcome::RoleNotPermitted);
    }

    #[test]
    fn test_empty_gate_permits_nobody() {
        let gate = RoleGate::new("closed", Vec::<String>::new());
        assert_eq!(gate.check(Some("owner")), GateOutcome::RoleNotPermitted);
    }
}
