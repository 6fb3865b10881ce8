//! Scope kinds and the scope filter translator.
//!
//! A resolved scope describes the breadth of records a granted action may
//! touch. [`ScopeFilter`] turns that breadth into a constraint the caller's
//! data layer can apply.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::ActorContext;

/// Breadth of records a granted action applies to.
///
/// Variant order matters: derived `Ord` gives the breadth ordering
/// `None < Own < Branch < All` used by rule ordering, deny-overrides and
/// least-privilege narrowing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// No access breadth (the default; paired with denied decisions)
    #[default]
    None,
    /// Actor-owned records only
    Own,
    /// Records in the actor's branch
    Branch,
    /// Unrestricted
    All,
}

impl ScopeKind {
    /// Breadth ordinal, mostly useful in logs and store ordering.
    pub fn breadth(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Own => 1,
            Self::Branch => 2,
            Self::All => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Own => "own",
            Self::Branch => "branch",
            Self::All => "all",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScopeKind {
    type Err = crate::error::AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "own" => Ok(Self::Own),
            "branch" => Ok(Self::Branch),
            "all" => Ok(Self::All),
            other => Err(crate::error::AuthzError::Validation(format!(
                "unknown scope kind `{other}`"
            ))),
        }
    }
}

/// Row-level constraint derived from a resolved scope.
///
/// `MatchNothing` exists as a guard against an engine defect: `none` should
/// only ever appear on a denied decision, where the caller must not query at
/// all. Translating it anyway yields a predicate that matches no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeFilter {
    /// No restriction
    Unrestricted,
    /// Restrict to records whose branch equals the actor's branch
    BranchEquals { branch_id: Uuid },
    /// Restrict to records whose owner equals the actor
    OwnerEquals { owner_id: Uuid },
    /// Matches no rows
    MatchNothing,
}

impl ScopeFilter {
    /// Translate a resolved scope into a data-layer constraint.
    ///
    /// A `branch` scope for an actor with no active branch degrades to
    /// `MatchNothing`: there is no branch to restrict to, and failing closed
    /// beats widening.
    pub fn for_scope(scope: ScopeKind, actor: &ActorContext) -> Self {
        match scope {
            ScopeKind::All => Self::Unrestricted,
            ScopeKind::Branch => match actor.branch_id {
                Some(branch_id) => Self::BranchEquals { branch_id },
                None => Self::MatchNothing,
            },
            ScopeKind::Own => Self::OwnerEquals {
                owner_id: actor.user_id,
            },
            ScopeKind::None => Self::MatchNothing,
        }
    }

    /// Evaluate the constraint against one record's ownership context.
    pub fn matches(&self, owner_id: Option<Uuid>, branch_id: Option<Uuid>) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::BranchEquals { branch_id: b } => branch_id == Some(*b),
            Self::OwnerEquals { owner_id: o } => owner_id == Some(*o),
            Self::MatchNothing => false,
        }
    }

    /// Render as a SQL `WHERE` fragment over the given columns, with the
    /// bound value if any. Callers embed the fragment and bind the uuid.
    pub fn to_sql(&self, owner_col: &str, branch_col: &str) -> (String, Option<Uuid>) {
        match self {
            Self::Unrestricted => ("TRUE".to_string(), None),
            Self::BranchEquals { branch_id } => (format!("{branch_col} = $1"), Some(*branch_id)),
            Self::OwnerEquals { owner_id } => (format!("{owner_col} = $1"), Some(*owner_id)),
            Self::MatchNothing => ("FALSE".to_string(), None),
        }
    }
}
