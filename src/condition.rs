//! Structured predicate trees for conditional permission rules.
//!
//! A condition is data, not code: a tagged-variant tree stored alongside the
//! rule (JSONB in Postgres), so it can be audited and validated
//! independently of engine binaries. Supported predicates:
//!
//! - Comparisons: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Membership: `in`
//! - Combinators: `all` (AND), `any` (OR), `not`
//! - Dot-path attribute access: `actor.branch_id`, `target.amount`
//!
//! Evaluation is pure and total. A missing attribute makes the enclosing
//! comparison false rather than raising — an authorization engine must never
//! fail open. Malformed trees are rejected at rule-write time by
//! [`Condition::validate`]; evaluation itself has no error channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuthzError, Result};

/// Nesting limit for condition trees; deeper trees are rejected at write
/// time so evaluation depth stays bounded.
const MAX_DEPTH: usize = 16;

/// A structured predicate over request-time attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Attribute equals value
    Eq { attr: String, value: Value },
    /// Attribute differs from value
    Ne { attr: String, value: Value },
    /// Attribute strictly greater than value (numeric or RFC 3339 date)
    Gt { attr: String, value: Value },
    /// Attribute greater than or equal to value
    Gte { attr: String, value: Value },
    /// Attribute strictly less than value
    Lt { attr: String, value: Value },
    /// Attribute less than or equal to value
    Lte { attr: String, value: Value },
    /// Attribute is one of the listed values
    In { attr: String, values: Vec<Value> },
    /// Every child condition holds
    All { conditions: Vec<Condition> },
    /// At least one child condition holds
    Any { conditions: Vec<Condition> },
    /// Child condition does not hold
    Not { condition: Box<Condition> },
}

impl Condition {
    /// Validate the tree for storage. Called on the rule-write path, before
    /// persistence; a rule that passes here evaluates without surprises.
    pub fn validate(&self) -> Result<()> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<()> {
        if depth >= MAX_DEPTH {
            return Err(AuthzError::Validation(format!(
                "condition nesting exceeds {MAX_DEPTH} levels"
            )));
        }

        match self {
            Self::Eq { attr, .. } | Self::Ne { attr, .. } => validate_attr(attr),
            Self::Gt { attr, value }
            | Self::Gte { attr, value }
            | Self::Lt { attr, value }
            | Self::Lte { attr, value } => {
                validate_attr(attr)?;
                if as_comparable(value).is_none() {
                    return Err(AuthzError::Validation(format!(
                        "ordered comparison on `{attr}` requires a numeric or RFC 3339 date value"
                    )));
                }
                Ok(())
            }
            Self::In { attr, values } => {
                validate_attr(attr)?;
                if values.is_empty() {
                    return Err(AuthzError::Validation(format!(
                        "membership test on `{attr}` has an empty value list"
                    )));
                }
                Ok(())
            }
            Self::All { conditions } | Self::Any { conditions } => {
                if conditions.is_empty() {
                    return Err(AuthzError::Validation(
                        "all/any combinator has no child conditions".into(),
                    ));
                }
                for cond in conditions {
                    cond.validate_at(depth + 1)?;
                }
                Ok(())
            }
            Self::Not { condition } => condition.validate_at(depth + 1),
        }
    }

    /// Evaluate against a flat attribute object. Total and fail-closed:
    /// anything unresolvable yields `false`.
    pub fn evaluate(&self, attributes: &Value) -> bool {
        match self {
            Self::Eq { attr, value } => lookup(attributes, attr).is_some_and(|v| v == value),
            Self::Ne { attr, value } => lookup(attributes, attr).is_some_and(|v| v != value),
            Self::Gt { attr, value } => compare(attributes, attr, value)
                .is_some_and(|ord| ord == std::cmp::Ordering::Greater),
            Self::Gte { attr, value } => compare(attributes, attr, value)
                .is_some_and(|ord| ord != std::cmp::Ordering::Less),
            Self::Lt { attr, value } => compare(attributes, attr, value)
                .is_some_and(|ord| ord == std::cmp::Ordering::Less),
            Self::Lte { attr, value } => compare(attributes, attr, value)
                .is_some_and(|ord| ord != std::cmp::Ordering::Greater),
            Self::In { attr, values } => {
                lookup(attributes, attr).is_some_and(|v| values.contains(v))
            }
            Self::All { conditions } => conditions.iter().all(|c| c.evaluate(attributes)),
            Self::Any { conditions } => conditions.iter().any(|c| c.evaluate(attributes)),
            Self::Not { condition } => !condition.evaluate(attributes),
        }
    }
}

fn validate_attr(attr: &str) -> Result<()> {
    if attr.is_empty() || attr.split('.').any(str::is_empty) {
        return Err(AuthzError::Validation(format!(
            "invalid attribute path `{attr}`"
        )));
    }
    Ok(())
}

/// Resolve a dot path inside the attribute object. `None` if any segment is
/// missing or the intermediate value is not an object.
fn lookup<'a>(attributes: &'a Value, attr: &str) -> Option<&'a Value> {
    let mut current = attributes;
    for segment in attr.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Either side of an ordered comparison: a number, or an RFC 3339 timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparable {
    Number(f64),
    Timestamp(DateTime<Utc>),
}

fn as_comparable(value: &Value) -> Option<Comparable> {
    match value {
        Value::Number(n) => n.as_f64().map(Comparable::Number),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Comparable::Timestamp(dt.with_timezone(&Utc))),
        _ => None,
    }
}

fn compare(attributes: &Value, attr: &str, value: &Value) -> Option<std::cmp::Ordering> {
    let left = as_comparable(lookup(attributes, attr)?)?;
    let right = as_comparable(value)?;
    match (left, right) {
        (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(&b),
        (Comparable::Timestamp(a), Comparable::Timestamp(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn attrs() -> Value {
        json!({
            "actor": { "id": "u1", "branch_id": "b1" },
            "target": { "owner_id": "u1", "amount": 120, "opened_at": "2026-02-01T09:00:00Z" }
        })
    }

    #[test]
    fn test_eq_on_dot_path() {
        let cond = Condition::Eq {
            attr: "target.owner_id".into(),
            value: json!("u1"),
        };
        assert!(cond.evaluate(&attrs()));

        let cond = Condition::Eq {
            attr: "target.owner_id".into(),
            value: json!("u2"),
        };
        assert!(!cond.evaluate(&attrs()));
    }

    #[test]
    fn test_missing_attribute_fails_closed() {
        let cond = Condition::Eq {
            attr: "target.till_id".into(),
            value: json!("t9"),
        };
        assert!(!cond.evaluate(&attrs()));

        // Ne is a comparison too: an absent attribute is not "different", it
        // is unresolvable, so the whole comparison is false.
        let cond = Condition::Ne {
            attr: "target.till_id".into(),
            value: json!("t9"),
        };
        assert!(!cond.evaluate(&attrs()));
    }

    #[test]
    fn test_numeric_comparison() {
        let gt = Condition::Gt {
            attr: "target.amount".into(),
            value: json!(100),
        };
        assert!(gt.evaluate(&attrs()));

        let lte = Condition::Lte {
            attr: "target.amount".into(),
            value: json!(100),
        };
        assert!(!lte.evaluate(&attrs()));
    }

    #[test]
    fn test_date_comparison() {
        let after_open = Condition::Gte {
            attr: "target.opened_at".into(),
            value: json!("2026-01-01T00:00:00Z"),
        };
        assert!(after_open.evaluate(&attrs()));

        let before_open = Condition::Lt {
            attr: "target.opened_at".into(),
            value: json!("2026-01-01T00:00:00Z"),
        };
        assert!(!before_open.evaluate(&attrs()));
    }

    #[test]
    fn test_mixed_number_and_date_is_false() {
        let cond = Condition::Gt {
            attr: "target.amount".into(),
            value: json!("2026-01-01T00:00:00Z"),
        };
        assert!(!cond.evaluate(&attrs()));
    }

    #[test]
    fn test_membership() {
        let cond = Condition::In {
            attr: "actor.branch_id".into(),
            values: vec![json!("b1"), json!("b2")],
        };
        assert!(cond.evaluate(&attrs()));

        let cond = Condition::In {
            attr: "actor.branch_id".into(),
            values: vec![json!("b3")],
        };
        assert!(!cond.evaluate(&attrs()));
    }

    #[test]
    fn test_combinators() {
        let cond = Condition::All {
            conditions: vec![
                Condition::Eq {
                    attr: "actor.id".into(),
                    value: json!("u1"),
                },
                Condition::Not {
                    condition: Box::new(Condition::Gt {
                        attr: "target.amount".into(),
                        value: json!(500),
                    }),
                },
            ],
        };
        assert!(cond.evaluate(&attrs()));

        let cond = Condition::Any {
            conditions: vec![
                Condition::Eq {
                    attr: "actor.id".into(),
                    value: json!("nobody"),
                },
                Condition::Eq {
                    attr: "actor.branch_id".into(),
                    value: json!("b1"),
                },
            ],
        };
        assert!(cond.evaluate(&attrs()));
    }

    #[test]
    fn test_validate_rejects_empty_combinator() {
        let cond = Condition::All { conditions: vec![] };
        assert!(matches!(cond.validate(), Err(AuthzError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_empty_membership_list() {
        let cond = Condition::In {
            attr: "actor.id".into(),
            values: vec![],
        };
        assert!(cond.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_attr_path() {
        let cond = Condition::Eq {
            attr: "actor..id".into(),
            value: json!(1),
        };
        assert!(cond.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_comparable_ordered_value() {
        let cond = Condition::Gt {
            attr: "target.amount".into(),
            value: json!({"nested": true}),
        };
        assert!(cond.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_excessive_nesting() {
        let mut cond = Condition::Eq {
            attr: "actor.id".into(),
            value: json!("u1"),
        };
        for _ in 0..20 {
            cond = Condition::Not {
                condition: Box::new(cond),
            };
        }
        assert!(cond.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let cond = Condition::Any {
            conditions: vec![
                Condition::Eq {
                    attr: "target.owner_id".into(),
                    value: json!("u1"),
                },
                Condition::In {
                    attr: "target.status".into(),
                    values: vec![json!("open"), json!("held")],
                },
            ],
        };
        let encoded = serde_json::to_value(&cond).unwrap();
        assert_eq!(encoded["op"], "any");
        let decoded: Condition = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, cond);
    }

    proptest! {
        // Fail-closed property: a condition referencing an attribute absent
        // from the context always evaluates to false.
        #[test]
        fn prop_absent_attribute_is_false(name in "[a-z]{1,12}", value in -1000i64..1000) {
            let ctx = json!({ "actor": { "id": "u1" } });
            prop_assume!(name != "actor");
            let conds = [
                Condition::Eq { attr: name.clone(), value: json!(value) },
                Condition::Gt { attr: name.clone(), value: json!(value) },
                Condition::In { attr: name.clone(), values: vec![json!(value)] },
            ];
            for cond in conds {
                prop_assert!(!cond.evaluate(&ctx));
            }
        }
    }
}
