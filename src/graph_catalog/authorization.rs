//! Declarative authorization annotations attached to entities and fields.
//!
//! Rules are plain data here; `translate::authorization` turns them into
//! predicates. An annotation holds two lists: `filter` rules silently exclude
//! rows, `validate` rules abort the operation when they do not hold.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationOperation {
    Read,
    Aggregate,
    Create,
    Update,
    Delete,
    /// connect
    CreateRelationship,
    /// disconnect
    DeleteRelationship,
}

impl AuthorizationOperation {
    pub const ALL: [AuthorizationOperation; 7] = [
        AuthorizationOperation::Read,
        AuthorizationOperation::Aggregate,
        AuthorizationOperation::Create,
        AuthorizationOperation::Update,
        AuthorizationOperation::Delete,
        AuthorizationOperation::CreateRelationship,
        AuthorizationOperation::DeleteRelationship,
    ];
}

/// When a validate rule is checked relative to the side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationTiming {
    Before,
    After,
}

fn all_operations() -> Vec<AuthorizationOperation> {
    AuthorizationOperation::ALL.to_vec()
}

fn both_timings() -> Vec<AuthorizationTiming> {
    vec![AuthorizationTiming::Before, AuthorizationTiming::After]
}

fn default_true() -> bool {
    true
}

/// Condition tree over node properties (`node`) and caller claims (`jwt`).
///
/// Values inside `node` may be the string `"$jwt.<claim>"` to compare a node
/// property against a claim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuthorizationWhere {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<Map<String, Value>>,
    #[serde(rename = "AND", default, skip_serializing_if = "Vec::is_empty")]
    pub and: Vec<AuthorizationWhere>,
    #[serde(rename = "OR", default, skip_serializing_if = "Vec::is_empty")]
    pub or: Vec<AuthorizationWhere>,
    #[serde(rename = "NOT", default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<AuthorizationWhere>>,
}

impl AuthorizationWhere {
    /// True when the tree contains no `node` condition anywhere.
    pub fn is_claim_only(&self) -> bool {
        self.node.is_none()
            && self.and.iter().all(|w| w.is_claim_only())
            && self.or.iter().all(|w| w.is_claim_only())
            && self.not.as_ref().map(|w| w.is_claim_only()).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRule {
    #[serde(default = "all_operations")]
    pub operations: Vec<AuthorizationOperation>,
    /// Only meaningful for validate rules
    #[serde(default = "both_timings")]
    pub when: Vec<AuthorizationTiming>,
    #[serde(default = "default_true")]
    pub require_authentication: bool,
    #[serde(rename = "where", default)]
    pub where_clause: AuthorizationWhere,
}

impl AuthorizationRule {
    pub fn applies_to(&self, operations: &[AuthorizationOperation]) -> bool {
        self.operations.iter().any(|op| operations.contains(op))
    }

    pub fn applies_at(&self, timing: AuthorizationTiming) -> bool {
        self.when.contains(&timing)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuthorizationAnnotation {
    #[serde(default)]
    pub filter: Vec<AuthorizationRule>,
    #[serde(default)]
    pub validate: Vec<AuthorizationRule>,
}

impl AuthorizationAnnotation {
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty() && self.validate.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_defaults() {
        let rule: AuthorizationRule =
            serde_yaml::from_str("where: { node: { id: \"$jwt.sub\" } }").unwrap();
        assert_eq!(rule.operations.len(), 7);
        assert_eq!(rule.when, both_timings());
        assert!(rule.require_authentication);
        assert!(!rule.where_clause.is_claim_only());
    }

    #[test]
    fn test_claim_only_detection() {
        let rule: AuthorizationRule = serde_yaml::from_str(
            "operations: [CREATE]\nwhen: [AFTER]\nwhere: { jwt: { roles_INCLUDES: admin } }",
        )
        .unwrap();
        assert!(rule.where_clause.is_claim_only());
        assert!(rule.applies_to(&[AuthorizationOperation::Create]));
        assert!(!rule.applies_to(&[AuthorizationOperation::Read]));
        assert!(rule.applies_at(AuthorizationTiming::After));
        assert!(!rule.applies_at(AuthorizationTiming::Before));
    }
}
