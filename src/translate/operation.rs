//! Operation descriptors handed to the translator, and what it hands back.
//!
//! Descriptors are plain serde types so they can be read from JSON:
//!
//! ```json
//! {
//!   "operation": {
//!     "kind": "read",
//!     "entity": "Movie",
//!     "where": { "title_STARTS_WITH": "The" },
//!     "options": { "sort": [{ "title": "ASC" }], "limit": 10 },
//!     "selection": ["title", { "field": "actors", "selection": ["name"] }]
//!   },
//!   "claims": { "sub": "user-1", "roles": ["admin"] }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::shape::ResultShape;

/// Verified claim set of the caller
pub type JwtClaims = Map<String, Value>;

/// Raw `where` input, parsed against an entity when compiled
pub type WhereInput = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum OperationOrigin {
    #[default]
    TopLevel,
    /// Compiled on behalf of a nested field of another operation
    Nested { field: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub operation: Operation,
    #[serde(default)]
    pub claims: Option<JwtClaims>,
    #[serde(default)]
    pub origin: OperationOrigin,
}

impl OperationDescriptor {
    pub fn new(operation: Operation) -> Self {
        OperationDescriptor {
            operation,
            claims: None,
            origin: OperationOrigin::TopLevel,
        }
    }

    pub fn with_claims(mut self, claims: JwtClaims) -> Self {
        self.claims = Some(claims);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Read(ReadOperation),
    Connection(ConnectionOperation),
    Aggregate(AggregateOperation),
    Node(NodeOperation),
    Create(CreateOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Read(_) => "read",
            Operation::Connection(_) => "connection",
            Operation::Aggregate(_) => "aggregate",
            Operation::Node(_) => "node",
            Operation::Create(_) => "create",
            Operation::Update(_) => "update",
            Operation::Delete(_) => "delete",
        }
    }
}

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    /// Field name, `id` (global id) or `__typename`
    Scalar(String),
    /// Inline fragment for one implementation of a polymorphic type
    Fragment(FragmentSelection),
    Field(FieldSelection),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSelection {
    pub on: String,
    pub selection: Vec<Selection>,
}

/// A field with arguments, an alias or a sub-selection. The shape of
/// `selection` depends on the field: a list of [`Selection`] for
/// relationships, a [`ConnectionSelection`] for `<rel>Connection` fields and
/// an [`AggregateSelection`] for `<rel>Aggregate` fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldSelection {
    pub field: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(rename = "where", default)]
    pub where_input: Option<WhereInput>,
    #[serde(default)]
    pub options: ReadOptions,
    #[serde(default)]
    pub first: Option<u64>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub sort: Vec<Map<String, Value>>,
    #[serde(default)]
    pub selection: Value,
}

impl FieldSelection {
    pub fn output_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    /// `[{ "title": "ASC" }, { "actorsAggregate": { "count": "DESC" } }]`
    #[serde(default)]
    pub sort: Vec<Map<String, Value>>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ConnectionSelection {
    #[serde(default)]
    pub total_count: bool,
    /// Any of `hasNextPage`, `hasPreviousPage`, `startCursor`, `endCursor`
    #[serde(default)]
    pub page_info: Vec<String>,
    #[serde(default)]
    pub edges: Option<EdgeSelection>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeSelection {
    #[serde(default)]
    pub cursor: bool,
    #[serde(default)]
    pub node: Option<Vec<Selection>>,
    #[serde(default)]
    pub properties: Option<Vec<Selection>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Min,
    Max,
    Average,
    Sum,
    Shortest,
    Longest,
}

impl AggregateFunction {
    pub fn key(&self) -> &'static str {
        match self {
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Average => "average",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Shortest => "shortest",
            AggregateFunction::Longest => "longest",
        }
    }
}

/// `{ "count": true, "node": { "name": ["shortest"] }, "edge": { "screenTime": ["max"] } }`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateSelection {
    #[serde(default)]
    pub count: bool,
    #[serde(default)]
    pub node: BTreeMap<String, Vec<AggregateFunction>>,
    #[serde(default)]
    pub edge: BTreeMap<String, Vec<AggregateFunction>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOperation {
    pub entity: String,
    #[serde(rename = "where", default)]
    pub where_input: Option<WhereInput>,
    #[serde(default)]
    pub options: ReadOptions,
    pub selection: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOperation {
    pub entity: String,
    #[serde(rename = "where", default)]
    pub where_input: Option<WhereInput>,
    /// `[{ "node": { "title": "ASC" } }]`
    #[serde(default)]
    pub sort: Vec<Map<String, Value>>,
    #[serde(default)]
    pub first: Option<u64>,
    #[serde(default)]
    pub after: Option<String>,
    pub selection: ConnectionSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateOperation {
    pub entity: String,
    #[serde(rename = "where", default)]
    pub where_input: Option<WhereInput>,
    pub selection: AggregateSelection,
}

/// Global lookup by relay id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOperation {
    pub id: String,
    pub selection: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOperation {
    pub entity: String,
    pub input: Vec<Map<String, Value>>,
    #[serde(default)]
    pub selection: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOperation {
    pub entity: String,
    #[serde(rename = "where", default)]
    pub where_input: Option<WhereInput>,
    /// Field values, update operators and nested relationship operations
    #[serde(default)]
    pub update: Map<String, Value>,
    #[serde(default)]
    pub selection: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOperation {
    pub entity: String,
    #[serde(rename = "where", default)]
    pub where_input: Option<WhereInput>,
    /// Nested deletes keyed by relationship field
    #[serde(default)]
    pub delete: Map<String, Value>,
}

/// Query text, its parameters, and how to reshape the returned rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub cypher: String,
    pub params: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<ResultShape>,
}
