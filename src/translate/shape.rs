//! Output shape of a compiled read.
//!
//! The Cypher side returns maps keyed by output keys plus a few helper keys
//! (`__resolveType`, sort keys). [`ResultShape::reshape`] turns a raw row into
//! the requested result: helper keys are dropped, relay ids are encoded,
//! polymorphic rows keep only their own branch and connection cursors and
//! `pageInfo` are derived from the paging offset.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::utils::{offset_to_cursor, GlobalId, GlobalIdError};

pub const RESOLVE_TYPE_KEY: &str = "__resolveType";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultShape {
    /// Column of the returned row that holds the value
    pub column: String,
    pub root: FieldShape,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldShape {
    /// Copied as is
    Value,
    /// Raw id value to be encoded; `type_name` is `None` when it comes from
    /// the row's `__resolveType`
    GlobalId {
        type_name: Option<String>,
        field: String,
    },
    Object(ObjectShape),
    Connection(ConnectionShape),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeField {
    pub key: String,
    pub shape: FieldShape,
}

impl ShapeField {
    pub fn value(key: impl Into<String>) -> Self {
        ShapeField {
            key: key.into(),
            shape: FieldShape::Value,
        }
    }
}

/// Fields of a node map. When `branches` is non-empty the object is
/// polymorphic and the fields come from the branch named by `__resolveType`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ObjectShape {
    pub fields: Vec<ShapeField>,
    pub branches: BTreeMap<String, Vec<ShapeField>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionShape {
    /// SKIP applied to the edges, base for cursors
    pub offset: usize,
    pub total_count: bool,
    pub page_info: Vec<String>,
    pub edges: Option<EdgesShape>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgesShape {
    pub cursor: bool,
    pub node: Option<ObjectShape>,
    pub properties: Option<ObjectShape>,
}

impl ResultShape {
    /// Reshape one raw row (column name to value).
    pub fn reshape(&self, row: &Map<String, Value>) -> Result<Value, GlobalIdError> {
        match row.get(&self.column) {
            Some(value) => self.root.apply(value, None),
            None => Ok(Value::Null),
        }
    }
}

impl FieldShape {
    fn apply(&self, value: &Value, resolved_type: Option<&str>) -> Result<Value, GlobalIdError> {
        if let Value::Array(items) = value {
            if !matches!(self, FieldShape::Value) {
                return items
                    .iter()
                    .map(|item| self.apply(item, resolved_type))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array);
            }
        }
        match self {
            FieldShape::Value => Ok(value.clone()),
            FieldShape::GlobalId { type_name, field } => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let type_name = type_name.as_deref().or(resolved_type).ok_or_else(|| {
                    GlobalIdError::UnknownType("<unresolved>".to_string())
                })?;
                Ok(Value::String(GlobalId::from_value(type_name, field, value)?.encode()))
            }
            FieldShape::Object(shape) => shape.apply(value),
            FieldShape::Connection(shape) => shape.apply(value),
        }
    }
}

impl ObjectShape {
    fn apply(&self, value: &Value) -> Result<Value, GlobalIdError> {
        let Value::Object(map) = value else {
            return Ok(value.clone());
        };
        let resolved_type = map.get(RESOLVE_TYPE_KEY).and_then(Value::as_str);
        let fields = match resolved_type.and_then(|t| self.branches.get(t)) {
            Some(branch) => branch,
            None => &self.fields,
        };
        let mut out = Map::new();
        for field in fields {
            let raw = map.get(&field.key).unwrap_or(&Value::Null);
            out.insert(field.key.clone(), field.shape.apply(raw, resolved_type)?);
        }
        Ok(Value::Object(out))
    }
}

impl ConnectionShape {
    fn apply(&self, value: &Value) -> Result<Value, GlobalIdError> {
        let empty = Vec::new();
        let edges = value.get("edges").and_then(Value::as_array).unwrap_or(&empty);
        let total = value.get("totalCount").and_then(Value::as_u64).unwrap_or(0) as usize;

        let mut out = Map::new();
        if self.total_count {
            out.insert("totalCount".into(), Value::from(total));
        }
        if let Some(edge_shape) = &self.edges {
            let mut shaped = Vec::with_capacity(edges.len());
            for (i, edge) in edges.iter().enumerate() {
                let mut e = Map::new();
                if edge_shape.cursor {
                    let cursor = offset_to_cursor(self.offset.saturating_add(i));
                    e.insert("cursor".into(), Value::String(cursor));
                }
                if let Some(node) = &edge_shape.node {
                    e.insert(
                        "node".into(),
                        node.apply(edge.get("node").unwrap_or(&Value::Null))?,
                    );
                }
                if let Some(props) = &edge_shape.properties {
                    e.insert(
                        "properties".into(),
                        props.apply(edge.get("properties").unwrap_or(&Value::Null))?,
                    );
                }
                shaped.push(Value::Object(e));
            }
            out.insert("edges".into(), Value::Array(shaped));
        }
        if !self.page_info.is_empty() {
            let count = edges.len();
            let mut info = Map::new();
            for key in &self.page_info {
                let v = match key.as_str() {
                    "hasNextPage" => Value::Bool(self.offset.saturating_add(count) < total),
                    "hasPreviousPage" => Value::Bool(self.offset > 0),
                    "startCursor" if count > 0 => Value::String(offset_to_cursor(self.offset)),
                    "endCursor" if count > 0 => {
                        Value::String(offset_to_cursor(self.offset.saturating_add(count - 1)))
                    }
                    _ => Value::Null,
                };
                info.insert(key.clone(), v);
            }
            out.insert("pageInfo".into(), Value::Object(info));
        }
        Ok(Value::Object(out))
    }
}
