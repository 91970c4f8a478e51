//! Relay global identifiers.
//!
//! A global id is `base64url_nopad("<Type>:<field>:<id>")`. The type name and
//! field name never contain `:` (model names are plain identifiers), so
//! decoding splits on the first two separators and keeps the rest as the id.
//!
//! ```ignore
//! let token = GlobalId::new("Movie", "dbId", "42").encode();
//! assert_eq!(token, "TW92aWU6ZGJJZDo0Mg");
//! ```

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::graph_catalog::{Entity, Field, GraphModel, ScalarType};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GlobalIdError {
    #[error("Global id is not valid base64: {0}")]
    InvalidEncoding(String),
    #[error("Global id must have the form <type>:<field>:<id>")]
    MissingSeparator,
    #[error("Global id names unknown type `{0}`")]
    UnknownType(String),
    #[error("Global id type `{0}` is not a concrete entity")]
    NotConcrete(String),
    #[error("Type `{type_name}` has no relay id field named `{field}`")]
    FieldMismatch { type_name: String, field: String },
    #[error("Global id value `{value}` cannot be read as {scalar}")]
    Coercion { value: String, scalar: ScalarType },
    #[error("Global id value must be a string or a number")]
    UnsupportedValue,
    #[error("Invalid connection cursor `{0}`")]
    InvalidCursor(String),
}

/// Decoded (type, field, id) triple. The id is kept as the string that was
/// encoded; [`GlobalId::resolve`] turns it back into a typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalId {
    pub type_name: String,
    pub field: String,
    pub id: String,
}

/// A global id matched against the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGlobalId<'a> {
    pub entity: &'a Entity,
    pub field: &'a Field,
    pub value: Value,
}

impl GlobalId {
    pub fn new(type_name: impl Into<String>, field: impl Into<String>, id: impl Into<String>) -> Self {
        GlobalId {
            type_name: type_name.into(),
            field: field.into(),
            id: id.into(),
        }
    }

    /// Build from a stored property value. Numbers are written without quotes.
    pub fn from_value(type_name: &str, field: &str, value: &Value) -> Result<Self, GlobalIdError> {
        let id = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(GlobalIdError::UnsupportedValue),
        };
        Ok(GlobalId::new(type_name, field, id))
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}:{}", self.type_name, self.field, self.id))
    }

    /// Decode a token. Standard base64 (with or without padding) is accepted too.
    pub fn decode(token: &str) -> Result<Self, GlobalIdError> {
        let bytes = [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(token).ok())
            .ok_or_else(|| GlobalIdError::InvalidEncoding(token.to_string()))?;
        let text =
            String::from_utf8(bytes).map_err(|_| GlobalIdError::InvalidEncoding(token.to_string()))?;

        let mut parts = text.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(type_name), Some(field), Some(id)) if !type_name.is_empty() && !field.is_empty() => {
                Ok(GlobalId::new(type_name, field, id))
            }
            _ => Err(GlobalIdError::MissingSeparator),
        }
    }

    /// Find the concrete entity and relay id field this id belongs to and
    /// coerce the id to the field's scalar type.
    pub fn resolve<'a>(&self, model: &'a GraphModel) -> Result<ResolvedGlobalId<'a>, GlobalIdError> {
        let entity = model
            .get(&self.type_name)
            .ok_or_else(|| GlobalIdError::UnknownType(self.type_name.clone()))?;
        if !entity.is_concrete() {
            return Err(GlobalIdError::NotConcrete(self.type_name.clone()));
        }
        let field = entity
            .relay_id_field()
            .filter(|f| f.name == self.field)
            .ok_or_else(|| GlobalIdError::FieldMismatch {
                type_name: self.type_name.clone(),
                field: self.field.clone(),
            })?;
        let value = coerce_id(&self.id, field.scalar())?;
        Ok(ResolvedGlobalId {
            entity,
            field,
            value,
        })
    }
}

fn coerce_id(raw: &str, scalar: ScalarType) -> Result<Value, GlobalIdError> {
    let fail = || GlobalIdError::Coercion {
        value: raw.to_string(),
        scalar,
    };
    match scalar {
        ScalarType::Int | ScalarType::BigInt => {
            raw.parse::<i64>().map(Value::from).map_err(|_| fail())
        }
        ScalarType::Float => {
            let f = raw.parse::<f64>().map_err(|_| fail())?;
            Number::from_f64(f).map(Value::Number).ok_or_else(fail)
        }
        ScalarType::Boolean => raw.parse::<bool>().map(Value::Bool).map_err(|_| fail()),
        _ => Ok(Value::String(raw.to_string())),
    }
}
