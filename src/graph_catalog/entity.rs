//! Entity, field and relationship definitions of the graph model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::authorization::AuthorizationAnnotation;
use super::errors::GraphModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    #[serde(rename = "ID")]
    Id,
    String,
    Int,
    BigInt,
    Float,
    Boolean,
    DateTime,
    Date,
    Time,
    LocalDateTime,
    LocalTime,
    Duration,
    Point,
    CartesianPoint,
}

impl ScalarType {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "ID" => ScalarType::Id,
            "String" => ScalarType::String,
            "Int" => ScalarType::Int,
            "BigInt" => ScalarType::BigInt,
            "Float" => ScalarType::Float,
            "Boolean" => ScalarType::Boolean,
            "DateTime" => ScalarType::DateTime,
            "Date" => ScalarType::Date,
            "Time" => ScalarType::Time,
            "LocalDateTime" => ScalarType::LocalDateTime,
            "LocalTime" => ScalarType::LocalTime,
            "Duration" => ScalarType::Duration,
            "Point" => ScalarType::Point,
            "CartesianPoint" => ScalarType::CartesianPoint,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Id => "ID",
            ScalarType::String => "String",
            ScalarType::Int => "Int",
            ScalarType::BigInt => "BigInt",
            ScalarType::Float => "Float",
            ScalarType::Boolean => "Boolean",
            ScalarType::DateTime => "DateTime",
            ScalarType::Date => "Date",
            ScalarType::Time => "Time",
            ScalarType::LocalDateTime => "LocalDateTime",
            ScalarType::LocalTime => "LocalTime",
            ScalarType::Duration => "Duration",
            ScalarType::Point => "Point",
            ScalarType::CartesianPoint => "CartesianPoint",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::BigInt | ScalarType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ScalarType::DateTime
                | ScalarType::Date
                | ScalarType::Time
                | ScalarType::LocalDateTime
                | ScalarType::LocalTime
                | ScalarType::Duration
        )
    }

    /// ID and String: the types that support string operators
    pub fn is_textual(&self) -> bool {
        matches!(self, ScalarType::Id | ScalarType::String)
    }

    pub fn is_point(&self) -> bool {
        matches!(self, ScalarType::Point | ScalarType::CartesianPoint)
    }

    /// Types whose values are ordered (`_LT`, `_GT`, MIN/MAX aggregates)
    pub fn is_ordered(&self) -> bool {
        self.is_numeric() || self.is_temporal() || self.is_textual()
    }

    /// Cypher function producing the current time as this type. Durations
    /// have none.
    pub fn timestamp_function(&self) -> Option<&'static str> {
        match self {
            ScalarType::DateTime => Some("datetime"),
            ScalarType::Date => Some("date"),
            ScalarType::Time => Some("time"),
            ScalarType::LocalDateTime => Some("localdatetime"),
            ScalarType::LocalTime => Some("localtime"),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed from type strings such as `String`, `ID!`, `[Int!]!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    pub scalar: ScalarType,
    pub list: bool,
    pub required: bool,
}

impl FieldType {
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType {
            scalar,
            list: false,
            required: false,
        }
    }
}

impl FromStr for FieldType {
    type Err = GraphModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GraphModelError::InvalidFieldType {
            type_string: s.to_string(),
        };
        let trimmed = s.trim();
        let (body, required) = match trimmed.strip_suffix('!') {
            Some(body) => (body, true),
            None => (trimmed, false),
        };
        let (inner, list) = match body.strip_prefix('[') {
            Some(rest) => (rest.strip_suffix(']').ok_or_else(invalid)?, true),
            None => (body, false),
        };
        let inner = inner.strip_suffix('!').unwrap_or(inner);
        let scalar = ScalarType::parse(inner).ok_or_else(invalid)?;
        Ok(FieldType {
            scalar,
            list,
            required,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
    Create,
    Update,
}

/// How a field gets its value when not supplied directly.
/// Resolved once when the model is built.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldGeneration {
    #[default]
    Plain,
    /// `randomUUID()` on create
    Autogenerate,
    /// `datetime()` (or the matching temporal constructor) on the listed operations
    Timestamp { operations: Vec<MutationKind> },
    /// Value produced by a named callback on the listed operations
    PopulatedBy {
        callback: String,
        operations: Vec<MutationKind>,
    },
}

impl FieldGeneration {
    /// Generated fields cannot be set through mutation input.
    pub fn is_generated(&self) -> bool {
        !matches!(self, FieldGeneration::Plain)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// Stored property name, when different from `name`
    pub alias: Option<String>,
    pub generation: FieldGeneration,
    /// Marks the field whose value backs the relay global id
    pub relay_id: bool,
    pub unique: bool,
    pub default: Option<Value>,
    pub authorization: Option<AuthorizationAnnotation>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Field {
            name: name.into(),
            field_type,
            alias: None,
            generation: FieldGeneration::Plain,
            relay_id: false,
            unique: false,
            default: None,
            authorization: None,
        }
    }

    /// Property name used in the database.
    pub fn db_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn scalar(&self) -> ScalarType {
        self.field_type.scalar
    }

    pub fn is_list(&self) -> bool {
        self.field_type.list
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipDirection {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    #[default]
    Many,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipField {
    pub name: String,
    /// Relationship type label, e.g. `ACTED_IN`
    pub rel_type: String,
    pub direction: RelationshipDirection,
    /// Target entity name (may be an interface or union)
    pub target: String,
    /// Name of the RelationshipProperties entity describing edge properties
    pub properties: Option<String>,
    pub cardinality: Cardinality,
    /// Singular relationships only: exactly one related node must exist
    pub required: bool,
}

impl RelationshipField {
    pub fn is_singular(&self) -> bool {
        self.cardinality == Cardinality::One
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Concrete,
    Interface,
    Union,
    RelationshipProperties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub labels: Vec<String>,
    pub fields: Vec<Field>,
    pub relationships: Vec<RelationshipField>,
    pub authorization: Option<AuthorizationAnnotation>,
    /// Concrete members, for interfaces and unions
    pub implementations: Vec<String>,
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipField> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn relay_id_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.relay_id)
    }

    pub fn is_concrete(&self) -> bool {
        self.kind == EntityKind::Concrete
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self.kind, EntityKind::Interface | EntityKind::Union)
    }

    pub fn has_authorization(&self) -> bool {
        self.authorization
            .as_ref()
            .map(|a| !a.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("String", ScalarType::String, false, false; "plain")]
    #[test_case("ID!", ScalarType::Id, false, true; "required id")]
    #[test_case("[Int]", ScalarType::Int, true, false; "optional list")]
    #[test_case("[Point!]!", ScalarType::Point, true, true; "required list of required")]
    fn test_parse_field_type(input: &str, scalar: ScalarType, list: bool, required: bool) {
        let parsed: FieldType = input.parse().unwrap();
        assert_eq!(
            parsed,
            FieldType {
                scalar,
                list,
                required
            }
        );
    }

    #[test_case("Strin"; "unknown scalar")]
    #[test_case("[String"; "unclosed list")]
    #[test_case(""; "empty")]
    fn test_parse_field_type_rejects(input: &str) {
        assert!(matches!(
            input.parse::<FieldType>(),
            Err(GraphModelError::InvalidFieldType { .. })
        ));
    }

    #[test]
    fn test_db_name_uses_alias() {
        let mut field = Field::new("title", FieldType::scalar(ScalarType::String));
        assert_eq!(field.db_name(), "title");
        field.alias = Some("movie_title".into());
        assert_eq!(field.db_name(), "movie_title");
    }
}
