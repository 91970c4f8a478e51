//! Cypher AST nodes, parameter allocation and rendering.
//!
//! Everything the translators emit is built from these nodes and rendered
//! through [`ToCypher`]; no translator concatenates query text directly.

pub mod clause;
pub mod environment;
pub mod errors;
pub mod escape;
pub mod expr;
pub mod pattern;
pub mod procedures;
pub mod render;
pub mod statement;

pub use clause::{
    CallClause, CallImports, Clause, MatchClause, OrderByItem, Pagination, ProjectionItem,
    ReturnClause, SetItem, SortDirection, WithClause,
};
pub use environment::CypherEnvironment;
pub use errors::CypherBuilderError;
pub use expr::{
    CaseExpr, Expr, ListComprehension, ListPredicate, Literal, MapProjectionItem, Operator,
    OperatorApplication, Param, Quantifier, Variable,
};
pub use pattern::{NodePattern, Pattern, PatternDirection, RelationshipPattern};
pub use procedures::{ValidatePredicate, ValidateProcedure};
pub use render::{RenderContext, ToCypher};
pub use statement::{CypherQuery, Statement};
