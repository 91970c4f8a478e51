use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CypherBuilderError {
    /// Two different values were bound under the same parameter name.
    #[error("Parameter `${0}` is bound to two different values")]
    ParameterCollision(String),

    #[error("Parameter names exhausted for base `{0}`")]
    ParameterNamesExhausted(String),

    #[error("Empty {0} clause (must contain at least one item)")]
    EmptyClause(&'static str),
}
