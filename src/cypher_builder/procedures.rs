//! `apoc.util` validation calls used for authorization and cardinality checks.

use super::errors::CypherBuilderError;
use super::escape::escape_string;
use super::expr::Expr;
use super::render::{RenderContext, ToCypher};

/// Function form, usable inside WHERE: raises `message` when `predicate` is true.
///
/// `apoc.util.validatePredicate(predicate, "message", [0])`
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatePredicate {
    pub predicate: Expr,
    pub message: String,
    /// `[0]` rather than `[]` as the message-parameters argument
    pub trailing_params: bool,
}

/// Procedure form: `CALL apoc.util.validate(predicate, "message", [0])`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidateProcedure {
    pub predicate: Expr,
    pub message: String,
    pub trailing_params: bool,
}

fn render_arguments(
    predicate: &Expr,
    message: &str,
    trailing_params: bool,
    ctx: &mut RenderContext,
) -> Result<String, CypherBuilderError> {
    let mut args = format!("{}, {}", predicate.to_cypher(ctx)?, escape_string(message));
    args.push_str(if trailing_params { ", [0]" } else { ", []" });
    Ok(args)
}

impl ToCypher for ValidatePredicate {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        Ok(format!(
            "apoc.util.validatePredicate({})",
            render_arguments(&self.predicate, &self.message, self.trailing_params, ctx)?
        ))
    }
}

impl ToCypher for ValidateProcedure {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        Ok(format!(
            "CALL apoc.util.validate({})",
            render_arguments(&self.predicate, &self.message, self.trailing_params, ctx)?
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_predicate_with_trailing_params() {
        let vp = ValidatePredicate {
            predicate: Expr::not(Expr::Raw("x".into())),
            message: "Forbidden".into(),
            trailing_params: true,
        };
        assert_eq!(
            vp.to_cypher(&mut RenderContext::new()).unwrap(),
            "apoc.util.validatePredicate(NOT (x), \"Forbidden\", [0])"
        );
    }

    #[test]
    fn test_validate_procedure_without_trailing_params() {
        let vp = ValidateProcedure {
            predicate: Expr::Raw("x".into()),
            message: "Forbidden".into(),
            trailing_params: false,
        };
        assert_eq!(
            vp.to_cypher(&mut RenderContext::new()).unwrap(),
            "CALL apoc.util.validate(x, \"Forbidden\", [])"
        );
    }
}
