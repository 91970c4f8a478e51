use serde_json::Value;

use super::errors::TranslateError;
use super::operation::{JwtClaims, OperationOrigin};
use crate::config::CompilerConfig;
use crate::cypher_builder::{
    Clause, CypherEnvironment, Expr, Literal, Param, ValidatePredicate, ValidateProcedure,
    Variable,
};
use crate::graph_catalog::GraphModel;

/// State of one compilation: the model it reads, the naming environment it
/// allocates from and the caller's claims. Never shared between operations.
pub struct TranslateContext<'m> {
    pub model: &'m GraphModel,
    pub config: &'m CompilerConfig,
    pub env: CypherEnvironment,
    pub origin: OperationOrigin,
    claims: Option<JwtClaims>,
    jwt: Param,
}

impl<'m> TranslateContext<'m> {
    pub fn new(
        model: &'m GraphModel,
        config: &'m CompilerConfig,
        claims: Option<JwtClaims>,
        origin: OperationOrigin,
    ) -> Result<Self, TranslateError> {
        let mut env = CypherEnvironment::new();
        let jwt = env.param(
            "jwt",
            claims.clone().map(Value::Object).unwrap_or(Value::Null),
        )?;
        // claim conditions are decided while compiling, the name stays reserved
        env.reserve_param_name("isAuthenticated")?;
        Ok(TranslateContext {
            model,
            config,
            env,
            origin,
            claims,
            jwt,
        })
    }

    pub fn claims(&self) -> Option<&JwtClaims> {
        self.claims.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }

    /// `$jwt`
    pub fn jwt(&self) -> Expr {
        self.jwt.expr()
    }

    pub fn param(&mut self, base: &str, value: Value) -> Result<Expr, TranslateError> {
        Ok(self.env.param(base, value)?.expr())
    }

    pub fn variable(&mut self, prefix: &str) -> Variable {
        self.env.variable(prefix)
    }

    pub fn check_depth(&self, depth: u32) -> Result<(), TranslateError> {
        if depth > self.config.max_depth {
            return Err(TranslateError::DepthLimitExceeded(self.config.max_depth));
        }
        Ok(())
    }

    pub fn forbidden(&self) -> TranslateError {
        TranslateError::ForbiddenByAuthorization(self.config.forbidden_message.clone())
    }

    /// `apoc.util.validatePredicate(NOT (allowed), "Forbidden", [0])`
    pub fn validate_predicate(&self, allowed: Expr) -> Expr {
        self.predicate_unless(allowed, self.config.forbidden_message.clone())
    }

    /// `apoc.util.validatePredicate(NOT (condition), message, [0])`
    pub fn predicate_unless(&self, condition: Expr, message: String) -> Expr {
        Expr::ValidatePredicate(Box::new(ValidatePredicate {
            predicate: negated(condition),
            message,
            trailing_params: self.config.validate_trailing_params,
        }))
    }

    /// `CALL apoc.util.validate(NOT (allowed), "Forbidden", [0])`
    pub fn validate_procedure(&self, allowed: Expr) -> Clause {
        self.raise_unless(allowed, self.config.forbidden_message.clone())
    }

    /// `CALL apoc.util.validate(NOT (condition), message, [0])`
    pub fn raise_unless(&self, condition: Expr, message: String) -> Clause {
        Clause::CallProcedure(ValidateProcedure {
            predicate: negated(condition),
            message,
            trailing_params: self.config.validate_trailing_params,
        })
    }
}

fn negated(condition: Expr) -> Expr {
    match condition {
        Expr::Literal(Literal::Boolean(b)) => Expr::boolean(!b),
        other => Expr::not(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_builder::{RenderContext, ToCypher};
    use crate::graph_catalog::GraphModelConfig;
    use serde_json::json;

    #[test]
    fn test_reserves_claim_params_first() {
        let model = GraphModelConfig::from_yaml_str("entities:\n  - name: Movie\n")
            .unwrap()
            .build()
            .unwrap();
        let config = CompilerConfig::default();
        let claims = json!({ "sub": "u1" }).as_object().cloned();
        let mut ctx =
            TranslateContext::new(&model, &config, claims, OperationOrigin::TopLevel).unwrap();
        assert!(ctx.is_authenticated());
        // a later request for the same base cannot shadow the claims
        assert_eq!(ctx.env.reserve_param_name("jwt").unwrap(), "jwt_1");

        let mut render = RenderContext::new();
        let text = ctx.jwt().property("sub").to_cypher(&mut render).unwrap();
        assert_eq!(text, "$jwt.sub");
        assert_eq!(render.params()["jwt"], json!({ "sub": "u1" }));
    }

    #[test]
    fn test_depth_limit() {
        let model = GraphModelConfig::from_yaml_str("entities:\n  - name: Movie\n")
            .unwrap()
            .build()
            .unwrap();
        let config = CompilerConfig {
            max_depth: 2,
            ..Default::default()
        };
        let ctx = TranslateContext::new(&model, &config, None, OperationOrigin::TopLevel).unwrap();
        assert!(ctx.check_depth(2).is_ok());
        assert_eq!(ctx.check_depth(3), Err(TranslateError::DepthLimitExceeded(2)));
    }
}
