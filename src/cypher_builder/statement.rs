use std::collections::BTreeMap;

use serde_json::Value;

use super::clause::Clause;
use super::errors::CypherBuilderError;
use super::render::{RenderContext, ToCypher};

/// An ordered list of clauses, rendered one per line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub clauses: Vec<Clause>,
}

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_clauses(clauses: Vec<Clause>) -> Self {
        Statement { clauses }
    }

    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn extend(&mut self, other: Statement) {
        self.clauses.extend(other.clauses);
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render to final text plus the parameters referenced by it.
    pub fn build(&self) -> Result<CypherQuery, CypherBuilderError> {
        let mut ctx = RenderContext::new();
        let cypher = self.to_cypher(&mut ctx)?;
        Ok(CypherQuery {
            cypher,
            params: ctx.into_params(),
        })
    }
}

impl ToCypher for Statement {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        let parts = self
            .clauses
            .iter()
            .map(|c| c.to_cypher(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join("\n"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CypherQuery {
    pub cypher: String,
    pub params: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_builder::clause::{MatchClause, ProjectionItem, ReturnClause};
    use crate::cypher_builder::environment::CypherEnvironment;
    use crate::cypher_builder::expr::{Expr, Variable};
    use crate::cypher_builder::pattern::{NodePattern, Pattern};
    use serde_json::json;

    #[test]
    fn test_build_collects_only_referenced_params() {
        let mut env = CypherEnvironment::new();
        let this = Variable::new("this");
        let used = env.param("this_title", json!("Matrix")).unwrap();
        let _unused = env.param("this_year", json!(1999)).unwrap();

        let mut stmt = Statement::new();
        stmt.push(Clause::Match(
            MatchClause::new(Pattern::node(NodePattern::labeled(&this, &["Movie".into()])))
                .with_where(Some(Expr::eq(this.property("title"), used.expr()))),
        ));
        stmt.push(Clause::Return(ReturnClause::new(vec![ProjectionItem::variable(&this)])));

        let query = stmt.build().unwrap();
        assert_eq!(
            query.cypher,
            "MATCH (this:Movie)\nWHERE this.title = $this_title\nRETURN this"
        );
        assert_eq!(query.params.len(), 1);
        assert_eq!(query.params["this_title"], json!("Matrix"));
    }

    #[test]
    fn test_exists_subquery_indents_body() {
        let this = Variable::new("this");
        let mut body = Statement::new();
        body.push(Clause::Match(MatchClause::new(Pattern::node(NodePattern::new(&this)))));
        let expr = Expr::Exists(Box::new(body));
        let mut ctx = RenderContext::new();
        assert_eq!(expr.to_cypher(&mut ctx).unwrap(), "EXISTS {\n    MATCH (this)\n}");
    }
}
