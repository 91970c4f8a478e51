//! Clause nodes.
//!
//! Inside one clause the rendering order is fixed: MATCH renders its pattern
//! before WHERE, WITH renders items, ORDER BY, SKIP, LIMIT and then WHERE,
//! RETURN renders items, ORDER BY, SKIP, LIMIT.

use super::errors::CypherBuilderError;
use super::escape::escape_identifier;
use super::expr::{Expr, Variable};
use super::pattern::Pattern;
use super::procedures::ValidateProcedure;
use super::render::{indent, render_joined, RenderContext, ToCypher};
use super::statement::Statement;

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl ProjectionItem {
    pub fn new(expr: Expr) -> Self {
        ProjectionItem { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        ProjectionItem {
            expr,
            alias: Some(alias.into()),
        }
    }

    pub fn star() -> Self {
        ProjectionItem::new(Expr::Star)
    }

    pub fn variable(variable: &Variable) -> Self {
        ProjectionItem::new(variable.expr())
    }
}

impl ToCypher for ProjectionItem {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        let rendered = self.expr.to_cypher(ctx)?;
        match &self.alias {
            Some(alias) if alias != &rendered => {
                Ok(format!("{} AS {}", rendered, escape_identifier(alias)))
            }
            _ => Ok(rendered),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub direction: SortDirection,
}

impl ToCypher for OrderByItem {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        let dir = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        Ok(format!("{} {}", self.expr.to_cypher(ctx)?, dir))
    }
}

/// ORDER BY / SKIP / LIMIT shared by WITH and RETURN.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pagination {
    pub order_by: Vec<OrderByItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
}

impl Pagination {
    pub fn is_empty(&self) -> bool {
        self.order_by.is_empty() && self.skip.is_none() && self.limit.is_none()
    }
}

impl ToCypher for Pagination {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        let mut out = String::new();
        if !self.order_by.is_empty() {
            out.push_str(&format!("\nORDER BY {}", render_joined(&self.order_by, ", ", ctx)?));
        }
        if let Some(skip) = &self.skip {
            out.push_str(&format!("\nSKIP {}", skip.to_cypher(ctx)?));
        }
        if let Some(limit) = &self.limit {
            out.push_str(&format!("\nLIMIT {}", limit.to_cypher(ctx)?));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<Pattern>,
    pub where_clause: Option<Expr>,
}

impl MatchClause {
    pub fn new(pattern: Pattern) -> Self {
        MatchClause {
            optional: false,
            patterns: vec![pattern],
            where_clause: None,
        }
    }

    pub fn with_where(mut self, predicate: Option<Expr>) -> Self {
        self.where_clause = predicate;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WithClause {
    pub items: Vec<ProjectionItem>,
    pub distinct: bool,
    pub pagination: Pagination,
    pub where_clause: Option<Expr>,
}

impl WithClause {
    pub fn new(items: Vec<ProjectionItem>) -> Self {
        WithClause {
            items,
            ..Default::default()
        }
    }

    pub fn star() -> Self {
        WithClause::new(vec![ProjectionItem::star()])
    }

    pub fn with_where(mut self, predicate: Option<Expr>) -> Self {
        self.where_clause = predicate;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnClause {
    pub items: Vec<ProjectionItem>,
    pub distinct: bool,
    pub pagination: Pagination,
}

impl ReturnClause {
    pub fn new(items: Vec<ProjectionItem>) -> Self {
        ReturnClause {
            items,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetItem {
    pub target: Expr,
    pub value: Expr,
}

/// What a `CALL { }` subquery imports from the outer scope.
#[derive(Debug, Clone, PartialEq)]
pub enum CallImports {
    None,
    All,
    Variables(Vec<Variable>),
}

/// `CALL { ... }` with one or more branches joined by UNION. The import
/// WITH is repeated at the top of every branch.
#[derive(Debug, Clone, PartialEq)]
pub struct CallClause {
    pub imports: CallImports,
    pub branches: Vec<Statement>,
}

impl CallClause {
    pub fn new(imports: CallImports, body: Statement) -> Self {
        CallClause {
            imports,
            branches: vec![body],
        }
    }

    pub fn union(imports: CallImports, branches: Vec<Statement>) -> Self {
        CallClause { imports, branches }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match(MatchClause),
    Create(Vec<Pattern>),
    Merge(Pattern),
    Set(Vec<SetItem>),
    Delete { detach: bool, targets: Vec<Expr> },
    With(WithClause),
    Unwind { list: Expr, alias: Variable },
    Call(CallClause),
    CallProcedure(ValidateProcedure),
    Return(ReturnClause),
}

impl ToCypher for SetItem {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        Ok(format!(
            "{} = {}",
            self.target.to_cypher(ctx)?,
            self.value.to_cypher(ctx)?
        ))
    }
}

fn render_projection(
    keyword: &str,
    items: &[ProjectionItem],
    distinct: bool,
    ctx: &mut RenderContext,
) -> Result<String, CypherBuilderError> {
    if items.is_empty() {
        return Err(CypherBuilderError::EmptyClause(if keyword == "WITH" {
            "WITH"
        } else {
            "RETURN"
        }));
    }
    Ok(format!(
        "{}{} {}",
        keyword,
        if distinct { " DISTINCT" } else { "" },
        render_joined(items, ", ", ctx)?
    ))
}

impl ToCypher for CallClause {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        if self.branches.is_empty() {
            return Err(CypherBuilderError::EmptyClause("CALL"));
        }
        let import = match &self.imports {
            CallImports::None => None,
            CallImports::All => Some("WITH *".to_string()),
            CallImports::Variables(vars) if vars.is_empty() => None,
            CallImports::Variables(vars) => Some(format!(
                "WITH {}",
                vars.iter().map(|v| v.name()).collect::<Vec<_>>().join(", ")
            )),
        };
        let mut branches = Vec::with_capacity(self.branches.len());
        for branch in &self.branches {
            let body = branch.to_cypher(ctx)?;
            branches.push(match &import {
                Some(import) => format!("{}\n{}", import, body),
                None => body,
            });
        }
        Ok(format!("CALL {{\n{}\n}}", indent(&branches.join("\nUNION\n"))))
    }
}

impl ToCypher for Clause {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        match self {
            Clause::Match(m) => {
                if m.patterns.is_empty() {
                    return Err(CypherBuilderError::EmptyClause("MATCH"));
                }
                let mut out = format!(
                    "{}MATCH {}",
                    if m.optional { "OPTIONAL " } else { "" },
                    render_joined(&m.patterns, ", ", ctx)?
                );
                if let Some(predicate) = &m.where_clause {
                    out.push_str(&format!("\nWHERE {}", predicate.to_cypher(ctx)?));
                }
                Ok(out)
            }
            Clause::Create(patterns) => {
                if patterns.is_empty() {
                    return Err(CypherBuilderError::EmptyClause("CREATE"));
                }
                Ok(format!("CREATE {}", render_joined(patterns, ", ", ctx)?))
            }
            Clause::Merge(pattern) => Ok(format!("MERGE {}", pattern.to_cypher(ctx)?)),
            Clause::Set(items) => {
                if items.is_empty() {
                    return Err(CypherBuilderError::EmptyClause("SET"));
                }
                let rendered = items
                    .iter()
                    .map(|i| i.to_cypher(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("SET\n{}", indent(&rendered.join(",\n"))))
            }
            Clause::Delete { detach, targets } => {
                if targets.is_empty() {
                    return Err(CypherBuilderError::EmptyClause("DELETE"));
                }
                Ok(format!(
                    "{}DELETE {}",
                    if *detach { "DETACH " } else { "" },
                    render_joined(targets, ", ", ctx)?
                ))
            }
            Clause::With(w) => {
                let mut out = render_projection("WITH", &w.items, w.distinct, ctx)?;
                out.push_str(&w.pagination.to_cypher(ctx)?);
                if let Some(predicate) = &w.where_clause {
                    out.push_str(&format!("\nWHERE {}", predicate.to_cypher(ctx)?));
                }
                Ok(out)
            }
            Clause::Unwind { list, alias } => {
                Ok(format!("UNWIND {} AS {}", list.to_cypher(ctx)?, alias.name()))
            }
            Clause::Call(call) => call.to_cypher(ctx),
            Clause::CallProcedure(procedure) => procedure.to_cypher(ctx),
            Clause::Return(r) => {
                let mut out = render_projection("RETURN", &r.items, r.distinct, ctx)?;
                out.push_str(&r.pagination.to_cypher(ctx)?);
                Ok(out)
            }
        }
    }
}
