//! Expression nodes.
//!
//! Predicates are expressions too: boolean combinators, comparisons and
//! subquery tests are all [`Expr::OperatorApplication`] or one of the
//! dedicated subquery variants.

use serde_json::Value;

use super::errors::CypherBuilderError;
use super::escape::{escape_identifier, escape_labels, escape_string};
use super::procedures::ValidatePredicate;
use super::render::{indent, render_joined, RenderContext, ToCypher};
use super::statement::Statement;

/// A named Cypher variable (`this`, `this0`, `var3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Variable(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn expr(&self) -> Expr {
        Expr::Variable(self.clone())
    }

    pub fn property(&self, key: impl Into<String>) -> Expr {
        Expr::Property(Box::new(self.expr()), key.into())
    }
}

/// A bound parameter. The name is final once allocated by the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: Value,
}

impl Param {
    pub fn expr(&self) -> Expr {
        Expr::Param(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    In,
    Contains,
    StartsWith,
    EndsWith,
    RegexMatch,
    IsNull,
    IsNotNull,
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl Operator {
    fn symbol(&self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::LessThan => "<",
            Operator::LessThanEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanEqual => ">=",
            Operator::In => "IN",
            Operator::Contains => "CONTAINS",
            Operator::StartsWith => "STARTS WITH",
            Operator::EndsWith => "ENDS WITH",
            Operator::RegexMatch => "=~",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Addition => "+",
            Operator::Subtraction => "-",
            Operator::Multiplication => "*",
            Operator::Division => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorApplication {
    pub operator: Operator,
    pub operands: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    All,
    Any,
    None,
    Single,
}

impl Quantifier {
    fn function_name(&self) -> &'static str {
        match self {
            Quantifier::All => "all",
            Quantifier::Any => "any",
            Quantifier::None => "none",
            Quantifier::Single => "single",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub distinct: bool,
    pub args: Vec<Expr>,
}

/// `[x IN list WHERE filter | map]`
#[derive(Debug, Clone, PartialEq)]
pub struct ListComprehension {
    pub variable: Variable,
    pub list: Expr,
    pub filter: Option<Expr>,
    pub map: Option<Expr>,
}

/// `any(x IN list WHERE predicate)` and friends
#[derive(Debug, Clone, PartialEq)]
pub struct ListPredicate {
    pub quantifier: Quantifier,
    pub variable: Variable,
    pub list: Expr,
    pub predicate: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub branches: Vec<(Expr, Expr)>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapProjectionItem {
    /// `.key`
    Property(String),
    /// `key: expr`
    Entry(String, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Variable(Variable),

    Param(Param),

    Literal(Literal),

    /// Pre-escaped Cypher passed through verbatim
    Raw(String),

    Star,

    /// `expr.key`
    Property(Box<Expr>, String),

    List(Vec<Expr>),

    /// Map literal: `{ key: value }`
    Map(Vec<(String, Expr)>),

    /// `this { .title, actors: var2 }`
    MapProjection {
        variable: Variable,
        items: Vec<MapProjectionItem>,
    },

    FunctionCall(FunctionCall),

    /// `count(*)`
    CountStar,

    OperatorApplication(OperatorApplication),

    ListComprehension(Box<ListComprehension>),

    ListPredicate(Box<ListPredicate>),

    /// `EXISTS { ... }`
    Exists(Box<Statement>),

    /// `COUNT { ... }`
    CountSubquery(Box<Statement>),

    /// `this:Movie:Film`
    HasLabels {
        variable: Variable,
        labels: Vec<String>,
    },

    Case(Box<CaseExpr>),

    /// `list[from..to]`, either bound may be open
    ListSlice {
        list: Box<Expr>,
        from: Option<Box<Expr>>,
        to: Option<Box<Expr>>,
    },

    ValidatePredicate(Box<ValidatePredicate>),
}

impl Expr {
    pub fn string(s: impl Into<String>) -> Expr {
        Expr::Literal(Literal::String(s.into()))
    }

    pub fn boolean(b: bool) -> Expr {
        Expr::Literal(Literal::Boolean(b))
    }

    pub fn integer(i: i64) -> Expr {
        Expr::Literal(Literal::Integer(i))
    }

    pub fn null() -> Expr {
        Expr::Literal(Literal::Null)
    }

    pub fn property(self, key: impl Into<String>) -> Expr {
        Expr::Property(Box::new(self), key.into())
    }

    pub fn binary(operator: Operator, lhs: Expr, rhs: Expr) -> Expr {
        Expr::OperatorApplication(OperatorApplication {
            operator,
            operands: vec![lhs, rhs],
        })
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(Operator::Equal, lhs, rhs)
    }

    pub fn not(expr: Expr) -> Expr {
        Expr::OperatorApplication(OperatorApplication {
            operator: Operator::Not,
            operands: vec![expr],
        })
    }

    pub fn is_null(expr: Expr) -> Expr {
        Expr::OperatorApplication(OperatorApplication {
            operator: Operator::IsNull,
            operands: vec![expr],
        })
    }

    pub fn is_not_null(expr: Expr) -> Expr {
        Expr::OperatorApplication(OperatorApplication {
            operator: Operator::IsNotNull,
            operands: vec![expr],
        })
    }

    /// AND together the given predicates, flattening nested ANDs.
    /// Returns `None` for an empty input.
    pub fn and_all(exprs: Vec<Expr>) -> Option<Expr> {
        Expr::combine(Operator::And, exprs)
    }

    /// OR together the given predicates, flattening nested ORs.
    pub fn or_all(exprs: Vec<Expr>) -> Option<Expr> {
        Expr::combine(Operator::Or, exprs)
    }

    fn combine(operator: Operator, exprs: Vec<Expr>) -> Option<Expr> {
        let mut operands = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match expr {
                Expr::OperatorApplication(app) if app.operator == operator => {
                    operands.extend(app.operands)
                }
                other => operands.push(other),
            }
        }
        match operands.len() {
            0 => None,
            1 => operands.pop(),
            _ => Some(Expr::OperatorApplication(OperatorApplication {
                operator,
                operands,
            })),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::FunctionCall(FunctionCall {
            name: name.into(),
            distinct: false,
            args,
        })
    }

    pub fn distinct_function(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::FunctionCall(FunctionCall {
            name: name.into(),
            distinct: true,
            args,
        })
    }

    pub fn has_labels(variable: &Variable, labels: &[String]) -> Expr {
        Expr::HasLabels {
            variable: variable.clone(),
            labels: labels.to_vec(),
        }
    }
}

impl ToCypher for Literal {
    fn to_cypher(&self, _ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        Ok(match self {
            Literal::Null => "NULL".to_string(),
            Literal::Boolean(b) => b.to_string(),
            Literal::Integer(i) => i.to_string(),
            Literal::Float(f) => format!("{:?}", f),
            Literal::String(s) => escape_string(s),
        })
    }
}

fn render_operand(expr: &Expr, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
    let rendered = expr.to_cypher(ctx)?;
    // Nested comparisons/arithmetic inside a binary operator get parentheses
    match expr {
        Expr::OperatorApplication(app)
            if !matches!(app.operator, Operator::And | Operator::Or | Operator::Not) =>
        {
            Ok(format!("({})", rendered))
        }
        _ => Ok(rendered),
    }
}

impl ToCypher for OperatorApplication {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        match self.operator {
            Operator::And | Operator::Or => {
                let parts = self
                    .operands
                    .iter()
                    .map(|o| o.to_cypher(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                if parts.len() == 1 {
                    return Ok(parts.into_iter().collect());
                }
                Ok(format!(
                    "({})",
                    parts.join(&format!(" {} ", self.operator.symbol()))
                ))
            }
            Operator::Not => {
                let inner = self.operands.first().ok_or(CypherBuilderError::EmptyClause("NOT"))?;
                let rendered = inner.to_cypher(ctx)?;
                match inner {
                    // AND/OR with several operands already renders its own parentheses
                    Expr::OperatorApplication(app)
                        if matches!(app.operator, Operator::And | Operator::Or)
                            && app.operands.len() > 1 =>
                    {
                        Ok(format!("NOT {}", rendered))
                    }
                    _ => Ok(format!("NOT ({})", rendered)),
                }
            }
            Operator::IsNull | Operator::IsNotNull => {
                let inner = self
                    .operands
                    .first()
                    .ok_or(CypherBuilderError::EmptyClause(self.operator.symbol()))?;
                Ok(format!(
                    "{} {}",
                    render_operand(inner, ctx)?,
                    self.operator.symbol()
                ))
            }
            Operator::Addition
            | Operator::Subtraction
            | Operator::Multiplication
            | Operator::Division => {
                let parts = self
                    .operands
                    .iter()
                    .map(|o| render_operand(o, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parts.join(&format!(" {} ", self.operator.symbol())))
            }
            _ => {
                if self.operands.len() != 2 {
                    return Err(CypherBuilderError::EmptyClause(self.operator.symbol()));
                }
                Ok(format!(
                    "{} {} {}",
                    render_operand(&self.operands[0], ctx)?,
                    self.operator.symbol(),
                    render_operand(&self.operands[1], ctx)?
                ))
            }
        }
    }
}

impl ToCypher for Expr {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        match self {
            Expr::Variable(v) => Ok(v.name().to_string()),
            Expr::Param(p) => {
                ctx.bind(p)?;
                Ok(format!("${}", p.name))
            }
            Expr::Literal(lit) => lit.to_cypher(ctx),
            Expr::Raw(raw) => Ok(raw.clone()),
            Expr::Star => Ok("*".to_string()),
            Expr::Property(target, key) => Ok(format!(
                "{}.{}",
                target.to_cypher(ctx)?,
                escape_identifier(key)
            )),
            Expr::List(items) => Ok(format!("[{}]", render_joined(items, ", ", ctx)?)),
            Expr::Map(entries) => {
                let parts = entries
                    .iter()
                    .map(|(k, v)| Ok(format!("{}: {}", escape_identifier(k), v.to_cypher(ctx)?)))
                    .collect::<Result<Vec<_>, CypherBuilderError>>()?;
                if parts.is_empty() {
                    Ok("{}".to_string())
                } else {
                    Ok(format!("{{ {} }}", parts.join(", ")))
                }
            }
            Expr::MapProjection { variable, items } => {
                let parts = items
                    .iter()
                    .map(|item| match item {
                        MapProjectionItem::Property(key) => Ok(format!(".{}", escape_identifier(key))),
                        MapProjectionItem::Entry(key, value) => Ok(format!(
                            "{}: {}",
                            escape_identifier(key),
                            value.to_cypher(ctx)?
                        )),
                    })
                    .collect::<Result<Vec<_>, CypherBuilderError>>()?;
                if parts.is_empty() {
                    Ok(format!("{} {{ }}", variable.name()))
                } else {
                    Ok(format!("{} {{ {} }}", variable.name(), parts.join(", ")))
                }
            }
            Expr::FunctionCall(call) => Ok(format!(
                "{}({}{})",
                call.name,
                if call.distinct { "DISTINCT " } else { "" },
                render_joined(&call.args, ", ", ctx)?
            )),
            Expr::CountStar => Ok("count(*)".to_string()),
            Expr::OperatorApplication(app) => app.to_cypher(ctx),
            Expr::ListComprehension(lc) => {
                let mut out = format!("[{} IN {}", lc.variable.name(), lc.list.to_cypher(ctx)?);
                if let Some(filter) = &lc.filter {
                    out.push_str(&format!(" WHERE {}", filter.to_cypher(ctx)?));
                }
                if let Some(map) = &lc.map {
                    out.push_str(&format!(" | {}", map.to_cypher(ctx)?));
                }
                out.push(']');
                Ok(out)
            }
            Expr::ListPredicate(lp) => Ok(format!(
                "{}({} IN {} WHERE {})",
                lp.quantifier.function_name(),
                lp.variable.name(),
                lp.list.to_cypher(ctx)?,
                lp.predicate.to_cypher(ctx)?
            )),
            Expr::Exists(body) => Ok(format!("EXISTS {{\n{}\n}}", indent(&body.to_cypher(ctx)?))),
            Expr::CountSubquery(body) => {
                Ok(format!("COUNT {{\n{}\n}}", indent(&body.to_cypher(ctx)?)))
            }
            Expr::ListSlice { list, from, to } => {
                let from = match from {
                    Some(e) => e.to_cypher(ctx)?,
                    None => String::new(),
                };
                let to = match to {
                    Some(e) => e.to_cypher(ctx)?,
                    None => String::new(),
                };
                Ok(format!("{}[{}..{}]", list.to_cypher(ctx)?, from, to))
            }
            Expr::HasLabels { variable, labels } => {
                Ok(format!("{}{}", variable.name(), escape_labels(labels)))
            }
            Expr::Case(case) => {
                let mut out = String::from("CASE");
                for (when, then) in &case.branches {
                    out.push_str(&format!(
                        " WHEN {} THEN {}",
                        when.to_cypher(ctx)?,
                        then.to_cypher(ctx)?
                    ));
                }
                if let Some(default) = &case.default {
                    out.push_str(&format!(" ELSE {}", default.to_cypher(ctx)?));
                }
                out.push_str(" END");
                Ok(out)
            }
            Expr::ValidatePredicate(vp) => vp.to_cypher(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(expr: &Expr) -> String {
        expr.to_cypher(&mut RenderContext::new()).unwrap()
    }

    fn param(name: &str, value: Value) -> Expr {
        Param {
            name: name.to_string(),
            value,
        }
        .expr()
    }

    #[test]
    fn test_property_and_comparison() {
        let this = Variable::new("this");
        let expr = Expr::eq(this.property("title"), param("param0", json!("Matrix")));
        assert_eq!(render(&expr), "this.title = $param0");
    }

    #[test]
    fn test_and_all_flattens_and_drops_empty() {
        assert!(Expr::and_all(vec![]).is_none());
        let a = Expr::Raw("a".into());
        let b = Expr::Raw("b".into());
        let c = Expr::Raw("c".into());
        let nested = Expr::and_all(vec![a.clone(), b.clone()]).unwrap();
        let flat = Expr::and_all(vec![nested, c]).unwrap();
        assert_eq!(render(&flat), "(a AND b AND c)");
        assert_eq!(render(&Expr::and_all(vec![a]).unwrap()), "a");
    }

    #[test]
    fn test_not_wraps_whole_subtree() {
        let pred = Expr::or_all(vec![Expr::Raw("a".into()), Expr::Raw("b".into())]).unwrap();
        assert_eq!(render(&Expr::not(pred)), "NOT (a OR b)");
    }

    #[test]
    fn test_nested_comparison_is_parenthesized() {
        let expr = Expr::eq(
            Expr::binary(Operator::GreaterThan, Expr::Raw("x".into()), Expr::integer(1)),
            Expr::boolean(true),
        );
        assert_eq!(render(&expr), "(x > 1) = true");
    }

    #[test]
    fn test_point_list_comprehension() {
        let var = Variable::new("var0");
        let expr = Expr::ListComprehension(Box::new(ListComprehension {
            variable: var.clone(),
            list: param("p", json!([{ "x": 1, "y": 2 }])),
            filter: None,
            map: Some(Expr::function("point", vec![var.expr()])),
        }));
        assert_eq!(render(&expr), "[var0 IN $p | point(var0)]");
    }

    #[test]
    fn test_map_projection() {
        let this = Variable::new("this");
        let expr = Expr::MapProjection {
            variable: this,
            items: vec![
                MapProjectionItem::Property("title".into()),
                MapProjectionItem::Entry("actors".into(), Expr::Raw("var2".into())),
            ],
        };
        assert_eq!(render(&expr), "this { .title, actors: var2 }");
    }

    #[test]
    fn test_list_predicate_and_labels() {
        let v = Variable::new("var1");
        let expr = Expr::ListPredicate(Box::new(ListPredicate {
            quantifier: Quantifier::Any,
            variable: v.clone(),
            list: Expr::Raw("list".into()),
            predicate: Expr::binary(Operator::GreaterThan, v.expr(), Expr::integer(9)),
        }));
        assert_eq!(render(&expr), "any(var1 IN list WHERE var1 > 9)");
        let labels = Expr::has_labels(&Variable::new("this"), &["Film".to_string()]);
        assert_eq!(render(&labels), "this:Film");
    }

    #[test]
    fn test_params_are_collected() {
        let mut ctx = RenderContext::new();
        let expr = Expr::and_all(vec![
            Expr::eq(Expr::Raw("a".into()), param("p0", json!(1))),
            Expr::eq(Expr::Raw("b".into()), param("p1", json!(2))),
        ])
        .unwrap();
        expr.to_cypher(&mut ctx).unwrap();
        assert_eq!(ctx.params().get("p0"), Some(&json!(1)));
        assert_eq!(ctx.params().get("p1"), Some(&json!(2)));
    }

    #[test]
    fn test_float_literal_keeps_decimal_point() {
        assert_eq!(render(&Expr::Literal(Literal::Float(1.0))), "1.0");
    }
}
