//! Node, relationship and path patterns.

use super::errors::CypherBuilderError;
use super::escape::{escape_identifier, escape_labels};
use super::expr::{Expr, Variable};
use super::render::{RenderContext, ToCypher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDirection {
    /// `-[]->`
    Outgoing,
    /// `<-[]-`
    Incoming,
    /// `-[]-`
    Undirected,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    pub variable: Option<Variable>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

impl NodePattern {
    pub fn new(variable: &Variable) -> Self {
        NodePattern {
            variable: Some(variable.clone()),
            ..Default::default()
        }
    }

    pub fn labeled(variable: &Variable, labels: &[String]) -> Self {
        NodePattern {
            variable: Some(variable.clone()),
            labels: labels.to_vec(),
            properties: vec![],
        }
    }

    pub fn anonymous(labels: &[String]) -> Self {
        NodePattern {
            variable: None,
            labels: labels.to_vec(),
            properties: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPattern {
    pub variable: Option<Variable>,
    pub rel_type: Option<String>,
    pub direction: PatternDirection,
    pub properties: Vec<(String, Expr)>,
}

impl RelationshipPattern {
    pub fn new(variable: Option<&Variable>, rel_type: &str, direction: PatternDirection) -> Self {
        RelationshipPattern {
            variable: variable.cloned(),
            rel_type: Some(rel_type.to_string()),
            direction,
            properties: vec![],
        }
    }
}

/// A path: a start node followed by `(relationship, node)` hops.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub start: NodePattern,
    pub hops: Vec<(RelationshipPattern, NodePattern)>,
}

impl Pattern {
    pub fn node(start: NodePattern) -> Self {
        Pattern {
            start,
            hops: vec![],
        }
    }

    pub fn related(mut self, relationship: RelationshipPattern, node: NodePattern) -> Self {
        self.hops.push((relationship, node));
        self
    }
}

fn render_properties(
    properties: &[(String, Expr)],
    ctx: &mut RenderContext,
) -> Result<String, CypherBuilderError> {
    if properties.is_empty() {
        return Ok(String::new());
    }
    let parts = properties
        .iter()
        .map(|(k, v)| Ok(format!("{}: {}", escape_identifier(k), v.to_cypher(ctx)?)))
        .collect::<Result<Vec<_>, CypherBuilderError>>()?;
    Ok(format!(" {{ {} }}", parts.join(", ")))
}

impl ToCypher for NodePattern {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        let name = self.variable.as_ref().map(|v| v.name()).unwrap_or("");
        Ok(format!(
            "({}{}{})",
            name,
            escape_labels(&self.labels),
            render_properties(&self.properties, ctx)?
        ))
    }
}

impl ToCypher for RelationshipPattern {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        let name = self.variable.as_ref().map(|v| v.name()).unwrap_or("");
        let rel_type = self
            .rel_type
            .as_ref()
            .map(|t| format!(":{}", escape_identifier(t)))
            .unwrap_or_default();
        let inner = format!("[{}{}{}]", name, rel_type, render_properties(&self.properties, ctx)?);
        Ok(match self.direction {
            PatternDirection::Outgoing => format!("-{}->", inner),
            PatternDirection::Incoming => format!("<-{}-", inner),
            PatternDirection::Undirected => format!("-{}-", inner),
        })
    }
}

impl ToCypher for Pattern {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError> {
        let mut out = self.start.to_cypher(ctx)?;
        for (rel, node) in &self.hops {
            out.push_str(&rel.to_cypher(ctx)?);
            out.push_str(&node.to_cypher(ctx)?);
        }
        Ok(out)
    }
}
