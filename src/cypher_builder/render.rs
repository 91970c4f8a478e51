use std::collections::BTreeMap;

use serde_json::Value;

use super::errors::CypherBuilderError;
use super::expr::Param;

/// Convert an AST node to Cypher text, collecting bound parameters on the way.
pub trait ToCypher {
    fn to_cypher(&self, ctx: &mut RenderContext) -> Result<String, CypherBuilderError>;
}

/// Parameters collected while rendering one statement.
#[derive(Debug, Default, Clone)]
pub struct RenderContext {
    params: BTreeMap<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter. Binding the same name twice is fine as long as the
    /// value is identical (cloned subtrees render the same param again).
    pub fn bind(&mut self, param: &Param) -> Result<(), CypherBuilderError> {
        match self.params.get(&param.name) {
            Some(existing) if existing != &param.value => {
                Err(CypherBuilderError::ParameterCollision(param.name.clone()))
            }
            Some(_) => Ok(()),
            None => {
                self.params.insert(param.name.clone(), param.value.clone());
                Ok(())
            }
        }
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn into_params(self) -> BTreeMap<String, Value> {
        self.params
    }
}

/// Indent every line of a rendered block by four spaces.
pub(crate) fn indent(block: &str) -> String {
    block
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("    {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a list of nodes and join them with `sep`.
pub(crate) fn render_joined<T: ToCypher>(
    items: &[T],
    sep: &str,
    ctx: &mut RenderContext,
) -> Result<String, CypherBuilderError> {
    let rendered = items
        .iter()
        .map(|item| item.to_cypher(ctx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rendered.join(sep))
}
