//! Per-operation naming environment.
//!
//! [`CypherEnvironment`] hands out parameter and variable names while the AST
//! is being built. Rendering never allocates, so a finished tree renders to the
//! same text every time.
//!
//! Parameter names derive from a base (usually `variable_field`). The first
//! request for a base gets the base itself; later requests get `base_1`,
//! `base_2`, ... skipping anything already taken.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::errors::CypherBuilderError;
use super::escape::sanitize_parameter_name;
use super::expr::{Param, Variable};

#[derive(Debug, Default)]
pub struct CypherEnvironment {
    /// Next suffix to try for each base name
    suffixes: HashMap<String, usize>,
    /// Every parameter name handed out so far
    reserved: HashSet<String>,
    /// Shared counter for generated variables (this0, var1, ...)
    variable_counter: usize,
}

impl CypherEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a parameter name derived from `base`.
    pub fn reserve_param_name(&mut self, base: &str) -> Result<String, CypherBuilderError> {
        let base = sanitize_parameter_name(base);
        if self.reserved.insert(base.clone()) {
            self.suffixes.entry(base.clone()).or_insert(1);
            return Ok(base);
        }

        let next = self.suffixes.entry(base.clone()).or_insert(1);
        loop {
            let candidate = format!("{}_{}", base, next);
            *next = next
                .checked_add(1)
                .ok_or_else(|| CypherBuilderError::ParameterNamesExhausted(base.clone()))?;
            if self.reserved.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
    }

    /// Allocate a parameter bound to `value`.
    pub fn param(&mut self, base: &str, value: Value) -> Result<Param, CypherBuilderError> {
        let name = self.reserve_param_name(base)?;
        Ok(Param { name, value })
    }

    /// Allocate a fresh variable, e.g. `this3` or `var4`.
    pub fn variable(&mut self, prefix: &str) -> Variable {
        let name = format!("{}{}", prefix, self.variable_counter);
        self.variable_counter += 1;
        Variable::new(name)
    }

    pub fn param_count(&self) -> usize {
        self.reserved.len()
    }
}
