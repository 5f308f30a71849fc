//! Condition and quantity expressions for dependency rules.
//!
//! Expressions are a small, side-effect free language evaluated against a
//! resource's config map: dotted field access, number/string/boolean/null
//! literals, comparison, boolean logic and decimal arithmetic. They are parsed
//! once when a rule snapshot is compiled and evaluated per resource.

mod eval;
mod parser;

pub use eval::{Value, lookup};

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::models::ResourceConfig;
use parser::Ast;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("operator '{operator}' cannot be applied to {left} and {right}")]
    TypeMismatch {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("expected a boolean, got {0}")]
    NotBoolean(&'static str),

    #[error("expected a number, got {0}")]
    NotNumeric(String),

    #[error("quantity must not be negative, got {0}")]
    Negative(Decimal),

    #[error("arithmetic overflow")]
    Overflow,
}

/// A parsed expression. An empty source is valid and has no syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Option<Ast>,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let trimmed = source.trim();
        let ast = if trimmed.is_empty() {
            None
        } else {
            Some(parser::parse(trimmed)?)
        };
        Ok(Self {
            source: trimmed.to_string(),
            ast,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.ast.is_none()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a raw value. Empty expressions yield `Value::Absent`.
    pub fn evaluate(&self, config: &ResourceConfig) -> Result<Value, ExpressionError> {
        match &self.ast {
            Some(ast) => eval::evaluate(ast, config),
            None => Ok(Value::Absent),
        }
    }

    /// Evaluate as a rule condition.
    ///
    /// An empty condition always holds. Null or absent results count as false;
    /// any other non-boolean result is an error.
    pub fn evaluate_condition(&self, config: &ResourceConfig) -> Result<bool, ExpressionError> {
        if self.is_empty() {
            return Ok(true);
        }
        eval::truthy(&self.evaluate(config)?)
    }

    /// Evaluate as a quantity.
    ///
    /// Returns `None` when the expression is empty or yields null/absent so the
    /// caller can fall back to a default. Numeric strings are accepted.
    pub fn evaluate_quantity(
        &self,
        config: &ResourceConfig,
    ) -> Result<Option<Decimal>, ExpressionError> {
        let quantity = match self.evaluate(config)? {
            Value::Absent | Value::Null => return Ok(None),
            Value::Number(n) => n,
            Value::String(s) => Decimal::from_str(s.trim())
                .map_err(|_| ExpressionError::NotNumeric(format!("\"{}\"", s)))?,
            other @ Value::Bool(_) => return Err(ExpressionError::NotNumeric(other.to_string())),
        };
        if quantity.is_sign_negative() && !quantity.is_zero() {
            return Err(ExpressionError::Negative(quantity));
        }
        Ok(Some(quantity))
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
