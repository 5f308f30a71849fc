//! Tree-walking evaluator over resource configs

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::ExpressionError;
use super::parser::{Ast, BinaryOp, UnaryOp};
use crate::models::ResourceConfig;

/// Runtime value of an expression.
///
/// `Absent` is a field that does not exist in the config, `Null` is a field
/// explicitly set to null. They compare equal to each other.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Absent,
    Null,
    Bool(bool),
    Number(Decimal),
    String(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Absent | Value::Null)
    }

    /// Convert a JSON config value. Arrays and objects are not addressable
    /// as values and read as absent.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => json_number(n),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Absent,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "absent"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n.normalize()),
            Value::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

fn json_number(n: &serde_json::Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Number(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Value::Number(Decimal::from(u));
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Value::Number)
        .unwrap_or(Value::String(text))
}

/// Resolve a dotted path against a config map
pub fn lookup(config: &ResourceConfig, path: &[String]) -> Value {
    let Some((first, rest)) = path.split_first() else {
        return Value::Absent;
    };
    let Some(mut current) = config.get(first) else {
        return Value::Absent;
    };
    for segment in rest {
        match current.get(segment.as_str()) {
            Some(next) if current.is_object() => current = next,
            _ => return Value::Absent,
        }
    }
    Value::from_json(current)
}

pub fn evaluate(ast: &Ast, config: &ResourceConfig) -> Result<Value, ExpressionError> {
    match ast {
        Ast::Literal(value) => Ok(value.clone()),
        Ast::Field(path) => Ok(lookup(config, path)),
        Ast::Unary(op, operand) => {
            let value = evaluate(operand, config)?;
            unary(*op, value)
        }
        Ast::Binary(BinaryOp::And, lhs, rhs) => {
            if !truthy(&evaluate(lhs, config)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&evaluate(rhs, config)?)?))
        }
        Ast::Binary(BinaryOp::Or, lhs, rhs) => {
            if truthy(&evaluate(lhs, config)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&evaluate(rhs, config)?)?))
        }
        Ast::Binary(op, lhs, rhs) => {
            let left = evaluate(lhs, config)?;
            let right = evaluate(rhs, config)?;
            binary(*op, left, right)
        }
    }
}

/// Boolean reading of a value in a logical position; null and absent are false
pub fn truthy(value: &Value) -> Result<bool, ExpressionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Absent | Value::Null => Ok(false),
        other => Err(ExpressionError::NotBoolean(other.type_name())),
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, ExpressionError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!truthy(&value)?)),
        UnaryOp::Neg => match value {
            Value::Number(n) => Ok(Value::Number(-n)),
            Value::Absent | Value::Null => Ok(Value::Absent),
            other => Err(ExpressionError::NotNumeric(other.to_string())),
        },
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(equals(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if left.is_nullish() || right.is_nullish() {
                return Ok(Value::Absent);
            }
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.cmp(b),
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => return Err(mismatch(op, &left, &right)),
            };
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            if left.is_nullish() || right.is_nullish() {
                return Ok(Value::Absent);
            }
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(mismatch(op, &left, &right));
            };
            arithmetic(op, *a, *b).map(Value::Number)
        }
        // Short-circuiting operators are handled in `evaluate`
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(truthy(&left)? && truthy(&right)?)),
    }
}

fn arithmetic(op: BinaryOp, a: Decimal, b: Decimal) -> Result<Decimal, ExpressionError> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b.is_zero() => {
            return Err(ExpressionError::DivisionByZero);
        }
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        _ => None,
    };
    result.ok_or(ExpressionError::Overflow)
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (l, r) if l.is_nullish() && r.is_nullish() => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::TypeMismatch {
        operator: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}
