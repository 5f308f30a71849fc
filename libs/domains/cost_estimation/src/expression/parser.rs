//! Parser for rule expressions using pest

use once_cell::sync::Lazy;
use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pairs;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::ExpressionError;
use super::eval::Value;

#[derive(Parser)]
#[grammar = "expression/expression.pest"]
struct ExpressionGrammar;

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::not) | Op::prefix(Rule::neg))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Syntax tree of a parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Literal(Value),
    /// Dotted path into the resource config, one segment per element
    Field(Vec<String>),
    Unary(UnaryOp, Box<Ast>),
    Binary(BinaryOp, Box<Ast>, Box<Ast>),
}

/// Parse a non-empty expression into its syntax tree
pub fn parse(input: &str) -> Result<Ast, ExpressionError> {
    let mut pairs = ExpressionGrammar::parse(Rule::expression, input).map_err(|e| {
        let position = match e.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        ExpressionError::Parse {
            position,
            message: e.variant.message().into_owned(),
        }
    })?;

    let expr = pairs
        .next()
        .and_then(|expression| expression.into_inner().next())
        .ok_or_else(|| ExpressionError::Parse {
            position: 0,
            message: "empty expression".to_string(),
        })?;

    build_ast(expr.into_inner())
}

fn build_ast(pairs: Pairs<Rule>) -> Result<Ast, ExpressionError> {
    PRATT
        .map_primary(|primary| {
            let position = primary.as_span().start();
            match primary.as_rule() {
                Rule::number => Decimal::from_str(primary.as_str())
                    .map(|n| Ast::Literal(Value::Number(n)))
                    .map_err(|e| ExpressionError::Parse {
                        position,
                        message: format!("invalid number '{}': {}", primary.as_str(), e),
                    }),
                Rule::string => {
                    let text = primary
                        .into_inner()
                        .next()
                        .map(|inner| inner.as_str().to_string())
                        .unwrap_or_default();
                    Ok(Ast::Literal(Value::String(text)))
                }
                Rule::boolean => Ok(Ast::Literal(Value::Bool(primary.as_str() == "true"))),
                Rule::null_literal => Ok(Ast::Literal(Value::Null)),
                Rule::path => Ok(Ast::Field(
                    primary.as_str().split('.').map(str::to_string).collect(),
                )),
                Rule::expr => build_ast(primary.into_inner()),
                rule => Err(ExpressionError::Parse {
                    position,
                    message: format!("unexpected {:?}", rule),
                }),
            }
        })
        .map_prefix(|op, rhs| {
            let unary = match op.as_rule() {
                Rule::not => UnaryOp::Not,
                Rule::neg => UnaryOp::Neg,
                rule => {
                    return Err(ExpressionError::Parse {
                        position: op.as_span().start(),
                        message: format!("unexpected prefix {:?}", rule),
                    });
                }
            };
            Ok(Ast::Unary(unary, Box::new(rhs?)))
        })
        .map_infix(|lhs, op, rhs| {
            let binary = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::Ne,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                Rule::rem => BinaryOp::Rem,
                rule => {
                    return Err(ExpressionError::Parse {
                        position: op.as_span().start(),
                        message: format!("unexpected operator {:?}", rule),
                    });
                }
            };
            Ok(Ast::Binary(binary, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pairs)
}
