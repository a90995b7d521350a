// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Tree-walking evaluation of parsed expressions.
//!
//! The evaluator is total on the accepted grammar: no side effects, no I/O,
//! and every failure is an [`EvalError`]. Numeric comparisons cross the
//! int/float boundary; ordering is defined for numbers and strings only.
//! `and`/`or` short-circuit and always produce a boolean.

use crate::eval::parser::{BinaryOp, BoolOp, CompareOp, Expr, UnaryOp};
use crate::eval::EvalError;
use serde_json::{Map, Number, Value};

/// Python-style truthiness: empty collections, empty strings, zero, and
/// null are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i != 0
            } else if let Some(u) = n.as_u64() {
                u != 0
            } else {
                n.as_f64().map(|f| f != 0.0).unwrap_or(false)
            }
        }
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

pub fn evaluate(expr: &Expr, context: &Map<String, Value>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => context
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownName(name.clone())),
        Expr::Attribute { value, attr } => {
            let target = evaluate(value, context)?;
            match target {
                Value::Object(entries) => entries
                    .get(attr)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingKey(attr.clone())),
                _ => Err(EvalError::UnresolvedAttribute(attr.clone())),
            }
        }
        Expr::Subscript { value, index } => {
            let target = evaluate(value, context)?;
            let key = evaluate(index, context)?;
            subscript(&target, &key)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, context)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => match to_number(&value) {
                    Some(Num::Int(i)) => Ok(Value::from(-i)),
                    Some(Num::Float(f)) => float_value(-f),
                    None => Err(EvalError::Unsupported(format!(
                        "unsupported operand type for unary '-': {}",
                        crate::schema::value_type_name(&value)
                    ))),
                },
                UnaryOp::Pos => match to_number(&value) {
                    Some(_) => Ok(value),
                    None => Err(EvalError::Unsupported(format!(
                        "unsupported operand type for unary '+': {}",
                        crate::schema::value_type_name(&value)
                    ))),
                },
            }
        }
        Expr::Binary { op, left, right } => {
            let lhs = evaluate(left, context)?;
            let rhs = evaluate(right, context)?;
            binary(*op, &lhs, &rhs)
        }
        Expr::Compare { left, links } => {
            let mut current = evaluate(left, context)?;
            for (op, comparator) in links {
                let next = evaluate(comparator, context)?;
                if !compare(*op, &current, &next)? {
                    return Ok(Value::Bool(false));
                }
                current = next;
            }
            Ok(Value::Bool(true))
        }
        Expr::Bool { op, values } => {
            match op {
                BoolOp::And => {
                    for value in values {
                        if !truthy(&evaluate(value, context)?) {
                            return Ok(Value::Bool(false));
                        }
                    }
                    Ok(Value::Bool(true))
                }
                BoolOp::Or => {
                    for value in values {
                        if truthy(&evaluate(value, context)?) {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }
            }
        }
    }
}

/// Numbers with the int/float distinction preserved. Booleans are not
/// numbers here.
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(&self) -> f64 {
        match self {
            Num::Int(i) => *i as f64,
            Num::Float(f) => *f,
        }
    }
}

fn to_number(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Num::Int(i))
            } else {
                n.as_f64().map(Num::Float)
            }
        }
        _ => None,
    }
}

fn float_value(value: f64) -> Result<Value, EvalError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| EvalError::Unsupported("non-finite arithmetic result".to_string()))
}

fn subscript(target: &Value, key: &Value) -> Result<Value, EvalError> {
    match (target, key) {
        (Value::Object(entries), Value::String(name)) => entries
            .get(name)
            .cloned()
            .ok_or(EvalError::InvalidSubscript),
        (Value::Array(items), Value::Number(n)) => {
            let index = n.as_i64().ok_or(EvalError::InvalidSubscript)?;
            let resolved = if index < 0 {
                index + items.len() as i64
            } else {
                index
            };
            if resolved < 0 {
                return Err(EvalError::InvalidSubscript);
            }
            items
                .get(resolved as usize)
                .cloned()
                .ok_or(EvalError::InvalidSubscript)
        }
        _ => Err(EvalError::InvalidSubscript),
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    if op == BinaryOp::Add {
        if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
            return Ok(Value::from(format!("{a}{b}")));
        }
    }

    let (a, b) = match (to_number(lhs), to_number(rhs)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(EvalError::Unsupported(format!(
                "unsupported operand types for '{}': {} and {}",
                binary_symbol(op),
                crate::schema::value_type_name(lhs),
                crate::schema::value_type_name(rhs)
            )))
        }
    };

    match op {
        BinaryOp::Add => int_or_float(a, b, i64::checked_add, |x, y| x + y),
        BinaryOp::Sub => int_or_float(a, b, i64::checked_sub, |x, y| x - y),
        BinaryOp::Mul => int_or_float(a, b, i64::checked_mul, |x, y| x * y),
        BinaryOp::Div => {
            if b.as_f64() == 0.0 {
                return Err(EvalError::Unsupported("division by zero".to_string()));
            }
            float_value(a.as_f64() / b.as_f64())
        }
        BinaryOp::Mod => match (a, b) {
            (_, Num::Int(0)) => Err(EvalError::Unsupported("division by zero".to_string())),
            // Result sign follows the divisor.
            (Num::Int(x), Num::Int(y)) => Ok(Value::from(((x % y) + y) % y)),
            (x, y) => {
                let divisor = y.as_f64();
                if divisor == 0.0 {
                    return Err(EvalError::Unsupported("division by zero".to_string()));
                }
                let dividend = x.as_f64();
                float_value(dividend - divisor * (dividend / divisor).floor())
            }
        },
    }
}

fn int_or_float(
    a: Num,
    b: Num,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (&a, &b) {
        (Num::Int(x), Num::Int(y)) => match int_op(*x, *y) {
            Some(result) => Ok(Value::from(result)),
            // Integer overflow promotes to float instead of failing.
            None => float_value(float_op(*x as f64, *y as f64)),
        },
        _ => float_value(float_op(a.as_f64(), b.as_f64())),
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq => Ok(value_eq(lhs, rhs)),
        CompareOp::NotEq => Ok(!value_eq(lhs, rhs)),
        _ => {
            let ordering = match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => match (to_number(lhs), to_number(rhs)) {
                    (Some(Num::Int(a)), Some(Num::Int(b))) => a.cmp(&b),
                    (Some(a), Some(b)) => a
                        .as_f64()
                        .partial_cmp(&b.as_f64())
                        .ok_or_else(|| not_comparable(lhs, rhs))?,
                    _ => return Err(not_comparable(lhs, rhs)),
                },
            };
            Ok(match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::LtEq => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::GtEq => ordering.is_ge(),
                CompareOp::Eq | CompareOp::NotEq => unreachable!("handled above"),
            })
        }
    }
}

fn not_comparable(lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::Unsupported(format!(
        "comparison not supported between {} and {}",
        crate::schema::value_type_name(lhs),
        crate::schema::value_type_name(rhs)
    ))
}

/// Structural equality, except that numbers compare numerically across the
/// int/float divide (`1 == 1.0` holds).
fn value_eq(lhs: &Value, rhs: &Value) -> bool {
    match (to_number(lhs), to_number(rhs)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}
