use core::fmt;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::ConversationState;
use crate::expr::{BinaryOperator, Expr, Literal, Script, Stmt, UnaryOperator};

/// Runtime value type for conversation state and expression results.
#[derive(Clone, Debug, PartialEq, Default, Deserialize, Serialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Time(DateTime<Utc>),
    /// The explicit absent marker. Unknown variables resolve to this, and
    /// evaluation against it stays well-defined instead of failing.
    #[default]
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Null => Ok(()),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl Value {
    /// Script truthiness: absent, zero, empty string and empty collections
    /// are false, everything else true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Time(_) => true,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("evaluation failed: {0}")]
    Eval(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Evaluates compiled scripts against a conversation's state.
///
/// Evaluation may mutate the state: `${x} = ...` assignments are how
/// `onInit`/`onPost` hooks write back into the conversation.
#[derive(Debug, Default)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Runs every statement in order and returns the last value.
    pub fn eval_script(&self, script: &Script, state: &ConversationState) -> EvalResult<Value> {
        let mut last = Value::Null;
        for stmt in &script.0 {
            last = match stmt {
                Stmt::Assign { variable, value } => {
                    let value = self.eval_expr(value, state)?;
                    state.set(variable, value.clone());
                    value
                }
                Stmt::Expr(expr) => self.eval_expr(expr, state)?,
            };
        }
        Ok(last)
    }

    pub fn eval_expr(&self, expr: &Expr, state: &ConversationState) -> EvalResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(Self::eval_literal(lit)),
            Expr::Variable(name) => Ok(state.get(name)),
            Expr::Member { target, field } => {
                let target = self.eval_expr(target, state)?;
                self.eval_member(&target, field)
            }
            Expr::Index { target, index } => {
                let target = self.eval_expr(target, state)?;
                let index = self.eval_expr(index, state)?;
                self.eval_index(&target, &index)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval_expr(operand, state)?;
                self.eval_unary(*op, &operand)
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, state),
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(condition, state)?.is_truthy() {
                    self.eval_expr(then_branch, state)
                } else {
                    self.eval_expr(else_branch, state)
                }
            }
        }
    }

    fn eval_literal(lit: &Literal) -> Value {
        match lit {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
        }
    }

    fn eval_member(&self, target: &Value, field: &str) -> EvalResult<Value> {
        match target {
            Value::Map(map) => Ok(map.get(field).cloned().unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            _ => Err(EvalError::Type(format!(
                "cannot access field {:?} on {:?}",
                field, target
            ))),
        }
    }

    fn eval_index(&self, target: &Value, index: &Value) -> EvalResult<Value> {
        match (target, index) {
            (Value::List(list), Value::Integer(i)) => {
                if *i < 0 {
                    return Ok(Value::Null);
                }
                Ok(list.get(*i as usize).cloned().unwrap_or(Value::Null))
            }
            (Value::Map(map), Value::String(key)) => {
                Ok(map.get(key).cloned().unwrap_or(Value::Null))
            }
            (Value::Null, _) => Ok(Value::Null),
            _ => Err(EvalError::Type(format!(
                "cannot index {:?} with {:?}",
                target, index
            ))),
        }
    }

    fn eval_unary(&self, op: UnaryOperator, operand: &Value) -> EvalResult<Value> {
        match op {
            UnaryOperator::Not => Ok(Value::Boolean(!operand.is_truthy())),
            UnaryOperator::Negate => match operand {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                _ => Err(EvalError::Type(format!("cannot negate {:?}", operand))),
            },
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOperator,
        left: &Expr,
        right: &Expr,
        state: &ConversationState,
    ) -> EvalResult<Value> {
        // Logical operators short-circuit on truthiness.
        if op == BinaryOperator::And {
            let left = self.eval_expr(left, state)?;
            if !left.is_truthy() {
                return Ok(Value::Boolean(false));
            }
            return Ok(Value::Boolean(self.eval_expr(right, state)?.is_truthy()));
        }
        if op == BinaryOperator::Or {
            let left = self.eval_expr(left, state)?;
            if left.is_truthy() {
                return Ok(Value::Boolean(true));
            }
            return Ok(Value::Boolean(self.eval_expr(right, state)?.is_truthy()));
        }

        let left = self.eval_expr(left, state)?;
        let right = self.eval_expr(right, state)?;
        match op {
            BinaryOperator::Add => self.eval_add(&left, &right),
            BinaryOperator::Subtract => self.eval_subtract(&left, &right),
            BinaryOperator::Multiply => self.eval_multiply(&left, &right),
            BinaryOperator::Divide => self.eval_divide(&left, &right),
            BinaryOperator::Modulo => self.eval_modulo(&left, &right),
            BinaryOperator::Equal => Ok(Value::Boolean(Self::loose_eq(&left, &right))),
            BinaryOperator::NotEqual => Ok(Value::Boolean(!Self::loose_eq(&left, &right))),
            BinaryOperator::LessThan => self.compare_values(&left, &right, |o| o.is_lt()),
            BinaryOperator::GreaterThan => self.compare_values(&left, &right, |o| o.is_gt()),
            BinaryOperator::LessThanEqual => self.compare_values(&left, &right, |o| o.is_le()),
            BinaryOperator::GreaterThanEqual => self.compare_values(&left, &right, |o| o.is_ge()),
            BinaryOperator::And | BinaryOperator::Or => unreachable!(),
        }
    }

    fn eval_add(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l + r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 + r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l + *r as f64)),
            // String on either side concatenates, so text can be built up
            // from mixed values.
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", left, right)))
            }
            _ => Err(EvalError::Type(format!("{:?} + {:?}", left, right))),
        }
    }

    fn eval_subtract(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l - r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l - r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 - r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l - *r as f64)),
            _ => Err(EvalError::Type(format!("{:?} - {:?}", left, right))),
        }
    }

    fn eval_multiply(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l * r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l * r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 * r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l * *r as f64)),
            _ => Err(EvalError::Type(format!("{:?} * {:?}", left, right))),
        }
    }

    fn eval_divide(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if *r == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Float(*l as f64 / *r as f64))
            }
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l / r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 / r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l / *r as f64)),
            _ => Err(EvalError::Type(format!("{:?} / {:?}", left, right))),
        }
    }

    fn eval_modulo(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if *r == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Integer(l % r))
            }
            _ => Err(EvalError::Type(format!("{:?} % {:?}", left, right))),
        }
    }

    fn loose_eq(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Integer(l), Value::Float(r)) => *l as f64 == *r,
            (Value::Float(l), Value::Integer(r)) => *l == *r as f64,
            _ => left == right,
        }
    }

    fn compare_values<F>(&self, left: &Value, right: &Value, compare: F) -> EvalResult<Value>
    where
        F: Fn(std::cmp::Ordering) -> bool,
    {
        let ordering = match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => l.cmp(r),
            (Value::Float(l), Value::Float(r)) => l
                .partial_cmp(r)
                .ok_or_else(|| EvalError::Type("incomparable floats".to_string()))?,
            (Value::Integer(l), Value::Float(r)) => (*l as f64)
                .partial_cmp(r)
                .ok_or_else(|| EvalError::Type("incomparable floats".to_string()))?,
            (Value::Float(l), Value::Integer(r)) => l
                .partial_cmp(&(*r as f64))
                .ok_or_else(|| EvalError::Type("incomparable floats".to_string()))?,
            (Value::String(l), Value::String(r)) => l.cmp(r),
            (Value::Time(l), Value::Time(r)) => l.cmp(r),
            _ => {
                return Err(EvalError::Type(format!("{:?} <=> {:?}", left, right)));
            }
        };
        Ok(Value::Boolean(compare(ordering)))
    }
}
