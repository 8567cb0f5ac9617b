//! Crate-level error type.
//!
//! Each layer keeps its own error enum (`CompileError`, `EvalError`,
//! `RuntimeError`, ...); this type is the umbrella the public surface
//! returns, converting via `#[from]` so `?` composes across layers.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::eval::expression::EvalError;
use crate::event_bus::EventError;
use crate::expr::ExprError;
use crate::runtime::RuntimeError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("expression error: {0}")]
    Expr(#[from] ExprError),
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("event error: {0}")]
    Event(#[from] EventError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;
