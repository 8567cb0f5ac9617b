//! Sandboxed expression language for scenario scripts.
//!
//! Authors embed expressions in step fields (`text`, `visible`, `onInit`,
//! `onPost`) and reference conversation variables through `${name}`
//! placeholders. The grammar is deliberately small: literals, placeholders,
//! member/index access into state values, arithmetic, comparisons, logical
//! operators, the ternary operator, and `${x} = expr` assignments chained
//! with `;`. There is no host-language escape hatch; a script can only read
//! and write the conversation state it is handed.
//!
//! Scripts are compiled once at load time ([`compile`]); a malformed
//! expression is therefore a compile error that aborts the reload, never a
//! silent substitution at turn time.

pub mod ast;
pub mod parser;

pub use ast::{BinaryOperator, Expr, Literal, Script, Stmt, UnaryOperator};
pub use parser::compile;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("failed to parse expression {source_text:?}: {message}")]
    Parse { source_text: String, message: String },
}

pub type ExprResult<T> = Result<T, ExprError>;
