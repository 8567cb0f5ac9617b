//! Evaluation of compiled scenario scripts at conversation time.
//!
//! # Core Components
//!
//! ## Expression Evaluator
//! Evaluates a compiled [`crate::expr::Script`] against a conversation's
//! state: literals, placeholders, member/index access, operators, the
//! ternary, and `${x} = ...` assignments (the script escape hatch used by
//! `onInit`/`onPost` hooks).
//!
//! ## Templates
//! Step `text`/`image`/card fields are compiled into [`template::Template`]s
//! at load time: a verbatim string, a full expression, or an interpolation
//! of literal segments and placeholders.
//!
//! ## Conversation State
//! A flat name-to-value map scoped to one conversation. Unknown names
//! resolve to [`expression::Value::Null`], the explicit absent marker;
//! lookups never fail.

pub mod context;
pub mod expression;
pub mod template;
