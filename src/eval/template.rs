//! Step-field templates and the `evaluate` contract.
//!
//! Authored step fields are plain text, a full expression, or text with
//! embedded `${...}` placeholders. Which one is decided once at load time
//! ([`Template::compile`]); at turn time evaluation is a matter of running
//! the precompiled form against the conversation state.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::context::ConversationState;
use super::expression::{EvalError, EvalResult, ExpressionEvaluator, Value};
use crate::expr::{self, ExprResult, Script};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

pub fn has_placeholder(text: &str) -> bool {
    placeholder_re().is_match(text)
}

/// A compiled step field.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// No placeholders: the text is emitted verbatim.
    Literal(String),
    /// The whole field parses as an expression and is evaluated as one,
    /// so `${x} > 5 ? 'a' : 'b'` yields the branch value.
    Script(Script),
    /// Mixed text and placeholders: each placeholder is substituted with
    /// the variable's display form.
    Interpolation(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Variable(String),
}

impl Template {
    /// Compiles a field once, at load time. With `force` the field is
    /// always a script (used for `visible`/`onInit`/`onPost` hooks) and a
    /// parse failure propagates so the load can abort. Without `force` a
    /// field that does not parse as an expression falls back to
    /// placeholder interpolation, and placeholder-free text stays verbatim.
    pub fn compile(source: &str, force: bool) -> ExprResult<Template> {
        if force {
            return Ok(Template::Script(expr::compile(source)?));
        }
        if has_placeholder(source) {
            return Ok(match expr::compile(source) {
                Ok(script) => Template::Script(script),
                Err(e) => {
                    debug!("treating field as interpolation: {}", e);
                    Template::Interpolation(split_segments(source))
                }
            });
        }
        Ok(Template::Literal(source.to_string()))
    }

    pub fn evaluate(
        &self,
        evaluator: &ExpressionEvaluator,
        state: &ConversationState,
    ) -> EvalResult<Value> {
        match self {
            Template::Literal(text) => Ok(Value::String(text.clone())),
            Template::Script(script) => evaluator.eval_script(script, state),
            Template::Interpolation(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::Variable(name) => out.push_str(&state.get(name).to_string()),
                    }
                }
                Ok(Value::String(out))
            }
        }
    }

    /// Evaluates and renders to outbound text.
    pub fn render(
        &self,
        evaluator: &ExpressionEvaluator,
        state: &ConversationState,
    ) -> EvalResult<String> {
        Ok(self.evaluate(evaluator, state)?.to_string())
    }
}

fn split_segments(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in placeholder_re().captures_iter(source) {
        let whole = caps.get(0).expect("capture 0 always present");
        if whole.start() > last {
            segments.push(Segment::Literal(source[last..whole.start()].to_string()));
        }
        segments.push(Segment::Variable(caps[1].to_string()));
        last = whole.end();
    }
    if last < source.len() {
        segments.push(Segment::Literal(source[last..].to_string()));
    }
    segments
}

/// The evaluator contract for uncompiled values: non-text passes through,
/// text with placeholders is evaluated or interpolated, `force` makes the
/// text a script even without placeholders, and anything else is returned
/// verbatim. Compiled [`Template`]s are preferred on the hot path; this
/// form exists for callers holding raw values.
pub fn evaluate(
    evaluator: &ExpressionEvaluator,
    state: &ConversationState,
    value: &Value,
    force: bool,
) -> EvalResult<Value> {
    let Value::String(text) = value else {
        return Ok(value.clone());
    };
    if !force && !has_placeholder(text) {
        return Ok(value.clone());
    }
    let template = Template::compile(text, force).map_err(|e| EvalError::Eval(e.to_string()))?;
    template.evaluate(evaluator, state)
}
