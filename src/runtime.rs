//! Turn-by-turn dialog execution.
//!
//! A [`Conversation`] holds everything mutable about one user's session:
//! the variable state, the stack of active dialog frames, and whether a
//! prompt is awaiting input. Compiled dialogs are immutable and shared;
//! the conversation only keeps `Arc` handles into the table it started
//! the current dialog under, so a table swap mid-dialog never changes the
//! steps already in flight.
//!
//! Execution is a waterfall: steps run in order, pausing at a prompt until
//! input arrives and descending into nested dialogs through a frame push.
//! The predecessor flush happens on entry to each step: the previous
//! step's captured response is written to its variable, and (for prompts)
//! its `onPost` hook runs before anything else in the new step.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use strum_macros::Display;
use thiserror::Error;
use tracing::debug;

use crate::ast::{DataTypeDef, DataTypeKind};
use crate::compiler::{
    CardTemplate, CompiledDialog, PromptHandler, StatementHandler, Step, StepHandler,
};
use crate::eval::context::ConversationState;
use crate::eval::expression::{EvalError, ExpressionEvaluator, Value};
use crate::loader::DialogTable;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("no dialog named {0:?}")]
    UnknownDialog(String),
    #[error("dialog nesting exceeded the limit of {limit}")]
    DepthExceeded { limit: usize },
    #[error("no prompt is awaiting input")]
    NotAwaitingInput,
    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Input shape a prompt expects, surfaced to the channel so it can render
/// pickers or keyboards where it has them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum InputKind {
    Text,
    Number,
    Boolean,
    Time,
    Choice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputRequest {
    pub kind: InputKind,
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    Image(String),
    Card {
        title: String,
        button_label: String,
        button_url: String,
    },
}

/// One message headed back to the channel. `input` is set when the
/// message is a prompt and the conversation now waits.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub input: Option<InputRequest>,
}

/// Everything produced by one turn. `finished` means the frame stack
/// drained: the conversation is idle and the next message goes through
/// intent matching again.
#[derive(Debug, Default)]
pub struct TurnReply {
    pub messages: Vec<OutboundMessage>,
    pub finished: bool,
}

#[derive(Debug)]
struct Frame {
    dialog: Arc<CompiledDialog>,
    step: usize,
}

#[derive(Debug)]
pub struct Conversation {
    state: ConversationState,
    frames: Vec<Frame>,
    awaiting: bool,
    evaluator: ExpressionEvaluator,
    max_depth: usize,
}

impl Conversation {
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: ConversationState::new(),
            frames: Vec::new(),
            awaiting: false,
            evaluator: ExpressionEvaluator::new(),
            max_depth,
        }
    }

    /// No frames on the stack: the next message is an intent, not input.
    pub fn is_idle(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_awaiting_input(&self) -> bool {
        self.awaiting
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Drops all in-flight frames. Variables survive; the first-step reset
    /// clears a dialog's own names when it is entered again.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.awaiting = false;
    }

    /// Enters a root dialog from the top, replacing whatever was running.
    pub fn begin(&mut self, table: &DialogTable, dialog: &str) -> RuntimeResult<TurnReply> {
        let compiled = table
            .registry
            .get(dialog)
            .ok_or_else(|| RuntimeError::UnknownDialog(dialog.to_string()))?;
        debug!("beginning dialog {:?}", dialog);
        self.reset();
        self.frames.push(Frame {
            dialog: compiled,
            step: 0,
        });
        self.run(table, None)
    }

    /// Feeds one inbound message to the prompt currently waiting. Input
    /// that fails the prompt's type check re-issues the prompt without
    /// advancing the dialog.
    pub fn resume(&mut self, table: &DialogTable, input: &str) -> RuntimeResult<TurnReply> {
        if !self.awaiting {
            return Err(RuntimeError::NotAwaitingInput);
        }
        let (prompt, step_done) = {
            let frame = self.frames.last().ok_or(RuntimeError::NotAwaitingInput)?;
            let step = frame
                .dialog
                .steps
                .get(frame.step)
                .ok_or(RuntimeError::NotAwaitingInput)?;
            let StepHandler::Prompt(prompt) = &step.handler else {
                return Err(RuntimeError::NotAwaitingInput);
            };
            (prompt.clone(), frame.step + 1)
        };

        match coerce_input(prompt.data_type.as_ref(), input) {
            Ok(value) => {
                self.awaiting = false;
                if let Some(frame) = self.frames.last_mut() {
                    frame.step = step_done;
                }
                self.run(table, Some(value))
            }
            Err(reason) => {
                debug!("rejected input {:?}: {}", input, reason);
                Ok(TurnReply {
                    messages: vec![self.render_prompt(&prompt)?],
                    finished: false,
                })
            }
        }
    }

    fn run(&mut self, table: &DialogTable, mut response: Option<Value>) -> RuntimeResult<TurnReply> {
        let mut messages = Vec::new();
        loop {
            let Some(frame) = self.frames.last() else {
                return Ok(TurnReply {
                    messages,
                    finished: true,
                });
            };
            let dialog = frame.dialog.clone();
            let index = frame.step;
            let Some(step) = dialog.steps.get(index) else {
                // chains end in a terminal handler, so a walked-off index
                // only means the frame is already done
                self.frames.pop();
                continue;
            };

            if step.first_step {
                self.state.clear(&dialog.reset_variables);
            }
            if let Some(prev) = &step.prev {
                if let (Some(variable), Some(value)) = (&prev.variable, response.as_ref()) {
                    self.state.set(variable, value.clone());
                }
            }

            match &step.handler {
                StepHandler::Prompt(prompt) => {
                    if let Some(on_post) = step.prev.as_ref().and_then(|p| p.on_post.as_ref()) {
                        self.evaluator.eval_script(on_post, &self.state)?;
                    }
                    response = None;
                    if !self.guard_passes(step)? {
                        self.advance();
                        continue;
                    }
                    if let Some(on_init) = &step.on_init {
                        self.evaluator.eval_script(on_init, &self.state)?;
                    }
                    messages.push(self.render_prompt(prompt)?);
                    self.awaiting = true;
                    return Ok(TurnReply {
                        messages,
                        finished: false,
                    });
                }
                StepHandler::Statement(statement) => {
                    response = None;
                    if !self.guard_passes(step)? {
                        self.advance();
                        continue;
                    }
                    messages.push(self.render_statement(statement)?);
                    if let Some(on_init) = &step.on_init {
                        self.evaluator.eval_script(on_init, &self.state)?;
                    }
                    // a statement concludes its dialog with no response
                    self.frames.pop();
                    continue;
                }
                StepHandler::SubDialog(sub) => {
                    response = None;
                    if !self.guard_passes(step)? {
                        self.advance();
                        continue;
                    }
                    let nested = table
                        .registry
                        .get(&sub.dialog)
                        .ok_or_else(|| RuntimeError::UnknownDialog(sub.dialog.clone()))?;
                    if self.frames.len() >= self.max_depth {
                        return Err(RuntimeError::DepthExceeded {
                            limit: self.max_depth,
                        });
                    }
                    // the parent resumes after this step once the nested
                    // dialog returns
                    self.advance();
                    self.frames.push(Frame {
                        dialog: nested,
                        step: 0,
                    });
                    continue;
                }
                StepHandler::End => {
                    // the captured response survives the pop so the parent
                    // frame's next step can flush it into its variable
                    self.frames.pop();
                    continue;
                }
            }
        }
    }

    fn advance(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.step += 1;
        }
    }

    fn guard_passes(&self, step: &Step) -> RuntimeResult<bool> {
        match &step.visible {
            Some(guard) => Ok(self
                .evaluator
                .eval_script(guard, &self.state)?
                .is_truthy()),
            None => Ok(true),
        }
    }

    fn render_prompt(&self, prompt: &PromptHandler) -> RuntimeResult<OutboundMessage> {
        let text = prompt.text.render(&self.evaluator, &self.state)?;
        let mut attachments = Vec::new();
        if let Some(image) = &prompt.image {
            attachments.push(Attachment::Image(
                image.render(&self.evaluator, &self.state)?,
            ));
        }
        if let Some(card) = &prompt.card {
            attachments.push(self.render_card(card)?);
        }
        let (kind, choices) = input_shape(prompt.data_type.as_ref());
        Ok(OutboundMessage {
            text,
            attachments,
            input: Some(InputRequest { kind, choices }),
        })
    }

    fn render_statement(&self, statement: &StatementHandler) -> RuntimeResult<OutboundMessage> {
        let text = statement.text.render(&self.evaluator, &self.state)?;
        let mut attachments = Vec::new();
        if let Some(image) = &statement.image {
            attachments.push(Attachment::Image(
                image.render(&self.evaluator, &self.state)?,
            ));
        }
        if let Some(card) = &statement.card {
            attachments.push(self.render_card(card)?);
        }
        Ok(OutboundMessage {
            text,
            attachments,
            input: None,
        })
    }

    fn render_card(&self, card: &CardTemplate) -> RuntimeResult<Attachment> {
        Ok(Attachment::Card {
            title: card.title.render(&self.evaluator, &self.state)?,
            button_label: card.button_label.render(&self.evaluator, &self.state)?,
            button_url: card.button_url.render(&self.evaluator, &self.state)?,
        })
    }
}

fn input_shape(data_type: Option<&DataTypeDef>) -> (InputKind, Vec<String>) {
    match data_type {
        Some(DataTypeDef::Choice(choices)) => (InputKind::Choice, choices.clone()),
        Some(DataTypeDef::Kind(DataTypeKind::Number)) => (InputKind::Number, Vec::new()),
        Some(DataTypeDef::Kind(DataTypeKind::Boolean)) => (InputKind::Boolean, Vec::new()),
        Some(DataTypeDef::Kind(DataTypeKind::Time)) => (InputKind::Time, Vec::new()),
        Some(DataTypeDef::Kind(DataTypeKind::Text)) | None => (InputKind::Text, Vec::new()),
    }
}

/// Checks inbound text against a prompt's declared type and converts it
/// to the value stored in conversation state.
pub fn coerce_input(data_type: Option<&DataTypeDef>, input: &str) -> Result<Value, String> {
    let input = input.trim();
    match data_type {
        None | Some(DataTypeDef::Kind(DataTypeKind::Text)) => {
            Ok(Value::String(input.to_string()))
        }
        Some(DataTypeDef::Kind(DataTypeKind::Number)) => {
            if let Ok(i) = input.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            input
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("{:?} is not a number", input))
        }
        Some(DataTypeDef::Kind(DataTypeKind::Boolean)) => {
            match input.to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" | "1" => Ok(Value::Boolean(true)),
                "no" | "n" | "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(format!("{:?} is not yes/no", input)),
            }
        }
        Some(DataTypeDef::Kind(DataTypeKind::Time)) => {
            parse_time(input).ok_or_else(|| format!("{:?} is not a time", input))
        }
        Some(DataTypeDef::Choice(choices)) => choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(input))
            .map(|choice| Value::String(choice.clone()))
            .ok_or_else(|| format!("{:?} is not one of the choices", input)),
    }
}

fn parse_time(input: &str) -> Option<Value> {
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Some(Value::Time(t.with_timezone(&Utc)));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Some(Value::Time(t.and_utc()));
    }
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(Value::Time(d.and_hms_opt(0, 0, 0)?.and_utc()));
    }
    None
}
