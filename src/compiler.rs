//! Step compilation: authored [`DialogDef`] trees into executable dialogs.
//!
//! Compilation happens once per load cycle, after normalization. Every
//! expression field is parsed here, so authoring mistakes surface as
//! [`CompileError`]s at load time instead of runtime faults mid-turn.
//!
//! The compiled form is deliberately inert data: a [`CompiledDialog`] is a
//! chain of immutable step values the runtime walks, never a set of
//! closures. Closures would capture whatever definitions were live when
//! the dialog was compiled and keep serving them after a reload; plain
//! data resolved against the current table cannot go stale.

use thiserror::Error;
use tracing::debug;

use crate::ast::{CardDef, DataTypeDef, DialogDef, StepDef, StepKind};
use crate::eval::template::Template;
use crate::expr::{self, ExprError, Script};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("dialog {dialog:?} step {step}: step has neither type nor group")]
    UnknownStep { dialog: String, step: usize },
    #[error("dialog {dialog:?} step {step}: {kind:?} step requires text")]
    MissingText {
        dialog: String,
        step: usize,
        kind: StepKind,
    },
    #[error("dialog {dialog:?} step {step}: prompt requires a variable")]
    MissingVariable { dialog: String, step: usize },
    #[error("root dialog {dialog:?} has no intent pattern")]
    MissingIntent { dialog: String },
    #[error("root dialog has no name")]
    MissingName,
    #[error("dialog {dialog:?} step {step}: field {field:?} failed to compile")]
    Field {
        dialog: String,
        step: usize,
        field: &'static str,
        #[source]
        source: ExprError,
    },
    #[error("intent pattern {pattern:?} is not a valid regex")]
    InvalidIntent {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type CompileResult<T> = Result<T, CompileError>;

/// A fully compiled dialog: a linear step chain plus the variable reset
/// list applied when a root dialog is entered at its first step.
#[derive(Debug, Clone)]
pub struct CompiledDialog {
    pub name: String,
    pub steps: Vec<Step>,
    pub reset_variables: Vec<String>,
}

/// One executable step. `prev` is the resolved predecessor link: the
/// variable and `onPost` hook of the step before this one, flushed when
/// this step first runs with the predecessor's response in hand.
#[derive(Debug, Clone)]
pub struct Step {
    pub handler: StepHandler,
    pub visible: Option<Script>,
    pub on_init: Option<Script>,
    pub prev: Option<PrevLink>,
    pub first_step: bool,
}

/// Predecessor data carried forward positionally (step `s` links to
/// `s - 1`; the chain is linear, so index resolution suffices).
#[derive(Debug, Clone)]
pub struct PrevLink {
    pub variable: Option<String>,
    pub on_post: Option<Script>,
}

/// Closed union of executable step shapes.
#[derive(Debug, Clone)]
pub enum StepHandler {
    Prompt(PromptHandler),
    Statement(StatementHandler),
    SubDialog(SubDialogHandler),
    End,
}

#[derive(Debug, Clone)]
pub struct PromptHandler {
    pub text: Template,
    pub variable: String,
    pub data_type: Option<DataTypeDef>,
    pub image: Option<Template>,
    pub card: Option<CardTemplate>,
}

#[derive(Debug, Clone)]
pub struct StatementHandler {
    pub text: Template,
    pub image: Option<Template>,
    pub card: Option<CardTemplate>,
}

/// Invocation of a nested dialog by its generated name.
#[derive(Debug, Clone)]
pub struct SubDialogHandler {
    pub dialog: String,
}

/// Card attachment with every field compiled, since any of them may carry
/// placeholders.
#[derive(Debug, Clone)]
pub struct CardTemplate {
    pub title: Template,
    pub button_label: Template,
    pub button_url: Template,
}

/// Compiles one dialog's own step chain. Nested `group` dialogs are not
/// descended into here; the registrar walks the tree and compiles each
/// dialog separately, so a sub-dialog step only records the nested
/// dialog's name.
pub fn compile_dialog(def: &DialogDef, is_root: bool) -> CompileResult<CompiledDialog> {
    let mut steps = Vec::with_capacity(def.steps.len());
    for (index, step_def) in def.steps.iter().enumerate() {
        steps.push(compile_step(def, index, step_def)?);
    }
    let reset_variables = if is_root {
        def.declared_variables()
    } else {
        Vec::new()
    };
    debug!(
        "compiled dialog {:?}: {} steps, {} reset variables",
        def.name,
        steps.len(),
        reset_variables.len()
    );
    Ok(CompiledDialog {
        name: def.name.clone(),
        steps,
        reset_variables,
    })
}

fn compile_step(dialog: &DialogDef, index: usize, def: &StepDef) -> CompileResult<Step> {
    let kind = def.kind().ok_or_else(|| CompileError::UnknownStep {
        dialog: dialog.name.clone(),
        step: index,
    })?;

    let handler = match kind {
        StepKind::SubDialog => {
            let group = def.group.as_ref().expect("kind() saw a group");
            StepHandler::SubDialog(SubDialogHandler {
                dialog: group.name.clone(),
            })
        }
        StepKind::Prompt => {
            let text = required_text(dialog, index, kind, def)?;
            let variable = def
                .variable
                .clone()
                .ok_or_else(|| CompileError::MissingVariable {
                    dialog: dialog.name.clone(),
                    step: index,
                })?;
            StepHandler::Prompt(PromptHandler {
                text,
                variable,
                data_type: def.data_type.clone(),
                image: compile_optional_template(dialog, index, "image", &def.image)?,
                card: compile_card(dialog, index, def.card.as_ref())?,
            })
        }
        StepKind::Statement => StepHandler::Statement(StatementHandler {
            text: required_text(dialog, index, kind, def)?,
            image: compile_optional_template(dialog, index, "image", &def.image)?,
            card: compile_card(dialog, index, def.card.as_ref())?,
        }),
        StepKind::End => StepHandler::End,
    };

    Ok(Step {
        handler,
        visible: compile_optional_script(dialog, index, "visible", &def.visible)?,
        on_init: compile_optional_script(dialog, index, "onInit", &def.on_init)?,
        prev: prev_link(dialog, index)?,
        first_step: def.first_step,
    })
}

fn required_text(
    dialog: &DialogDef,
    index: usize,
    kind: StepKind,
    def: &StepDef,
) -> CompileResult<Template> {
    let text = def.text.as_deref().ok_or_else(|| CompileError::MissingText {
        dialog: dialog.name.clone(),
        step: index,
        kind,
    })?;
    Template::compile(text, false).map_err(|source| CompileError::Field {
        dialog: dialog.name.clone(),
        step: index,
        field: "text",
        source,
    })
}

fn compile_optional_template(
    dialog: &DialogDef,
    index: usize,
    field: &'static str,
    source_text: &Option<String>,
) -> CompileResult<Option<Template>> {
    source_text
        .as_deref()
        .map(|text| {
            Template::compile(text, false).map_err(|source| CompileError::Field {
                dialog: dialog.name.clone(),
                step: index,
                field,
                source,
            })
        })
        .transpose()
}

// Hook fields are always full expressions, never interpolated text.
fn compile_optional_script(
    dialog: &DialogDef,
    index: usize,
    field: &'static str,
    source_text: &Option<String>,
) -> CompileResult<Option<Script>> {
    source_text
        .as_deref()
        .map(|text| {
            expr::compile(text).map_err(|source| CompileError::Field {
                dialog: dialog.name.clone(),
                step: index,
                field,
                source,
            })
        })
        .transpose()
}

fn compile_card(
    dialog: &DialogDef,
    index: usize,
    card: Option<&CardDef>,
) -> CompileResult<Option<CardTemplate>> {
    let Some(card) = card else {
        return Ok(None);
    };
    let field = |name: &'static str, text: &str| {
        Template::compile(text, false).map_err(|source| CompileError::Field {
            dialog: dialog.name.clone(),
            step: index,
            field: name,
            source,
        })
    };
    Ok(Some(CardTemplate {
        title: field("card.title", &card.title)?,
        button_label: field("card.buttonLabel", &card.button_label)?,
        button_url: field("card.buttonUrl", &card.button_url)?,
    }))
}

fn prev_link(dialog: &DialogDef, index: usize) -> CompileResult<Option<PrevLink>> {
    let Some(prev) = index.checked_sub(1).and_then(|i| dialog.steps.get(i)) else {
        return Ok(None);
    };
    let on_post = compile_optional_script(dialog, index - 1, "onPost", &prev.on_post)?;
    if prev.variable.is_none() && on_post.is_none() {
        return Ok(None);
    }
    Ok(Some(PrevLink {
        variable: prev.variable.clone(),
        on_post,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StepType;
    use pretty_assertions::assert_eq;

    fn parse(json: &str) -> DialogDef {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_compile_prompt_chain() {
        let dialog = parse(
            r#"{
                "name": "greet",
                "intent": "hi",
                "steps": [
                    { "type": "prompt", "text": "Name?", "variable": "name" },
                    { "type": "statement", "text": "Hello ${name}" }
                ]
            }"#,
        );
        let compiled = compile_dialog(&dialog, true).unwrap();
        assert_eq!(compiled.name, "greet");
        assert_eq!(compiled.steps.len(), 2);
        assert_eq!(compiled.reset_variables, vec!["name"]);

        assert!(matches!(compiled.steps[0].handler, StepHandler::Prompt(_)));
        assert!(compiled.steps[0].prev.is_none());

        let StepHandler::Statement(statement) = &compiled.steps[1].handler else {
            panic!("expected statement");
        };
        assert!(matches!(statement.text, Template::Interpolation(_)));
        let prev = compiled.steps[1].prev.as_ref().unwrap();
        assert_eq!(prev.variable.as_deref(), Some("name"));
    }

    #[test]
    fn test_nested_dialog_reset_list_is_empty() {
        let dialog = parse(
            r#"{ "steps": [ { "type": "prompt", "text": "?", "variable": "x" } ] }"#,
        );
        let compiled = compile_dialog(&dialog, false).unwrap();
        assert!(compiled.reset_variables.is_empty());
    }

    #[test]
    fn test_root_reset_list_covers_nested_groups() {
        let dialog = parse(
            r#"{
                "name": "root",
                "steps": [
                    { "type": "prompt", "text": "?", "variable": "a" },
                    { "group": { "name": "g", "steps": [
                        { "type": "prompt", "text": "?", "variable": "b" }
                    ] } }
                ]
            }"#,
        );
        let compiled = compile_dialog(&dialog, true).unwrap();
        assert_eq!(compiled.reset_variables, vec!["a", "b"]);
    }

    #[test]
    fn test_sub_dialog_step_records_nested_name() {
        let dialog = parse(
            r#"{
                "name": "root",
                "steps": [ { "group": { "name": "nested-id", "steps": [] } } ]
            }"#,
        );
        let compiled = compile_dialog(&dialog, true).unwrap();
        let StepHandler::SubDialog(sub) = &compiled.steps[0].handler else {
            panic!("expected sub-dialog");
        };
        assert_eq!(sub.dialog, "nested-id");
    }

    #[test]
    fn test_prompt_without_variable_is_rejected() {
        let dialog = parse(
            r#"{ "name": "d", "steps": [ { "type": "prompt", "text": "?" } ] }"#,
        );
        assert!(matches!(
            compile_dialog(&dialog, true),
            Err(CompileError::MissingVariable { step: 0, .. })
        ));
    }

    #[test]
    fn test_statement_without_text_is_rejected() {
        let dialog = parse(r#"{ "name": "d", "steps": [ { "type": "statement" } ] }"#);
        assert!(matches!(
            compile_dialog(&dialog, true),
            Err(CompileError::MissingText { step: 0, .. })
        ));
    }

    #[test]
    fn test_untyped_step_is_rejected() {
        let dialog = parse(r#"{ "name": "d", "steps": [ { "text": "?" } ] }"#);
        assert!(matches!(
            compile_dialog(&dialog, true),
            Err(CompileError::UnknownStep { step: 0, .. })
        ));
    }

    #[test]
    fn test_bad_hook_expression_fails_at_compile_time() {
        let dialog = parse(
            r#"{
                "name": "d",
                "steps": [ {
                    "type": "statement",
                    "text": "ok",
                    "onInit": "this is not an expression"
                } ]
            }"#,
        );
        let err = compile_dialog(&dialog, true).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Field { field: "onInit", step: 0, .. }
        ));
    }

    #[test]
    fn test_prev_link_skipped_when_prev_has_no_data() {
        let mut dialog = DialogDef {
            name: "d".to_string(),
            steps: vec![
                StepDef {
                    step_type: Some(StepType::Statement),
                    text: Some("a".to_string()),
                    ..Default::default()
                },
                StepDef::end(),
            ],
            ..Default::default()
        };
        dialog.steps[0].first_step = true;
        let compiled = compile_dialog(&dialog, true).unwrap();
        assert!(compiled.steps[1].prev.is_none());
        assert!(compiled.steps[0].first_step);
    }

    #[test]
    fn test_card_fields_compile_as_templates() {
        let dialog = parse(
            r#"{
                "name": "d",
                "steps": [ {
                    "type": "statement",
                    "text": "see card",
                    "card": {
                        "title": "Offer for ${name}",
                        "buttonLabel": "Open",
                        "buttonUrl": "https://example.com"
                    }
                } ]
            }"#,
        );
        let compiled = compile_dialog(&dialog, true).unwrap();
        let StepHandler::Statement(statement) = &compiled.steps[0].handler else {
            panic!("expected statement");
        };
        let card = statement.card.as_ref().unwrap();
        assert!(matches!(card.title, Template::Interpolation(_)));
        assert!(matches!(card.button_url, Template::Literal(_)));
    }
}
