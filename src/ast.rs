//! Data model for authored scenario documents.
//!
//! A scenario is a JSON tree: a root dialog triggered by an intent pattern,
//! whose steps may nest further dialogs through `group`. Authors write the
//! tree by hand (or through an external editor); this module only mirrors
//! that JSON shape. Everything derived — generated names for nested dialogs,
//! terminal steps, the first-step marker — is added by [`crate::scenario`]
//! during normalization, never authored.

use serde::{Deserialize, Serialize};

/// One raw document as stored by the external scenario store.
///
/// `code` holds the scenario JSON itself, either plain or base64-encoded.
/// Only `active` documents are compiled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawScenario {
    #[serde(default = "default_active")]
    pub active: bool,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub code: String,
}

fn default_active() -> bool {
    true
}

/// A dialog definition: a named sequence of steps.
///
/// At the root of a document `name` and `intent` are author-supplied and
/// required. For nested dialogs (`group` subtrees) both are ignored:
/// normalization assigns a fresh generated name on every compilation pass
/// and nested dialogs are never bound to intents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

impl DialogDef {
    /// Collects every variable declared anywhere in this dialog's tree,
    /// including nested groups. Used by the compiler to build the
    /// first-step reset list.
    pub fn declared_variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        for step in &self.steps {
            if let Some(variable) = &step.variable {
                if !names.contains(variable) {
                    names.push(variable.clone());
                }
            }
            if let Some(group) = &step.group {
                group.collect_variables(names);
            }
        }
    }
}

/// One authored step. The step's shape is a closed union discriminated by
/// the presence of `group` and the `type` field; [`StepDef::kind`] performs
/// the classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDef {
    #[serde(rename = "type", default)]
    pub step_type: Option<StepType>,
    #[serde(default)]
    pub group: Option<Box<DialogDef>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "dataType", default)]
    pub data_type: Option<DataTypeDef>,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub visible: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub card: Option<CardDef>,
    #[serde(rename = "onInit", default)]
    pub on_init: Option<String>,
    #[serde(rename = "onPost", default)]
    pub on_post: Option<String>,
    /// Set by normalization on step 0 of a root dialog; triggers the
    /// variable reset when the dialog is (re-)entered.
    #[serde(skip)]
    pub first_step: bool,
}

impl StepDef {
    pub fn kind(&self) -> Option<StepKind> {
        if self.group.is_some() {
            return Some(StepKind::SubDialog);
        }
        match self.step_type {
            Some(StepType::Prompt) => Some(StepKind::Prompt),
            Some(StepType::Statement) => Some(StepKind::Statement),
            Some(StepType::EndDialog) => Some(StepKind::End),
            None => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), Some(StepKind::End))
    }

    /// The auto-appended terminal step.
    pub fn end() -> Self {
        StepDef {
            step_type: Some(StepType::EndDialog),
            ..Default::default()
        }
    }
}

/// Authored `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepType {
    Prompt,
    Statement,
    EndDialog,
}

/// Resolved step shape; a closed tagged union, not open-ended dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    SubDialog,
    Prompt,
    Statement,
    End,
}

/// A prompt's `dataType`: either an enumerated choice list (a JSON array)
/// or one of the scalar kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataTypeDef {
    Choice(Vec<String>),
    Kind(DataTypeKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataTypeKind {
    Text,
    Number,
    Boolean,
    Time,
}

/// Card attachment declaration; each field is expression-evaluated at turn
/// time, so authors can write `${...}` placeholders in any of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDef {
    pub title: String,
    #[serde(rename = "buttonLabel")]
    pub button_label: String,
    #[serde(rename = "buttonUrl")]
    pub button_url: String,
}
