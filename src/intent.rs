//! Intent matching: free text to a root dialog name.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::compiler::{CompileError, CompileResult};

/// One intent binding: a case-insensitive pattern guarding a root dialog.
#[derive(Debug)]
pub struct IntentBinding {
    pattern: Regex,
    dialog: String,
}

/// Routes inbound text to root dialogs. Bindings are checked in
/// registration order and the first match wins, so load order is the
/// priority order.
#[derive(Debug, Default)]
pub struct IntentDispatcher {
    bindings: Vec<IntentBinding>,
}

impl IntentDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a pattern to a dialog. The pattern is an unanchored regex;
    /// an invalid one fails the load rather than silently never matching.
    pub fn bind(&mut self, pattern: &str, dialog: &str) -> CompileResult<()> {
        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| CompileError::InvalidIntent {
                pattern: pattern.to_string(),
                source,
            })?;
        debug!("bound intent {:?} -> dialog {:?}", pattern, dialog);
        self.bindings.push(IntentBinding {
            pattern: compiled,
            dialog: dialog.to_string(),
        });
        Ok(())
    }

    /// Resolves inbound text to the first matching dialog name.
    pub fn resolve(&self, text: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|binding| binding.pattern.is_match(text))
            .map(|binding| binding.dialog.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
