//! Compiled dialog registry.
//!
//! Maps dialog names to their compiled forms. The root dialog of a
//! scenario keeps its authored name; nested dialogs are registered under
//! the generated names normalization assigned, so every dialog in a tree
//! lands in the same flat namespace and a sub-dialog step can invoke its
//! target by name alone.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::ast::DialogDef;
use crate::compiler::{self, CompileResult, CompiledDialog, Step, StepHandler};

#[derive(Debug, Default)]
pub struct DialogRegistry {
    dialogs: DashMap<String, Arc<CompiledDialog>>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and registers a normalized dialog tree: the root under its
    /// authored name, every nested `group` under its generated name.
    /// Re-registering a name replaces the previous compiled form.
    pub fn register_tree(&self, root: &DialogDef) -> CompileResult<()> {
        self.register_dialog(root, true)
    }

    fn register_dialog(&self, def: &DialogDef, is_root: bool) -> CompileResult<()> {
        let mut compiled = compiler::compile_dialog(def, is_root)?;
        ensure_terminated(&mut compiled);
        debug!("registering dialog {:?} ({} steps)", compiled.name, compiled.steps.len());
        self.dialogs.insert(compiled.name.clone(), Arc::new(compiled));
        for step in &def.steps {
            if let Some(group) = &step.group {
                self.register_dialog(group, false)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CompiledDialog>> {
        self.dialogs.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dialogs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.dialogs.iter().map(|entry| entry.key().clone()).collect()
    }
}

// Every registered chain ends in a terminal handler. Normalization already
// guarantees this for nested dialogs; root chains are authored without one
// so the runtime still needs a defined end of the walk.
fn ensure_terminated(dialog: &mut CompiledDialog) {
    if !matches!(
        dialog.steps.last().map(|step| &step.handler),
        Some(StepHandler::End)
    ) {
        dialog.steps.push(Step {
            handler: StepHandler::End,
            visible: None,
            on_init: None,
            prev: None,
            first_step: false,
        });
    }
}
