//! Dialog tree normalization ("fixup").
//!
//! Runs exactly once per load cycle on a freshly parsed tree, before the
//! step compiler sees it. Rules are order-sensitive:
//!
//! 1. a non-root dialog gets a freshly generated unique name (nested
//!    identities are compiler-internal and regenerated every pass);
//! 2. a non-root dialog whose last step is not terminal gets exactly one
//!    terminal step appended (root dialogs are never auto-terminated:
//!    they end via intent re-entry);
//! 3. step 0 of a root dialog is marked as the first step, which triggers
//!    the variable reset on entry;
//! 4. nested `group` dialogs are normalized recursively as non-root.
//!
//! The predecessor link between steps is positional: step `s` follows step
//! `s - 1` within one dialog, a simple chain with no branching and no
//! cycles, so the compiler resolves it by index rather than by reference.

use tracing::debug;
use uuid::Uuid;

use crate::ast::{DialogDef, StepDef};

/// In-place fixup of one dialog tree.
pub fn normalize(dialog: &mut DialogDef, is_root: bool) {
    if !is_root {
        dialog.name = Uuid::new_v4().to_string();
        debug!("assigned nested dialog name {}", dialog.name);
        // Guarded append: re-running on the same node never duplicates the
        // terminal, and an empty nested dialog still terminates instead of
        // hanging its caller.
        if !dialog.steps.last().is_some_and(StepDef::is_terminal) {
            dialog.steps.push(StepDef::end());
        }
    }
    if is_root {
        if let Some(first) = dialog.steps.first_mut() {
            first.first_step = true;
        }
    }
    for step in &mut dialog.steps {
        if let Some(group) = &mut step.group {
            normalize(group, false);
        }
    }
}
