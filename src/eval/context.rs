//! Per-conversation variable store.

use dashmap::DashMap;
use tracing::debug;

use super::expression::Value;

/// The conversation-scoped variable store: a flat mapping from name to the
/// last captured response (or script-assigned value). Keys are global to
/// the conversation, not scoped per dialog — two dialogs using the same
/// variable name alias the same slot.
///
/// All mutable turn data lives here; compiled dialog definitions stay
/// read-only after registration, so conversations never share mutable
/// state.
#[derive(Debug, Default)]
pub struct ConversationState {
    variables: DashMap<String, Value>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a variable up, resolving unknown names to the absent value.
    pub fn get(&self, name: &str) -> Value {
        self.variables
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or(Value::Null)
    }

    pub fn set(&self, name: &str, value: Value) {
        debug!("state set {} = {:?}", name, value);
        self.variables.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Removes the given variables; used by the first-step reset when a
    /// root dialog is entered.
    pub fn clear(&self, names: &[String]) {
        for name in names {
            self.variables.remove(name);
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_variable_is_null() {
        let state = ConversationState::new();
        assert_eq!(state.get("missing"), Value::Null);
    }

    #[test]
    fn test_set_and_get() {
        let state = ConversationState::new();
        state.set("name", Value::String("Sam".to_string()));
        assert_eq!(state.get("name"), Value::String("Sam".to_string()));
    }

    #[test]
    fn test_clear_removes_only_listed_names() {
        let state = ConversationState::new();
        state.set("a", Value::Integer(1));
        state.set("b", Value::Integer(2));
        state.clear(&["a".to_string()]);
        assert_eq!(state.get("a"), Value::Null);
        assert_eq!(state.get("b"), Value::Integer(2));
    }
}
