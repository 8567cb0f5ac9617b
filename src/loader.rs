//! Scenario loading: raw stored documents into a complete dialog table.
//!
//! A load cycle builds a whole [`DialogTable`] from scratch and only then
//! hands it over, so a table is either the previous complete one or the
//! next complete one, never a half-built mix.
//!
//! Author mistakes split two ways: a document that cannot even be decoded
//! or parsed is skipped and recorded in the [`LoadReport`], letting the
//! remaining scenarios load; a scenario that parses but fails compilation
//! (bad expression, bad intent regex, missing required fields) aborts the
//! cycle, because serving a table with that scenario silently missing
//! would hide the defect.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, info, warn};

use crate::ast::{DialogDef, RawScenario};
use crate::compiler::{CompileError, CompileResult};
use crate::intent::IntentDispatcher;
use crate::registry::DialogRegistry;
use crate::scenario;
use crate::store::Document;

/// One immutable generation of compiled dialogs and intent bindings.
/// Reloads build a fresh table and swap it in whole.
#[derive(Debug, Default)]
pub struct DialogTable {
    pub registry: DialogRegistry,
    pub dispatcher: IntentDispatcher,
}

/// Outcome summary of one load cycle.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Root dialog names registered, in binding order.
    pub dialogs: Vec<String>,
    pub skipped: Vec<SkippedScenario>,
}

/// A stored document that could not be decoded or parsed.
#[derive(Debug)]
pub struct SkippedScenario {
    pub name: String,
    pub reason: String,
}

/// Parses one stored document's text. A document holds either a single
/// scenario object or an array of them.
pub fn parse_document(text: &str) -> serde_json::Result<Vec<RawScenario>> {
    if text.trim_start().starts_with('[') {
        serde_json::from_str(text)
    } else {
        serde_json::from_str(text).map(|one: RawScenario| vec![one])
    }
}

/// Builds a table straight from stored documents. A document whose JSON
/// does not parse is skipped and recorded, the same handling a scenario
/// with undecodable code gets.
pub fn build_from_documents(documents: &[Document]) -> CompileResult<(DialogTable, LoadReport)> {
    let mut scenarios = Vec::new();
    let mut skipped = Vec::new();
    for document in documents {
        match parse_document(&document.text) {
            Ok(mut parsed) => scenarios.append(&mut parsed),
            Err(e) => {
                warn!("document {:?} skipped: {}", document.name, e);
                skipped.push(SkippedScenario {
                    name: document.name.clone(),
                    reason: format!("document JSON: {}", e),
                });
            }
        }
    }
    let (table, mut report) = build_table(&scenarios)?;
    skipped.extend(report.skipped);
    report.skipped = skipped;
    Ok((table, report))
}

/// Builds a complete table from raw scenarios.
pub fn build_table(scenarios: &[RawScenario]) -> CompileResult<(DialogTable, LoadReport)> {
    let mut table = DialogTable::default();
    let mut report = LoadReport::default();

    for raw in scenarios {
        if !raw.active {
            debug!("scenario {:?} is inactive, skipping", raw.name);
            continue;
        }
        let mut dialog = match parse_code(raw) {
            Ok(dialog) => dialog,
            Err(reason) => {
                warn!("scenario {:?} skipped: {}", raw.name, reason);
                report.skipped.push(SkippedScenario {
                    name: raw.name.clone(),
                    reason,
                });
                continue;
            }
        };

        if dialog.name.is_empty() {
            return Err(CompileError::MissingName);
        }
        let intent = dialog
            .intent
            .clone()
            .ok_or_else(|| CompileError::MissingIntent {
                dialog: dialog.name.clone(),
            })?;

        scenario::normalize(&mut dialog, true);
        table.registry.register_tree(&dialog)?;
        table.dispatcher.bind(&intent, &dialog.name)?;
        report.dialogs.push(dialog.name.clone());
    }

    info!(
        "load cycle complete: {} root dialogs, {} documents skipped",
        report.dialogs.len(),
        report.skipped.len()
    );
    Ok((table, report))
}

fn parse_code(raw: &RawScenario) -> Result<DialogDef, String> {
    let text = decode_code(&raw.code)?;
    serde_json::from_str(&text).map_err(|e| format!("dialog JSON: {}", e))
}

// The code field carries dialog JSON either plain or base64-encoded.
// Plain JSON always opens with `{` or `[`; anything else is decoded.
fn decode_code(code: &str) -> Result<String, String> {
    let trimmed = code.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(code.to_string());
    }
    let bytes = BASE64
        .decode(code.trim())
        .map_err(|e| format!("base64: {}", e))?;
    String::from_utf8(bytes).map_err(|e| format!("utf-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(name: &str, code: &str) -> RawScenario {
        RawScenario {
            active: true,
            name: name.to_string(),
            description: String::new(),
            code: code.to_string(),
        }
    }

    const GREET: &str = r#"{
        "name": "greeting",
        "intent": "^hi",
        "steps": [
            { "type": "prompt", "text": "What is your name?", "variable": "name" },
            { "type": "statement", "text": "Hello ${name}" }
        ]
    }"#;

    #[test]
    fn test_build_table_from_plain_code() {
        let (table, report) = build_table(&[raw("greet", GREET)]).unwrap();
        assert_eq!(report.dialogs, vec!["greeting"]);
        assert!(report.skipped.is_empty());
        assert!(table.registry.contains("greeting"));
        assert_eq!(table.dispatcher.resolve("hi there"), Some("greeting"));
    }

    #[test]
    fn test_base64_code_is_decoded() {
        let encoded = BASE64.encode(GREET);
        let (table, _) = build_table(&[raw("greet", &encoded)]).unwrap();
        assert!(table.registry.contains("greeting"));
    }

    #[test]
    fn test_inactive_scenario_is_ignored() {
        let mut scenario = raw("greet", GREET);
        scenario.active = false;
        let (table, report) = build_table(&[scenario]).unwrap();
        assert!(table.registry.is_empty());
        assert!(report.dialogs.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_unparseable_code_is_skipped_not_fatal() {
        let (table, report) =
            build_table(&[raw("broken", "{ not json"), raw("greet", GREET)]).unwrap();
        assert_eq!(report.dialogs, vec!["greeting"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "broken");
        assert!(table.registry.contains("greeting"));
    }

    #[test]
    fn test_compile_error_aborts_the_cycle() {
        let bad = raw(
            "bad",
            r#"{ "name": "bad", "intent": "x", "steps": [ { "type": "prompt", "text": "?" } ] }"#,
        );
        assert!(matches!(
            build_table(&[bad]),
            Err(CompileError::MissingVariable { .. })
        ));
    }

    #[test]
    fn test_missing_intent_aborts() {
        let no_intent = raw("n", r#"{ "name": "n", "steps": [] }"#);
        assert!(matches!(
            build_table(&[no_intent]),
            Err(CompileError::MissingIntent { .. })
        ));
    }

    #[test]
    fn test_document_array_and_single_object_both_parse() {
        let single = format!(
            r#"{{ "name": "a", "code": {} }}"#,
            serde_json::to_string(GREET).unwrap()
        );
        assert_eq!(parse_document(&single).unwrap().len(), 1);

        let array = format!("[{}, {}]", single, single);
        assert_eq!(parse_document(&array).unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_document_is_skipped_with_partial_load() {
        let good = Document {
            name: "good.json".to_string(),
            text: format!(
                r#"{{ "name": "a", "code": {} }}"#,
                serde_json::to_string(GREET).unwrap()
            ),
        };
        let bad = Document {
            name: "bad.json".to_string(),
            text: "not json at all".to_string(),
        };
        let (table, report) = build_from_documents(&[bad, good]).unwrap();
        assert_eq!(report.dialogs, vec!["greeting"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "bad.json");
        assert!(table.registry.contains("greeting"));
    }

    #[test]
    fn test_binding_order_follows_document_order() {
        let second = GREET.replace("greeting", "greeting2").replace("^hi", "hi");
        let (table, report) =
            build_table(&[raw("a", GREET), raw("b", &second)]).unwrap();
        assert_eq!(report.dialogs, vec!["greeting", "greeting2"]);
        // earlier binding wins when both match
        assert_eq!(table.dispatcher.resolve("hi"), Some("greeting"));
    }
}
