use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, InternalResult};

/// System-wide settings. Every field has a default so a config file only
/// needs the values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Reply sent when no intent matches and no dialog is in flight.
    #[serde(default = "default_reply")]
    pub default_reply: String,

    /// Reply sent when a turn faults; the conversation is reset with it.
    #[serde(default = "default_apology_reply")]
    pub apology_reply: String,

    /// Maximum sub-dialog nesting depth per conversation.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            default_reply: default_reply(),
            apology_reply: default_apology_reply(),
            max_depth: default_max_depth(),
        }
    }
}

impl SystemConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        let file = File::open(&path)
            .map_err(|e| Error::Internal(format!("failed to open config file: {}", e)))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Internal(format!("failed to parse config file: {}", e)))
    }

    pub fn from_str(s: &str) -> InternalResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| Error::Internal(format!("failed to parse config: {}", e)))
    }
}

fn default_event_buffer_size() -> usize {
    1000
}

fn default_reply() -> String {
    "Sorry, I did not understand that.".to_string()
}

fn default_apology_reply() -> String {
    "Sorry, something went wrong. Let's start over.".to_string()
}

fn default_max_depth() -> usize {
    16
}
