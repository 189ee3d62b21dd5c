//! Purpose: Structured schema for non-fatal stderr diagnostics.
//! Exports: `Notice`, `notice_json`, `notice_text`, `now_rfc3339`.
//! Role: How plugin load/update failures reach the user without aborting.
//! Invariants: Notices never write to stdout and never change the exit code.
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::plugins::{PluginError, Subject};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub plugin: Option<String>,
    pub message: String,
    pub details: Map<String, Value>,
}

impl Notice {
    pub fn new(kind: &str, cmd: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            time: now_rfc3339(),
            cmd: cmd.to_string(),
            plugin: None,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn from_plugin_error(cmd: &str, err: &PluginError) -> Self {
        let mut details = Map::new();
        details.insert("phase".to_string(), json!(err.phase.as_str()));
        details.insert("kind".to_string(), json!(format!("{:?}", err.error.kind())));
        if let Some(path) = err.error.path() {
            details.insert("path".to_string(), json!(path.display().to_string()));
        }
        let (kind, plugin) = match err.subject {
            Subject::Plugin => ("plugin", Some(err.plugin.clone())),
            Subject::Client => ("client", None),
        };
        Self {
            kind: kind.to_string(),
            time: now_rfc3339(),
            cmd: cmd.to_string(),
            plugin,
            message: err.summary(),
            details,
        }
    }
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    if let Some(plugin) = &notice.plugin {
        inner.insert("plugin".to_string(), json!(plugin));
    }
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));
    json!({ "notice": Value::Object(inner) })
}

/// Single-line rendering for interactive terminals.
pub fn notice_text(notice: &Notice) -> String {
    format!("aka {}: {}", notice.cmd, notice.message)
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
