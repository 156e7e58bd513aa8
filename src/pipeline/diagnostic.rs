//! Error-context artifact — written on every failed generation.
//!
//! One JSON document at `<data_dir>/error_context.json`, overwritten by the
//! latest failure:
//! ```text
//! {
//!   "timestamp": "2026-01-01T12:00:00+00:00",
//!   "request_id": "…",
//!   "error_kind": "inference",
//!   "error_message": "…",
//!   "resource_usage": { "calls": 1, … },
//!   "context": { "modality": "TC", "stage": "invoking", … }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use super::drafting::FailureKind;
use super::inference::ResourceUsage;

/// Longest sample of generated text kept in the artifact, in chars.
pub const GENERATED_SAMPLE_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    /// ISO 8601.
    pub timestamp: String,
    pub request_id: String,
    pub error_kind: FailureKind,
    pub error_message: String,
    pub resource_usage: Option<ResourceUsage>,
    /// Free-form request details (modality, template, stage, …).
    pub context: Map<String, Value>,
}

impl ErrorContext {
    pub fn new(request_id: &str, error_kind: FailureKind, error_message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: request_id.to_string(),
            error_kind,
            error_message: error_message.into(),
            resource_usage: None,
            context: Map::new(),
        }
    }

    pub fn with_usage(mut self, usage: ResourceUsage) -> Self {
        self.resource_usage = Some(usage);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.context.insert(key.to_string(), value.into());
    }
}

/// First [`GENERATED_SAMPLE_CHARS`] characters of `text`.
pub fn text_sample(text: &str) -> String {
    text.chars().take(GENERATED_SAMPLE_CHARS).collect()
}

/// Write the artifact, creating parent directories.
///
/// Never panics. Returns the written path, or `None` (with a warning) when
/// the file could not be written.
pub fn write_error_context(path: &Path, ctx: &ErrorContext) -> Option<PathBuf> {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(
                path = %parent.display(),
                error = %e,
                "Error context: failed to create directory"
            );
            return None;
        }
    }
    dump_json(path, ctx).then(|| path.to_path_buf())
}

/// Write any serde-serializable value as pretty JSON.
///
/// Logs on success (debug) and failure (warn). Never panics.
pub fn dump_json<T: Serialize>(path: &Path, value: &T) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(json) => match std::fs::write(path, json.as_bytes()) {
            Ok(()) => {
                tracing::debug!(
                    path = %path.display(),
                    size = json.len(),
                    "Diagnostic dump: JSON written"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Diagnostic dump: failed to write JSON"
                );
                false
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to serialize JSON"
            );
            false
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
