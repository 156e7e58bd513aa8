//! Approved edit sets used as few-shot examples.
//!
//! The store is a JSON array on disk, loaded wholesale and rewritten on every
//! append. Entries are `{"label": ..., "example": {...EditSet fields}}`; older
//! flat entries `{"label": ..., "remove": [...], ...}` are folded into
//! `example` when read.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

const DEFAULT_LABEL: &str = "Ejemplo";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Good-example store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Good-example store at {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Good-example store at {0} must hold a JSON array")]
    NotAnArray(PathBuf),

    #[error("Example must be a JSON object")]
    InvalidExample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodExample {
    pub label: String,
    pub example: Value,
}

impl GoodExample {
    /// Normalise one stored entry. Non-objects yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let label = obj
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_LABEL)
            .to_string();

        if let Some(example) = obj.get("example").filter(|v| v.is_object()) {
            return Some(Self {
                label,
                example: example.clone(),
            });
        }

        let flat: Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "label")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self {
            label,
            example: Value::Object(flat),
        })
    }
}

/// The two bundled examples used until the user approves their own.
pub fn builtin_examples() -> Vec<GoodExample> {
    vec![
        GoodExample {
            label: "TC craneal con hematoma epidural agudo".into(),
            example: json!({
                "remove": ["Sin hallazgos relevantes"],
                "replace": [{"from": "Ventrículos normales", "to": "Ventrículos ligeramente comprimidos por efecto de masa"}],
                "add_findings": [
                    "Hematoma epidural derecho temporoparietal de 12 mm de espesor máximo con efecto de masa",
                    "Desviación de línea media de ~3 mm"
                ],
                "lesiometro_missing": ["Comportamiento exacto respecto a duramadre (TC sin contraste limitante)"],
                "conclusion": {
                    "positives": ["Hematoma epidural agudo derecho temporoparietal"],
                    "impression": ["Hallazgo compatible con trauma craneoencefálico"],
                    "ddx": ["Hematoma epidural (diagnóstico con criterios radiológicos)"],
                    "recommendations": [
                        "Correlacionar clínica con escala Glasgow",
                        "Considerar RM para definir mejor interfaz duramadre-hematoma"
                    ]
                }
            }),
        },
        GoodExample {
            label: "RX tórax con consolidación basal".into(),
            example: json!({
                "remove": [],
                "replace": [],
                "add_findings": ["Consolidación alveolar en base pulmonar izquierda de distribución segmentaria"],
                "lesiometro_missing": ["Comportamiento post-contraste", "Presencia de broncograma aéreo"],
                "conclusion": {
                    "positives": ["Consolidación basal izquierda"],
                    "impression": ["Patrón compatible con neumonía adquirida en la comunidad o proceso inflamatorio agudo"],
                    "ddx": ["Neumonía bacteriana", "Neumonitis viral", "Infarto pulmonar"],
                    "recommendations": ["Correlacionar con sintomatología clínica y marcadores de inflamación"]
                }
            }),
        },
    ]
}

/// File-backed good-example store.
#[derive(Debug, Clone)]
pub struct GoodExampleStore {
    path: PathBuf,
}

impl GoodExampleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All examples, normalised. Built-ins when the file does not exist.
    pub fn load(&self) -> Result<Vec<GoodExample>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(builtin_examples()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let value: Value = serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let entries = value
            .as_array()
            .ok_or_else(|| StoreError::NotAnArray(self.path.clone()))?;

        Ok(entries.iter().filter_map(GoodExample::from_value).collect())
    }

    /// Load, append the normalised entry, rewrite the whole file.
    pub fn append(&self, entry: &Value) -> Result<GoodExample, StoreError> {
        let example = GoodExample::from_value(entry).ok_or(StoreError::InvalidExample)?;
        let mut examples = self.load()?;
        examples.push(example.clone());

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&examples).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(io_err)?;

        tracing::info!(label = %example.label, total = examples.len(), "Good example saved");
        Ok(example)
    }

    /// Examples for prompting. Read errors fall back to the built-ins.
    pub fn load_or_builtin(&self) -> Vec<GoodExample> {
        self.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cannot load good examples, using built-ins");
            builtin_examples()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_builtins() {
        let tmp = tempfile::tempdir().unwrap();
        let store = GoodExampleStore::new(tmp.path().join("good_examples.json"));
        let examples = store.load().unwrap();
        assert_eq!(examples.len(), 2);
        assert!(examples[0].label.contains("hematoma epidural"));
    }

    #[test]
    fn flat_legacy_entries_are_folded() {
        let entry = json!({"label": "viejo", "remove": ["x"], "add_findings": []});
        let example = GoodExample::from_value(&entry).unwrap();
        assert_eq!(example.label, "viejo");
        assert_eq!(example.example, json!({"remove": ["x"], "add_findings": []}));
    }

    #[test]
    fn missing_label_gets_default() {
        let example = GoodExample::from_value(&json!({"example": {"remove": []}})).unwrap();
        assert_eq!(example.label, "Ejemplo");
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("good_examples.json");
        std::fs::write(&path, r#"[1, "x", {"label": "ok", "example": {}}]"#).unwrap();
        let examples = GoodExampleStore::new(&path).load().unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].label, "ok");
    }

    #[test]
    fn append_keeps_builtins_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let store = GoodExampleStore::new(tmp.path().join("feedback").join("good_examples.json"));
        store
            .append(&json!({"label": "nuevo", "add_findings": ["Quiste renal simple"]}))
            .unwrap();

        let examples = store.load().unwrap();
        assert_eq!(examples.len(), 3);
        assert_eq!(examples[2].label, "nuevo");
        assert_eq!(examples[2].example["add_findings"][0], "Quiste renal simple");
    }

    #[test]
    fn append_rejects_non_object() {
        let tmp = tempfile::tempdir().unwrap();
        let store = GoodExampleStore::new(tmp.path().join("g.json"));
        assert!(matches!(store.append(&json!([1, 2])), Err(StoreError::InvalidExample)));
    }

    #[test]
    fn corrupt_file_falls_back_for_prompting() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("g.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = GoodExampleStore::new(&path);
        assert!(store.load().is_err());
        assert_eq!(store.load_or_builtin().len(), 2);
    }
}
