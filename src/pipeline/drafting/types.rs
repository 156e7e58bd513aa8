use std::path::{Path, PathBuf};

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::templates::Template;

/// Validated edit script proposed by the model.
///
/// Only ever built through [`super::schema::parse_edit_set`] or
/// [`EditSet::fallback_skeleton`], so every list holds strings only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EditSet {
    pub remove: Vec<String>,
    pub replace: Vec<ReplaceRule>,
    pub add_findings: Vec<String>,
    pub lesiometro_missing: Vec<String>,
    pub confidence_scores: ConfidenceScores,
    pub conclusion: Conclusion,
}

impl EditSet {
    /// All-empty edit set used when neither the model nor the repair pass
    /// produced usable JSON. Renders the template unchanged.
    pub fn fallback_skeleton() -> Self {
        Self {
            conclusion: Conclusion::Structured(ConclusionBlock::default()),
            ..Self::default()
        }
    }

    /// Differential diagnoses, empty unless the conclusion is structured.
    pub fn ddx(&self) -> &[String] {
        match &self.conclusion {
            Conclusion::Structured(block) => &block.ddx,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceRule {
    pub from: String,
    pub to: String,
}

/// Closing section of the report. The model may send nothing, free text,
/// or the structured object; all three render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Conclusion {
    #[default]
    Absent,
    Text(String),
    Structured(ConclusionBlock),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConclusionBlock {
    pub positives: Vec<String>,
    pub impression: Vec<String>,
    pub ddx: Vec<String>,
    pub recommendations: Vec<String>,
    /// `None` when the model did not put the key inside the conclusion; the
    /// applier then merges the top-level list in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesiometro_missing: Option<Vec<String>>,
}

/// Finding-key → confidence, in insertion order.
///
/// Lookup is first-match in insertion order, so keys coming from the model
/// take precedence over keys added later by the uncertainty analyzer unless
/// the analyzer overwrote the same key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceScores(Vec<(String, f32)>);

impl ConfidenceScores {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or overwrite in place, keeping the original position.
    pub fn insert(&mut self, key: impl Into<String>, score: f32) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = score,
            None => self.0.push((key, score)),
        }
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    /// First score whose key occurs, case-insensitively, inside `finding`.
    pub fn lookup_for_finding(&self, finding: &str) -> Option<f32> {
        let finding = finding.to_lowercase();
        self.0
            .iter()
            .find(|(key, _)| finding.contains(&key.to_lowercase()))
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count_below(&self, threshold: f32) -> usize {
        self.0.iter().filter(|(_, v)| *v < threshold).count()
    }
}

impl Serialize for ConfidenceScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Which path produced the edit set that was finally rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditSetOrigin {
    ModelDirect,
    Repaired,
    FallbackSkeleton,
}

/// Serializable tag of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Inference,
    JsonExtraction,
    MalformedEditSet,
    Template,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "ValidationError"),
            Self::Inference => write!(f, "InferenceError"),
            Self::JsonExtraction => write!(f, "JsonExtractionError"),
            Self::MalformedEditSet => write!(f, "MalformedEditSetError"),
            Self::Template => write!(f, "TemplateError"),
        }
    }
}

/// States of one generation run. The orchestrator records every state it
/// enters, so the path taken is observable after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "kind")]
pub enum GenerationState {
    Validating,
    Prompting,
    Invoking,
    Decoding,
    Extracting,
    Applying,
    Repairing,
    Refining,
    Auditing,
    Done,
    Failed(FailureKind),
}

/// Where the template for a request comes from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// JSON template file `{"name", "template_text"}`.
    File(PathBuf),
    /// Already-loaded template (no extension check).
    Inline(Template),
}

impl TemplateSource {
    pub fn display_name(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Inline(t) => t.name.clone(),
        }
    }
}

/// Encoded image bytes (PNG/JPEG/TIFF) as uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            bytes: std::fs::read(path)?,
        })
    }
}

/// One report-drafting request.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub image: Option<ImageInput>,
    pub modality: String,
    pub region: String,
    pub indication: String,
    pub extras: String,
    pub template: TemplateSource,
    pub max_new_tokens: u32,
    /// Raises the token ceiling to the "unlimited" bound.
    pub unlimited: bool,
}
