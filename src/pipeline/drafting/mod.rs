pub mod types;
pub mod schema;
pub mod extract;
pub mod sections;
pub mod apply;
pub mod uncertainty;
pub mod completeness;
pub mod prompt;
pub mod validation;
pub mod banner;
pub mod orchestrator;

pub use types::*;
pub use schema::*;
pub use extract::*;
pub use apply::*;
pub use uncertainty::*;
pub use completeness::*;
pub use prompt::*;
pub use validation::*;
pub use banner::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::pipeline::inference::InferenceError;
use crate::templates::TemplateError;

/// Failure to locate a JSON object inside generated text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("No JSON object found in model output")]
    NoJsonFound,

    #[error("JSON object starting at byte {start} is never closed")]
    Unbalanced { start: usize },
}

/// Failure to turn an extracted JSON string into an `EditSet`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditSetError {
    #[error("JSON decode error: {0}")]
    JsonDecode(String),

    #[error("Malformed edit set: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum DraftingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    EditSet(#[from] EditSetError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

impl DraftingError {
    /// Serializable tag recorded in the error-context artifact.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::Inference(_) => FailureKind::Inference,
            Self::Extraction(_) => FailureKind::JsonExtraction,
            Self::EditSet(EditSetError::JsonDecode(_)) => FailureKind::JsonExtraction,
            Self::EditSet(EditSetError::Malformed(_)) => FailureKind::MalformedEditSet,
            Self::Template(_) => FailureKind::Template,
        }
    }

    /// Short status line shown to the user. Technical detail goes to the
    /// logs and the error-context artifact.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Inference(e) => e.user_message().to_string(),
            Self::Extraction(_) | Self::EditSet(EditSetError::JsonDecode(_)) => {
                "❌ Error: El modelo no generó JSON válido. Por favor reintenta o ajusta el prompt."
                    .to_string()
            }
            Self::EditSet(EditSetError::Malformed(_)) => {
                "❌ Error: el JSON del modelo no tiene la estructura esperada. Reintenta o ajusta el prompt."
                    .to_string()
            }
            Self::Template(e) => format!("❌ Error de plantilla: {e}"),
        }
    }
}
