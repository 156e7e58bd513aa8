//! Inference boundary: the one blocking call in report drafting.
//!
//! The drafting core only needs "prompt + image → decoded text within a token
//! and time budget", plus a distinct error for image-token count mismatches so
//! the orchestrator can retry through the manual-prefix path.

pub mod mock;
pub mod ollama;
pub mod session;

pub use mock::*;
pub use ollama::*;
pub use session::*;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Image token count mismatch: {0}")]
    ImageTokenMismatch(String),

    #[error("Out of memory during generation: {0}")]
    OutOfMemory(String),

    #[error("Generation exceeded {0}s")]
    Timeout(u64),

    #[error("Inference backend not reachable at {0}")]
    Connection(String),

    #[error("Inference backend error ({status}): {body}")]
    Backend { status: u16, body: String },

    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Inference error: {0}")]
    Other(String),
}

impl InferenceError {
    /// Short user-facing message for the status line.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::OutOfMemory(_) => {
                "❌ Error: memoria insuficiente. Reduce max_new_tokens o la resolución de la imagen."
            }
            Self::Timeout(_) => "❌ Error: la generación superó el tiempo máximo.",
            Self::Connection(_) => "❌ Error: el servicio de inferencia no está disponible.",
            Self::ImageTokenMismatch(_) => {
                "❌ Error: el modelo no recibió correctamente la imagen (tokens de imagen)."
            }
            Self::Load(_) => "❌ Error: no se pudo cargar el modelo.",
            Self::Backend { .. } | Self::Other(_) => "❌ Error inesperado durante la generación.",
        }
    }
}

/// How the image reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// The backend's chat template places the image tokens.
    Native,
    /// The prompt already starts with the image token; the backend must not
    /// template it again.
    ManualImagePrefix,
}

/// One inference call.
#[derive(Debug, Clone)]
pub struct InferenceRequest<'a> {
    pub prompt: &'a str,
    pub system: &'a str,
    /// Encoded image bytes (PNG/JPEG/TIFF).
    pub image: Option<&'a [u8]>,
    pub max_new_tokens: u32,
    /// Wall-clock ceiling for the call.
    pub max_time: Duration,
    pub mode: PromptMode,
}

/// Counters reported by the backend for the last call. Fields the backend
/// does not report stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub calls: u64,
    pub prompt_tokens: Option<u64>,
    pub generated_tokens: Option<u64>,
    pub total_duration_ms: Option<u64>,
    pub load_duration_ms: Option<u64>,
}

/// A loaded vision-language model.
pub trait InferenceClient: Send {
    fn model_name(&self) -> &str;

    /// Decoded text for `request`, bounded by its token and time budget.
    fn generate(&self, request: &InferenceRequest<'_>) -> Result<String, InferenceError>;

    /// Free per-request caches and buffers. Called after every attempt; the
    /// model itself stays loaded.
    fn release_resources(&self) -> Result<(), InferenceError> {
        Ok(())
    }

    fn resource_usage(&self) -> ResourceUsage {
        ResourceUsage::default()
    }
}
