// Request validation, run before any template read or inference call.
// Display strings are the user-facing status messages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{DraftRequest, TemplateSource};
use crate::config::DraftingConfig;

/// Accepted template file extension.
pub const TEMPLATE_EXTENSION: &str = ".json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "RX")]
    Rx,
    #[serde(rename = "TC")]
    Tc,
    #[serde(rename = "RM")]
    Rm,
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "Otro")]
    Other,
}

impl Modality {
    pub const ALL: [Modality; 5] = [Self::Rx, Self::Tc, Self::Rm, Self::Us, Self::Other];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Rx => "RX",
            Self::Tc => "TC",
            Self::Rm => "RM",
            Self::Us => "US",
            Self::Other => "Otro",
        }
    }

    fn supported_list() -> String {
        Self::ALL.iter().map(Modality::code).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Modality {
    type Err = ValidationError;

    /// Exact, case-sensitive match on the modality code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.code() == s)
            .ok_or_else(|| ValidationError::UnsupportedModality(s.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("⚠️ Sube una imagen anonimizada.")]
    MissingImage,

    #[error("❌ Modalidad inválida: {0}. Debe ser una de [{list}]", list = Modality::supported_list())]
    UnsupportedModality(String),

    #[error("❌ Región debe tener al menos {min} caracteres")]
    RegionTooShort { min: usize },

    #[error("⚠️ Selecciona una plantilla.")]
    MissingTemplate,

    #[error("❌ Archivo de plantilla debe ser .json, recibido: {0}")]
    TemplateExtension(String),

    #[error("❌ max_new_tokens debe estar entre {min} y {max}, recibido: {got}")]
    TokenBudget { min: u32, max: u32, got: u32 },

    #[error("⚠️ Plantilla vacía.")]
    EmptyTemplate,

    #[error("❌ Validación fallida: {0}")]
    ImageQuality(String),
}

/// Check the request shape. Returns the parsed modality.
///
/// Template content and image quality are checked later, once the template
/// has been read and the image decoded.
pub fn validate_request(
    request: &DraftRequest,
    config: &DraftingConfig,
) -> Result<Modality, ValidationError> {
    if !matches!(&request.image, Some(img) if !img.bytes.is_empty()) {
        return Err(ValidationError::MissingImage);
    }

    let modality: Modality = request.modality.parse()?;

    if request.region.trim().chars().count() < config.min_region_length {
        return Err(ValidationError::RegionTooShort {
            min: config.min_region_length,
        });
    }

    validate_template_source(&request.template)?;

    let max = config.token_limit(request.unlimited);
    if request.max_new_tokens < config.min_max_tokens || request.max_new_tokens > max {
        return Err(ValidationError::TokenBudget {
            min: config.min_max_tokens,
            max,
            got: request.max_new_tokens,
        });
    }

    Ok(modality)
}

fn validate_template_source(source: &TemplateSource) -> Result<(), ValidationError> {
    let TemplateSource::File(path) = source else {
        return Ok(());
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.is_empty() {
        return Err(ValidationError::MissingTemplate);
    }
    if !name.to_lowercase().ends_with(TEMPLATE_EXTENSION) {
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        return Err(ValidationError::TemplateExtension(ext));
    }
    Ok(())
}
