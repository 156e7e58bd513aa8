//! Report template files.
//!
//! A template is a JSON object `{"name": ..., "template_text": ...}` stored
//! under the templates directory. The drafting pipeline only reads them;
//! listing, import and the bundled default exist for the command line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the template written into an empty templates directory.
pub const DEFAULT_TEMPLATE_FILE: &str = "TC_craneo_simple.json";

pub const DEFAULT_TEMPLATE_TEXT: &str = "TOMOGRAFÍA DE CRÁNEO SIMPLE

INDICACIÓN:

TÉCNICA: En tomógrafo multidetector se adquieren cortes axiales del cráneo, se incluyen reconstrucciones multiplanares.

DOSIS DE RADIACIÓN: mSv.

HALLAZGOS:

CONCLUSIÓN:
";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Formato no soportado. Usa .txt o .json (recibido: {0})")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub template_text: String,
}

impl Template {
    pub fn new(name: impl Into<String>, template_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_text: template_text.into(),
        }
    }

    /// Read a JSON template file. Missing fields read as empty strings.
    pub fn from_json_file(path: &Path) -> Result<Self, TemplateError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| TemplateError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Sorted `.json` file names in `dir`. A missing directory lists as empty.
pub fn list_templates(dir: &Path) -> Result<Vec<String>, TemplateError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(TemplateError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.to_lowercase().ends_with(".json"))
        .collect();
    names.sort();
    Ok(names)
}

/// Write `template` as pretty JSON into `dir`, adding `.json` when missing.
/// Returns the file name used.
pub fn write_template(dir: &Path, file_name: &str, template: &Template) -> Result<String, TemplateError> {
    let file_name = if file_name.to_lowercase().ends_with(".json") {
        file_name.to_string()
    } else {
        format!("{file_name}.json")
    };
    let path = dir.join(&file_name);
    let io_err = |source| TemplateError::Io {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(io_err)?;
    let json = serde_json::to_string_pretty(template).map_err(|source| TemplateError::Json {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(io_err)?;
    Ok(file_name)
}

/// Import a template from a `.txt` (whole file, trimmed, named after the
/// file stem) or `.json` file (name defaults to the file stem).
pub fn import_template(path: &Path) -> Result<Template, TemplateError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" => {
            let bytes = std::fs::read(path).map_err(|source| TemplateError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            Ok(Template::new(stem, text))
        }
        "json" => {
            let mut template = Template::from_json_file(path)?;
            if template.name.trim().is_empty() {
                template.name = stem;
            }
            Ok(template)
        }
        other => Err(TemplateError::UnsupportedFormat(format!(".{other}"))),
    }
}

/// Write the bundled head CT template when `dir` holds no templates.
/// Returns the written file name, or `None` when templates already exist.
pub fn ensure_default_template(dir: &Path) -> Result<Option<String>, TemplateError> {
    if !list_templates(dir)?.is_empty() {
        return Ok(None);
    }
    let template = Template::new("TC_craneo_simple", DEFAULT_TEMPLATE_TEXT);
    let name = write_template(dir, DEFAULT_TEMPLATE_FILE, &template)?;
    tracing::info!(file = %name, "Default template created");
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_written_into_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let written = ensure_default_template(tmp.path()).unwrap();
        assert_eq!(written.as_deref(), Some(DEFAULT_TEMPLATE_FILE));

        let template = Template::from_json_file(&tmp.path().join(DEFAULT_TEMPLATE_FILE)).unwrap();
        assert_eq!(template.name, "TC_craneo_simple");
        assert!(template.template_text.contains("HALLAZGOS:"));
        assert!(template.template_text.contains("CONCLUSIÓN:"));
    }

    #[test]
    fn default_template_not_written_twice() {
        let tmp = tempfile::tempdir().unwrap();
        ensure_default_template(tmp.path()).unwrap();
        assert_eq!(ensure_default_template(tmp.path()).unwrap(), None);
    }

    #[test]
    fn list_is_sorted_and_json_only() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.JSON", "notes.txt"] {
            std::fs::write(tmp.path().join(name), "{}").unwrap();
        }
        assert_eq!(list_templates(tmp.path()).unwrap(), vec!["a.JSON", "b.json"]);
    }

    #[test]
    fn missing_dir_lists_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_templates(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn write_adds_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let name = write_template(tmp.path(), "RX_torax", &Template::new("RX_torax", "RX")).unwrap();
        assert_eq!(name, "RX_torax.json");
    }

    #[test]
    fn missing_fields_read_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.json");
        std::fs::write(&path, r#"{"name": "solo nombre"}"#).unwrap();
        let template = Template::from_json_file(&path).unwrap();
        assert_eq!(template.template_text, "");
    }

    #[test]
    fn invalid_json_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Template::from_json_file(&path), Err(TemplateError::Json { .. })));
    }

    #[test]
    fn import_txt_uses_stem_and_trims() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("RM_rodilla.txt");
        std::fs::write(&path, "\n RM DE RODILLA\n\nHALLAZGOS:\n\n").unwrap();
        let template = import_template(&path).unwrap();
        assert_eq!(template.name, "RM_rodilla");
        assert_eq!(template.template_text, "RM DE RODILLA\n\nHALLAZGOS:");
    }

    #[test]
    fn import_json_without_name_uses_stem() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("US_abdomen.json");
        std::fs::write(&path, r#"{"template_text": "ECOGRAFÍA"}"#).unwrap();
        let template = import_template(&path).unwrap();
        assert_eq!(template.name, "US_abdomen");
    }

    #[test]
    fn import_rejects_other_formats() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plantilla.docx");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(
            import_template(&path),
            Err(TemplateError::UnsupportedFormat(ext)) if ext == ".docx"
        ));
    }
}
