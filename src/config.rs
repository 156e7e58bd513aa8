use std::path::PathBuf;

use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "RadiAPP";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable prefix for every override.
pub const ENV_PREFIX: &str = "RADIAPP_";

/// Image placeholder tokens accepted by the supported vision checkpoints.
pub const IMAGE_TOKENS: &[&str] = &["<image>", "<start_of_image>", "<image_soft_token>"];

pub const DEFAULT_MODEL: &str = "medgemma";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const MIN_MAX_TOKENS: u32 = 300;
pub const MAX_MAX_TOKENS: u32 = 600;
pub const MAX_MAX_TOKENS_UNLIMITED: u32 = 2048;
pub const MAX_TIME_SECONDS: u64 = 180;
pub const MIN_REGION_LENGTH: usize = 2;
/// Ollama `keep_alive` sent with each call. Negative: never unload.
pub const DEFAULT_KEEP_ALIVE: &str = "-1m";
/// Images are shrunk to fit this box before inference.
pub const MAX_IMAGE_WIDTH: u32 = 896;
pub const MAX_IMAGE_HEIGHT: u32 = 896;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "radiapp=info"
}

/// Get the default application data directory.
/// ~/RadiAPP/ on all platforms; falls back to the working directory when no
/// home directory can be determined.
pub fn default_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(APP_NAME),
        None => {
            tracing::warn!("Cannot determine home directory, using working directory");
            PathBuf::from(APP_NAME)
        }
    }
}

/// Outcome of looking for a `.env` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(PathBuf),
    Missing,
    Invalid(String),
}

impl EnvFile {
    fn from_result(result: Result<PathBuf, dotenv::Error>) -> Self {
        match result {
            Ok(path) => Self::Loaded(path),
            Err(e) if e.not_found() => Self::Missing,
            Err(e) => Self::Invalid(e.to_string()),
        }
    }

    /// Report the outcome once a subscriber is installed.
    pub fn log(&self) {
        match self {
            Self::Loaded(path) => {
                tracing::info!(path = %path.display(), "Environment loaded from .env")
            }
            Self::Missing => tracing::debug!(".env not found, using defaults"),
            Self::Invalid(error) => {
                tracing::warn!(error = %error, "Could not load .env, using defaults")
            }
        }
    }
}

/// Load `.env` from the working directory (or a parent) into the process
/// environment. A missing file is not an error. Logs nothing, so it can run
/// before tracing is initialised and still feed `RUST_LOG`.
pub fn load_env_file() -> EnvFile {
    EnvFile::from_result(dotenv::dotenv())
}

/// Runtime configuration for report drafting.
#[derive(Debug, Clone, Serialize)]
pub struct DraftingConfig {
    /// Model name passed to the inference backend.
    pub model: String,
    pub ollama_url: String,
    /// How long the backend keeps the model loaded after a call.
    pub keep_alive: String,
    /// Placeholder token prefixed to prompts on the manual image path.
    pub image_token: String,
    pub default_max_tokens: u32,
    pub min_max_tokens: u32,
    pub max_max_tokens: u32,
    pub max_max_tokens_unlimited: u32,
    /// Wall-clock ceiling for one inference call.
    pub max_time_seconds: u64,
    pub min_region_length: usize,
    pub max_image_width: u32,
    pub max_image_height: u32,
    pub data_dir: PathBuf,
}

impl Default for DraftingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            keep_alive: DEFAULT_KEEP_ALIVE.into(),
            image_token: IMAGE_TOKENS[0].into(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            min_max_tokens: MIN_MAX_TOKENS,
            max_max_tokens: MAX_MAX_TOKENS,
            max_max_tokens_unlimited: MAX_MAX_TOKENS_UNLIMITED,
            max_time_seconds: MAX_TIME_SECONDS,
            min_region_length: MIN_REGION_LENGTH,
            max_image_width: MAX_IMAGE_WIDTH,
            max_image_height: MAX_IMAGE_HEIGHT,
            data_dir: default_data_dir(),
        }
    }
}

impl DraftingConfig {
    /// Defaults overridden by `RADIAPP_*` variables from the process
    /// environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`. Unparseable values keep the
    /// default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(model) = get("MODEL") {
            config.model = model;
        }
        if let Some(url) = get("OLLAMA_URL") {
            config.ollama_url = url.trim_end_matches('/').to_string();
        }
        if let Some(keep_alive) = get("KEEP_ALIVE") {
            config.keep_alive = keep_alive;
        }
        if let Some(token) = get("IMAGE_TOKEN") {
            if IMAGE_TOKENS.contains(&token.as_str()) {
                config.image_token = token;
            } else {
                tracing::warn!(value = %token, "Unknown image token, keeping default");
            }
        }
        parse_into(&get, "DEFAULT_MAX_TOKENS", &mut config.default_max_tokens);
        parse_into(&get, "MIN_MAX_TOKENS", &mut config.min_max_tokens);
        parse_into(&get, "MAX_MAX_TOKENS", &mut config.max_max_tokens);
        parse_into(&get, "MAX_MAX_TOKENS_UNLIMITED", &mut config.max_max_tokens_unlimited);
        parse_into(&get, "MAX_TIME_SECONDS", &mut config.max_time_seconds);
        parse_into(&get, "MIN_REGION_LENGTH", &mut config.min_region_length);
        parse_into(&get, "MAX_IMAGE_WIDTH", &mut config.max_image_width);
        parse_into(&get, "MAX_IMAGE_HEIGHT", &mut config.max_image_height);
        if let Some(dir) = get("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config
    }

    /// Upper bound on `max_new_tokens` for a request.
    pub fn token_limit(&self, unlimited: bool) -> u32 {
        if unlimited {
            self.max_max_tokens_unlimited
        } else {
            self.max_max_tokens
        }
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }

    pub fn feedback_dir(&self) -> PathBuf {
        self.data_dir.join("feedback")
    }

    pub fn good_examples_path(&self) -> PathBuf {
        self.feedback_dir().join("good_examples.json")
    }

    pub fn error_context_path(&self) -> PathBuf {
        self.data_dir.join("error_context.json")
    }
}

fn parse_into<T, G>(get: &G, name: &str, slot: &mut T)
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(name) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(
            variable = %format!("{ENV_PREFIX}{name}"),
            value = %raw,
            "Unparseable configuration value, keeping default"
        ),
    }
}
