use std::sync::Mutex;
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{InferenceClient, InferenceError, InferenceRequest, PromptMode, ResourceUsage};
use crate::config::{DraftingConfig, DEFAULT_KEEP_ALIVE};

/// Connect timeout; the per-call generation ceiling is set on each request.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Ollama `/api/generate` client for vision-language models.
pub struct OllamaVisionClient {
    base_url: String,
    model: String,
    /// Sent with every generate call so the model stays resident between
    /// requests.
    keep_alive: String,
    client: reqwest::blocking::Client,
    usage: Mutex<ResourceUsage>,
}

/// Request body for Ollama `/api/generate`.
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    /// Base64-encoded images.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    /// Skip the model template; the prompt already carries the image token.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    raw: bool,
    options: GenerateOptions,
    keep_alive: &'a str,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

/// Response body from Ollama `/api/generate`. Durations are nanoseconds.
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    load_duration: Option<u64>,
}

impl OllamaVisionClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, InferenceError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| InferenceError::Load(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
            client,
            usage: Mutex::new(ResourceUsage::default()),
        })
    }

    pub fn from_config(config: &DraftingConfig) -> Result<Self, InferenceError> {
        Ok(Self::new(&config.ollama_url, &config.model)?.with_keep_alive(&config.keep_alive))
    }

    /// Ollama duration string (`"30m"`, `"2h"`); negative keeps the model
    /// loaded indefinitely.
    pub fn with_keep_alive(mut self, keep_alive: &str) -> Self {
        self.keep_alive = keep_alive.to_string();
        self
    }

    fn record_usage(&self, response: &GenerateResponse) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.calls += 1;
            usage.prompt_tokens = response.prompt_eval_count;
            usage.generated_tokens = response.eval_count;
            usage.total_duration_ms = response.total_duration.map(|ns| ns / 1_000_000);
            usage.load_duration_ms = response.load_duration.map(|ns| ns / 1_000_000);
        }
    }

    fn map_send_error(&self, e: reqwest::Error, max_time: Duration) -> InferenceError {
        if e.is_connect() {
            InferenceError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            InferenceError::Timeout(max_time.as_secs())
        } else {
            InferenceError::Other(e.to_string())
        }
    }
}

/// Classify a non-success response body.
pub fn classify_backend_error(status: u16, body: &str) -> InferenceError {
    let lower = body.to_lowercase();
    if lower.contains("image token") {
        InferenceError::ImageTokenMismatch(body.to_string())
    } else if lower.contains("out of memory") {
        InferenceError::OutOfMemory(body.to_string())
    } else {
        InferenceError::Backend {
            status,
            body: body.to_string(),
        }
    }
}

impl InferenceClient for OllamaVisionClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &InferenceRequest<'_>) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let images = request
            .image
            .map(|bytes| vec![base64::engine::general_purpose::STANDARD.encode(bytes)])
            .unwrap_or_default();
        let body = GenerateRequest {
            model: &self.model,
            prompt: request.prompt,
            system: request.system,
            images,
            stream: false,
            raw: request.mode == PromptMode::ManualImagePrefix,
            options: GenerateOptions {
                num_predict: request.max_new_tokens,
                temperature: 0.0,
            },
            keep_alive: &self.keep_alive,
        };

        let response = self
            .client
            .post(&url)
            .timeout(request.max_time)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e, request.max_time))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_backend_error(status.as_u16(), &body));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| InferenceError::Other(format!("Invalid response body: {e}")))?;
        self.record_usage(&parsed);

        Ok(parsed.response)
    }

    /// Clears the per-request usage counters. The model itself stays loaded
    /// on the server for `keep_alive`.
    fn release_resources(&self) -> Result<(), InferenceError> {
        if let Ok(mut usage) = self.usage.lock() {
            *usage = ResourceUsage::default();
        }
        Ok(())
    }

    fn resource_usage(&self) -> ResourceUsage {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }
}
