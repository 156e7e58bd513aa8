use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{InferenceClient, InferenceError, InferenceRequest, PromptMode, ResourceUsage};

/// Scripted client for tests and offline runs.
///
/// Returns the scripted results in order; once the script is exhausted the
/// last entry repeats. Records every prompt and mode it received.
pub struct MockInferenceClient {
    model: String,
    script: Vec<Result<String, InferenceError>>,
    calls: AtomicUsize,
    releases: Arc<AtomicUsize>,
    seen: RequestLog,
    images: ImageLog,
}

/// Shared record of `(mode, prompt)` pairs a mock client received.
pub type RequestLog = Arc<Mutex<Vec<(PromptMode, String)>>>;

/// Shared record of the image bytes attached to each call.
pub type ImageLog = Arc<Mutex<Vec<Option<Vec<u8>>>>>;

impl MockInferenceClient {
    /// Always answers `response`.
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    pub fn scripted(script: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            model: "mock-vlm".into(),
            script,
            calls: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
            images: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared counter of `release_resources` calls, readable after the
    /// client has been moved into a session.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }

    /// Handle on the request record, readable after the client has been
    /// moved into a session.
    pub fn request_log(&self) -> RequestLog {
        Arc::clone(&self.seen)
    }

    pub fn image_log(&self) -> ImageLog {
        Arc::clone(&self.images)
    }

    pub fn seen_requests(&self) -> Vec<(PromptMode, String)> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl InferenceClient for MockInferenceClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &InferenceRequest<'_>) -> Result<String, InferenceError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((request.mode, request.prompt.to_string()));
        }
        if let Ok(mut images) = self.images.lock() {
            images.push(request.image.map(<[u8]>::to_vec));
        }
        match self.script.get(idx).or_else(|| self.script.last()) {
            Some(result) => result.clone(),
            None => Err(InferenceError::Other("empty mock script".into())),
        }
    }

    fn release_resources(&self) -> Result<(), InferenceError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resource_usage(&self) -> ResourceUsage {
        ResourceUsage {
            calls: self.call_count() as u64,
            ..ResourceUsage::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn request(prompt: &str) -> InferenceRequest<'_> {
        InferenceRequest {
            prompt,
            system: "",
            image: None,
            max_new_tokens: 512,
            max_time: Duration::from_secs(1),
            mode: PromptMode::Native,
        }
    }

    #[test]
    fn script_is_played_in_order_then_repeats_last() {
        let client = MockInferenceClient::scripted(vec![
            Err(InferenceError::ImageTokenMismatch("0 vs 256".into())),
            Ok("segunda".into()),
        ]);
        assert!(client.generate(&request("a")).is_err());
        assert_eq!(client.generate(&request("b")).unwrap(), "segunda");
        assert_eq!(client.generate(&request("c")).unwrap(), "segunda");
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.resource_usage().calls, 3);
    }

    #[test]
    fn records_prompts() {
        let client = MockInferenceClient::new("ok");
        client.generate(&request("hola")).unwrap();
        assert_eq!(client.seen_requests(), vec![(PromptMode::Native, "hola".to_string())]);
    }

    #[test]
    fn empty_script_is_an_error() {
        let client = MockInferenceClient::scripted(vec![]);
        assert!(matches!(client.generate(&request("x")), Err(InferenceError::Other(_))));
    }
}
