//! Single-flight inference session.
//!
//! - One `InferenceSession` per process, shared by reference.
//! - `acquire()` blocks until no other generation is running, loads the client
//!   on first use and never reloads it.
//! - The returned guard releases backend resources and clears the active
//!   generation when dropped, on success and failure alike.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use super::{InferenceClient, InferenceError, InferenceRequest, ResourceUsage};

/// Builds the client on first acquisition.
pub type ClientLoader =
    Box<dyn Fn() -> Result<Box<dyn InferenceClient>, InferenceError> + Send + Sync>;

/// Snapshot of the generation currently holding the session.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveGeneration {
    pub request_id: String,
    pub model: String,
    /// ISO 8601.
    pub started_at: String,
}

pub struct InferenceSession {
    /// Lazily loaded client; holding the lock is holding the session.
    client: Mutex<Option<Box<dyn InferenceClient>>>,
    loader: ClientLoader,
    active: Mutex<Option<ActiveGeneration>>,
    loads: AtomicUsize,
}

impl InferenceSession {
    pub fn new(loader: ClientLoader) -> Self {
        Self {
            client: Mutex::new(None),
            loader,
            active: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Session around an already-loaded client.
    pub fn with_client(client: Box<dyn InferenceClient>) -> Self {
        let session = Self::new(Box::new(|| {
            Err(InferenceError::Load("client already provided".into()))
        }));
        if let Ok(mut slot) = session.client.lock() {
            *slot = Some(client);
        }
        session
    }

    /// Block until the session is free, loading the client if needed.
    pub fn acquire(&self, request_id: &str) -> Result<SessionGuard<'_>, InferenceError> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| InferenceError::Other("inference session lock poisoned".into()))?;

        if slot.is_none() {
            tracing::info!("Loading inference client");
            let client = (self.loader)()?;
            self.loads.fetch_add(1, Ordering::SeqCst);
            tracing::info!(model = %client.model_name(), "Inference client loaded");
            *slot = Some(client);
        }

        let model = slot
            .as_deref()
            .map(|c| c.model_name().to_string())
            .unwrap_or_default();
        self.set_active(request_id, &model);

        Ok(SessionGuard {
            slot,
            session: self,
        })
    }

    /// Release backend resources outside a generation, for exits that never
    /// acquired the session. Waits for an active generation; never loads the
    /// client.
    pub fn release(&self) {
        match self.client.lock() {
            Ok(slot) => {
                if let Some(client) = slot.as_deref() {
                    release_client(client);
                }
            }
            Err(_) => tracing::warn!("inference session lock poisoned, nothing released"),
        }
    }

    /// What generation is currently running? `None` when idle.
    pub fn current_generation(&self) -> Option<ActiveGeneration> {
        self.active.lock().ok()?.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.client.try_lock().is_err()
    }

    /// How many times the loader has run.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    // ── Internal ────────────────────────────────────────────

    fn set_active(&self, request_id: &str, model: &str) {
        if let Ok(mut active) = self.active.lock() {
            *active = Some(ActiveGeneration {
                request_id: request_id.to_string(),
                model: model.to_string(),
                started_at: chrono::Utc::now().to_rfc3339(),
            });
        }
    }

    fn clear_active(&self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }
}

/// RAII exclusive access to the loaded client.
///
/// Dropping the guard calls `release_resources()` on the client, clears the
/// active generation and unlocks the session.
pub struct SessionGuard<'a> {
    slot: MutexGuard<'a, Option<Box<dyn InferenceClient>>>,
    session: &'a InferenceSession,
}

impl SessionGuard<'_> {
    pub fn generate(&self, request: &InferenceRequest<'_>) -> Result<String, InferenceError> {
        match self.slot.as_deref() {
            Some(client) => client.generate(request),
            None => Err(InferenceError::Load("inference client not loaded".into())),
        }
    }

    pub fn model_name(&self) -> String {
        self.slot
            .as_deref()
            .map(|c| c.model_name().to_string())
            .unwrap_or_default()
    }

    pub fn resource_usage(&self) -> ResourceUsage {
        self.slot
            .as_deref()
            .map(|c| c.resource_usage())
            .unwrap_or_default()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.slot.as_deref() {
            release_client(client);
        }
        self.session.clear_active();
    }
}

fn release_client(client: &dyn InferenceClient) {
    match client.release_resources() {
        Ok(()) => tracing::debug!("Inference resources released"),
        Err(e) => tracing::warn!(error = %e, "Failed to release inference resources"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::pipeline::inference::mock::MockInferenceClient;

    fn loader_counting(calls: Arc<AtomicUsize>) -> ClientLoader {
        Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockInferenceClient::new("{}")) as Box<dyn InferenceClient>)
        })
    }

    #[test]
    fn new_session_is_idle_and_unloaded() {
        let session = InferenceSession::new(loader_counting(Arc::new(AtomicUsize::new(0))));
        assert!(!session.is_busy());
        assert!(session.current_generation().is_none());
        assert_eq!(session.load_count(), 0);
    }

    #[test]
    fn client_loaded_once_across_acquisitions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let session = InferenceSession::new(loader_counting(calls.clone()));
        drop(session.acquire("a").unwrap());
        drop(session.acquire("b").unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.load_count(), 1);
    }

    #[test]
    fn load_failure_is_returned_and_retried_next_time() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let session = InferenceSession::new(Box::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(InferenceError::Load("weights missing".into()))
            } else {
                Ok(Box::new(MockInferenceClient::new("{}")) as Box<dyn InferenceClient>)
            }
        }));
        assert!(matches!(session.acquire("a"), Err(InferenceError::Load(_))));
        assert!(!session.is_busy());
        assert!(session.acquire("b").is_ok());
    }

    #[test]
    fn acquire_sets_and_drop_clears_active_generation() {
        let session = InferenceSession::with_client(Box::new(MockInferenceClient::new("{}")));
        let guard = session.acquire("req-1").unwrap();
        assert!(session.is_busy());
        let active = session.current_generation().unwrap();
        assert_eq!(active.request_id, "req-1");
        assert_eq!(active.model, "mock-vlm");
        assert!(!active.started_at.is_empty());

        drop(guard);
        assert!(!session.is_busy());
        assert!(session.current_generation().is_none());
    }

    #[test]
    fn drop_releases_client_resources() {
        let client = MockInferenceClient::new("{}");
        let releases = client.release_counter();
        let session = InferenceSession::with_client(Box::new(client));
        {
            let _guard = session.acquire("r").unwrap();
            assert_eq!(releases.load(Ordering::SeqCst), 0);
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_without_acquire_skips_loading() {
        let calls = Arc::new(AtomicUsize::new(0));
        let session = InferenceSession::new(loader_counting(calls.clone()));
        session.release();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let client = MockInferenceClient::new("{}");
        let releases = client.release_counter();
        let loaded = InferenceSession::with_client(Box::new(client));
        loaded.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!loaded.is_busy());
    }

    #[test]
    fn acquire_blocks_until_released() {
        let session = Arc::new(InferenceSession::with_client(Box::new(
            MockInferenceClient::new("{}"),
        )));
        let session2 = Arc::clone(&session);

        let handle = thread::spawn(move || {
            let _guard = session2.acquire("first").unwrap();
            thread::sleep(Duration::from_millis(50));
        });

        thread::sleep(Duration::from_millis(10));

        let start = Instant::now();
        let _guard = session.acquire("second").unwrap();
        let waited = start.elapsed();

        assert!(
            waited.as_millis() >= 20,
            "Expected to block, but only waited {}ms",
            waited.as_millis()
        );

        handle.join().unwrap();
    }
}
