//! Mock host for unit and integration testing.
//!
//! `MockHost` implements [`HostApi`] entirely in memory.  Responses are
//! configured up front with the `with_*` builders; every call is counted or
//! recorded so tests can assert on what the bridge asked for.
//!
//! ```ignore
//! let host = Arc::new(MockHost::new().with_status(json!({...})));
//! let bridge = Bridge::new(config, Arc::clone(&host), opener);
//! // ... drive the bridge ...
//! assert_eq!(host.sent_commands(), vec!["G28"]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::application::{ApiError, HostApi};

pub struct MockHost {
    status: Mutex<Result<Value, ApiError>>,
    config: Result<Value, ApiError>,
    config_delay: Option<Duration>,
    send_error: Option<ApiError>,
    sent: Mutex<Vec<String>>,
    local: Mutex<Vec<String>>,
    config_queries: AtomicUsize,
    status_queries: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl MockHost {
    /// A host with no status available and no macros defined.
    pub fn new() -> Self {
        Self {
            status: Mutex::new(Err(ApiError::Unreachable("mock host has no status".into()))),
            config: Ok(json!({"result": {"status": {"configfile": {"settings": {}}}}})),
            config_delay: None,
            send_error: None,
            sent: Mutex::new(Vec::new()),
            local: Mutex::new(Vec::new()),
            config_queries: AtomicUsize::new(0),
            status_queries: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn with_status(self, status: Value) -> Self {
        *self.status.lock().unwrap() = Ok(status);
        self
    }

    pub fn with_status_error(self, error: ApiError) -> Self {
        *self.status.lock().unwrap() = Err(error);
        self
    }

    pub fn with_config(mut self, config: Result<Value, ApiError>) -> Self {
        self.config = config;
        self
    }

    /// Delays every config query, to widen race windows in tests.
    pub fn with_config_delay(mut self, delay: Duration) -> Self {
        self.config_delay = Some(delay);
        self
    }

    /// Makes every `send_command` fail with `error`.
    pub fn with_send_error(mut self, error: ApiError) -> Self {
        self.send_error = Some(error);
        self
    }

    /// Replaces the status returned from now on.
    pub fn set_status(&self, status: Value) {
        *self.status.lock().unwrap() = Ok(status);
    }

    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn local_commands(&self) -> Vec<String> {
        self.local.lock().unwrap().clone()
    }

    pub fn config_queries(&self) -> usize {
        self.config_queries.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostApi for MockHost {
    async fn send_command(&self, command: &str) -> Result<Value, ApiError> {
        self.sent.lock().unwrap().push(command.to_string());
        match &self.send_error {
            Some(e) => Err(e.clone()),
            None => Ok(json!({"result": "ok"})),
        }
    }

    async fn get_status(&self) -> Result<Value, ApiError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        self.status.lock().unwrap().clone()
    }

    async fn query_config(&self) -> Result<Value, ApiError> {
        self.config_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.config_delay {
            tokio::time::sleep(delay).await;
        }
        self.config.clone()
    }

    async fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn note_local_command(&self, command: &str) {
        self.local.lock().unwrap().push(command.to_string());
    }
}
