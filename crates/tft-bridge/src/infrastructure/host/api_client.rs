//! ApiClient: the HTTP implementation of [`HostApi`].
//!
//! Every request passes through the same path:
//!
//! ```text
//! RateLimiter::acquire ─▶ attempt 1 ─▶ attempt 2 ─▶ … ─▶ attempt max_retries
//!                             │  transient failure: sleep retry_delay * 2^n
//!                             └─ non-transient failure: surfaced immediately
//! ```
//!
//! The client also owns the push-channel [`ConnectionSupervisor`] and its
//! background task; [`ApiClient::start`] launches it and [`ApiClient::stop`]
//! cancels and joins it.
//!
//! # Connection pool
//!
//! The pooled `reqwest::Client` is created lazily behind an async mutex, so
//! concurrent requests that find no client build exactly one.  `stop`
//! releases it; a request issued afterwards builds a fresh one.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tft_core::backoff::retry_delay;
use tft_core::security::{sanitize_command, validate_filename};
use tft_core::BridgeConfig;

use crate::application::{ApiError, HostApi, TestModeRecorder};
use crate::infrastructure::host::endpoints;
use crate::infrastructure::host::supervisor::ConnectionSupervisor;
use crate::infrastructure::rate_limiter::RateLimiter;

/// Idle pooled connections kept per host.
const POOL_IDLE_PER_HOST: usize = 5;

type SupervisorTask = (CancellationToken, JoinHandle<()>);

pub struct ApiClient {
    config: Arc<BridgeConfig>,
    base_url: String,
    http: Mutex<Option<reqwest::Client>>,
    limiter: RateLimiter,
    supervisor: Arc<ConnectionSupervisor>,
    supervisor_task: StdMutex<Option<SupervisorTask>>,
    recorder: Option<TestModeRecorder>,
}

impl ApiClient {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        let supervisor = ConnectionSupervisor::new(&config);
        Self::with_supervisor(config, supervisor)
    }

    /// Builds a client around a pre-configured supervisor.
    pub fn with_supervisor(config: Arc<BridgeConfig>, supervisor: ConnectionSupervisor) -> Self {
        if config.test_mode {
            warn!("TEST MODE ENABLED - commands will NOT be executed on the printer");
        }
        Self {
            base_url: config.base_url(),
            recorder: config.test_mode.then(TestModeRecorder::new),
            config,
            http: Mutex::new(None),
            limiter: RateLimiter::default(),
            supervisor: Arc::new(supervisor),
            supervisor_task: StdMutex::new(None),
        }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn test_recorder(&self) -> Option<&TestModeRecorder> {
        self.recorder.as_ref()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Opens the connection pool, launches the push-channel supervisor and
    /// probes the host once.  Calling `start` again while running is a no-op.
    pub async fn start(&self) {
        if let Err(e) = self.http_client().await {
            warn!("could not create HTTP client: {e}");
        }

        {
            let mut slot = self
                .supervisor_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                debug!("API client already started");
                return;
            }
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(Arc::clone(&self.supervisor).run(cancel.clone()));
            *slot = Some((cancel, handle));
        }

        match self
            .request_with_attempts(Method::GET, endpoints::PRINTER_INFO, None, 1)
            .await
        {
            Ok(_) => info!("connected to host API at {}", self.base_url),
            Err(_) if self.config.test_mode => {
                info!("test mode: host connection not required");
            }
            Err(e) => {
                warn!("initial host connection test failed: {e}");
                warn!("host URL: {}", self.base_url);
                warn!("please ensure:");
                warn!("  - Klipper and Moonraker are running");
                warn!(
                    "  - Moonraker is reachable at {}:{}",
                    self.config.host, self.config.port
                );
                warn!("  - no firewall is blocking the connection");
                warn!("bridge will continue and retry connections automatically");
            }
        }
    }

    /// Cancels and joins the supervisor, then releases the connection pool.
    pub async fn stop(&self) {
        let task = self
            .supervisor_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some((cancel, handle)) = task {
            cancel.cancel();
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!("push channel supervisor failed: {e}"),
            }
        }

        *self.http.lock().await = None;

        if let Some(recorder) = &self.recorder {
            recorder.log_stats();
        }
        debug!("API client stopped");
    }

    // ── Request path ──────────────────────────────────────────────────────────

    async fn http_client(&self) -> Result<reqwest::Client, ApiError> {
        let mut slot = self.http.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(POOL_IDLE_PER_HOST)
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        debug!("created HTTP client for {}", self.base_url);
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Sends one request with the configured retry budget.
    ///
    /// # Errors
    ///
    /// The last transient error once the budget is spent, or the first
    /// non-transient error.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        self.request_with_attempts(method, endpoint, body, self.config.max_retries)
            .await
    }

    async fn request_with_attempts(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        attempts: u32,
    ) -> Result<Value, ApiError> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, endpoint);
        let attempts = attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.execute(method.clone(), &url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    let hint = if attempt == 0 {
                        e.hint(&self.config.host, self.config.port)
                    } else {
                        None
                    };
                    match hint {
                        Some(hint) => warn!("request attempt {} failed: {e} ({hint})", attempt + 1),
                        None => warn!("request attempt {} failed: {e}", attempt + 1),
                    }

                    if attempt + 1 >= attempts {
                        return Err(e);
                    }
                    sleep(retry_delay(self.config.retry_delay, attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("{} {} failed: {e}", method, endpoint);
                    return Err(e);
                }
            }
        }
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let client = self.http_client().await?;
        let mut request = client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = host_error_message(&text).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<Value>().await.map_err(classify)
    }

    // ── Domain operations ─────────────────────────────────────────────────────

    /// Sanitizes and runs a command script on the host.
    ///
    /// In test mode the command is recorded and a synthetic success returned.
    pub async fn send_command(&self, command: &str) -> Result<Value, ApiError> {
        let sanitized = sanitize_command(command);
        if sanitized.is_empty() {
            warn!("dropping command with no valid characters: {command:?}");
            return Err(ApiError::InvalidCommand);
        }
        if sanitized != command {
            warn!("command was sanitized: '{command}' -> '{sanitized}'");
        }

        if let Some(recorder) = &self.recorder {
            recorder.record(command, Some(&sanitized));
            return Ok(json!({"result": "ok", "test_mode": true}));
        }

        let body = json!({ "script": sanitized });
        self.request(Method::POST, endpoints::GCODE_SCRIPT, Some(&body))
            .await
    }

    /// Heater, fan, toolhead and print state.  Synthetic in test mode.
    pub async fn get_status(&self) -> Result<Value, ApiError> {
        if self.recorder.is_some() {
            return Ok(json!({
                "result": {"status": {
                    "extruder": {"temperature": 25.0, "target": 0.0},
                    "heater_bed": {"temperature": 24.0, "target": 0.0}
                }},
                "test_mode": true
            }));
        }
        self.request(Method::GET, endpoints::STATUS_QUERY, None).await
    }

    pub async fn get_info(&self) -> Result<Value, ApiError> {
        self.request(Method::GET, endpoints::PRINTER_INFO, None).await
    }

    pub async fn query_config(&self) -> Result<Value, ApiError> {
        self.request(Method::GET, endpoints::CONFIG_QUERY, None).await
    }

    /// Starts a print job.  The filename must be a safe relative path.
    pub async fn start_job(&self, filename: &str) -> Result<Value, ApiError> {
        if !validate_filename(filename) {
            warn!("rejected job filename {filename:?}");
            return Err(ApiError::Security(filename.to_string()));
        }
        let body = json!({ "filename": filename });
        self.request(Method::POST, endpoints::PRINT_START, Some(&body))
            .await
    }

    pub async fn pause_job(&self) -> Result<Value, ApiError> {
        self.request(Method::POST, endpoints::PRINT_PAUSE, None).await
    }

    pub async fn resume_job(&self) -> Result<Value, ApiError> {
        self.request(Method::POST, endpoints::PRINT_RESUME, None).await
    }

    pub async fn cancel_job(&self) -> Result<Value, ApiError> {
        self.request(Method::POST, endpoints::PRINT_CANCEL, None).await
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        let task = self
            .supervisor_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((cancel, _handle)) = task {
            cancel.cancel();
        }
    }
}

#[async_trait]
impl HostApi for ApiClient {
    async fn send_command(&self, command: &str) -> Result<Value, ApiError> {
        ApiClient::send_command(self, command).await
    }

    async fn get_status(&self) -> Result<Value, ApiError> {
        ApiClient::get_status(self).await
    }

    async fn query_config(&self) -> Result<Value, ApiError> {
        ApiClient::query_config(self).await
    }

    async fn start(&self) {
        ApiClient::start(self).await
    }

    async fn stop(&self) {
        ApiClient::stop(self).await
    }

    fn note_local_command(&self, command: &str) {
        if let Some(recorder) = &self.recorder {
            recorder.record(command, None);
        }
    }
}

/// Maps a transport error onto the [`ApiError`] taxonomy.
fn classify(e: reqwest::Error) -> ApiError {
    let detail = e.to_string();
    if e.is_timeout() {
        ApiError::Timeout(detail)
    } else if e.is_connect() {
        ApiError::Unreachable(detail)
    } else if e.is_decode() {
        ApiError::Decode(detail)
    } else if e.is_request() || e.is_body() {
        ApiError::Reset(detail)
    } else {
        ApiError::Client(detail)
    }
}

/// Extracts `error.message` from a host error body.
fn host_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        other => other.get("message")?.as_str().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mode_client() -> ApiClient {
        ApiClient::new(Arc::new(BridgeConfig {
            test_mode: true,
            ..BridgeConfig::default()
        }))
    }

    #[test]
    fn test_host_error_message_from_object() {
        let body = r#"{"error": {"code": 400, "message": "Unknown command:\"FOO\""}}"#;
        assert_eq!(host_error_message(body).as_deref(), Some("Unknown command:\"FOO\""));
    }

    #[test]
    fn test_host_error_message_from_string_and_garbage() {
        assert_eq!(host_error_message(r#"{"error": "busy"}"#).as_deref(), Some("busy"));
        assert_eq!(host_error_message("<html>502</html>"), None);
        assert_eq!(host_error_message(r#"{"result": "ok"}"#), None);
    }

    #[tokio::test]
    async fn test_send_command_rejects_empty_sanitized_text() {
        let client = test_mode_client();

        let err = client.send_command("#;!").await.unwrap_err();

        assert_eq!(err, ApiError::InvalidCommand);
    }

    #[tokio::test]
    async fn test_test_mode_records_instead_of_sending() {
        // Arrange
        let client = test_mode_client();

        // Act
        let result = client.send_command("G28").await.unwrap();

        // Assert
        assert_eq!(result["test_mode"], json!(true));
        assert_eq!(client.test_recorder().unwrap().stats().commands_processed, 1);
    }

    #[tokio::test]
    async fn test_test_mode_status_is_synthetic() {
        let client = test_mode_client();

        let status = client.get_status().await.unwrap();

        assert_eq!(
            tft_core::protocol::temperature::format_temperature_report(&status),
            "ok T:25.0 /0.0 B:24.0 /0.0"
        );
    }

    #[tokio::test]
    async fn test_start_job_rejects_traversal_before_any_request() {
        let client = test_mode_client();

        let err = client.start_job("../../etc/passwd").await.unwrap_err();

        assert!(matches!(err, ApiError::Security(_)));
    }

    #[tokio::test]
    async fn test_local_commands_are_counted_in_test_mode() {
        let client = test_mode_client();

        HostApi::note_local_command(&client, "M105");

        assert_eq!(client.test_recorder().unwrap().stats().commands_processed, 1);
    }
}
