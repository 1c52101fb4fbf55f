//! TranslationEngine: macro-aware command translation.
//!
//! The translation rules themselves are pure and live in
//! [`tft_core::translation`].  What this module adds is the macro registry:
//! the set of macros the host defines, fetched lazily the first time a
//! command needs translating.
//!
//! # Registry loading
//!
//! The registry is loaded by exactly one host query per engine.  The first
//! caller takes the registry lock, checks the loaded flag again, queries the
//! host and marks the registry loaded.  Callers that arrived concurrently wait
//! on the lock and find the work already done.  A failed query marks the
//! registry loaded with no macros; there is no retry for the life of the
//! engine.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tft_core::translation::{
    categorize_macros, extract_macro_names, MacroCategory, IMPORTANT_MACROS,
};
use tft_core::translate_with_macros;

use crate::application::host_api::HostApi;

#[derive(Debug, Default)]
struct MacroRegistry {
    loaded: bool,
    macros: BTreeSet<String>,
}

/// Translates touchscreen commands using the host's macro set.
pub struct TranslationEngine<H: HostApi + ?Sized> {
    host: Arc<H>,
    /// Lock-free fast path; only ever flips `false → true`, under `registry`.
    loaded: AtomicBool,
    registry: Mutex<MacroRegistry>,
}

impl<H: HostApi + ?Sized> TranslationEngine<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            loaded: AtomicBool::new(false),
            registry: Mutex::new(MacroRegistry::default()),
        }
    }

    /// Loads the macro registry if no load has happened yet.
    pub async fn ensure_macros_loaded(&self) {
        if self.loaded.load(Ordering::Acquire) {
            return;
        }

        let mut registry = self.registry.lock().await;
        if registry.loaded {
            return;
        }

        match self.host.query_config().await {
            Ok(response) => {
                registry.macros = extract_macro_names(&response);
                info!("found {} available macros", registry.macros.len());
                debug!("available macros: {:?}", registry.macros);

                let important: Vec<&str> = IMPORTANT_MACROS
                    .iter()
                    .copied()
                    .filter(|m| registry.macros.contains(*m))
                    .collect();
                if !important.is_empty() {
                    info!("important macros detected: {}", important.join(", "));
                }
            }
            Err(e) => warn!("could not check available macros: {e}"),
        }

        registry.loaded = true;
        self.loaded.store(true, Ordering::Release);
    }

    /// Translates one command, loading the registry first if needed.
    ///
    /// Returns `None` when the host has no equivalent.
    pub async fn translate(&self, command: &str) -> Option<String> {
        if command.trim().is_empty() {
            return None;
        }
        self.ensure_macros_loaded().await;

        let registry = self.registry.lock().await;
        translate_with_macros(command, &registry.macros)
    }

    /// `true` once a load has been attempted.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Snapshot of the known macro names.
    pub async fn macros(&self) -> BTreeSet<String> {
        self.registry.lock().await.macros.clone()
    }

    /// Known macros grouped for display.  Empty until the registry is loaded.
    pub async fn list_macros_by_category(&self) -> Vec<(MacroCategory, Vec<String>)> {
        let registry = self.registry.lock().await;
        categorize_macros(&registry.macros)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::application::host_api::ApiError;
    use crate::infrastructure::host::mock::MockHost;

    fn config_with_macros(names: &[&str]) -> serde_json::Value {
        let settings: serde_json::Map<String, serde_json::Value> = names
            .iter()
            .map(|n| (format!("gcode_macro {n}"), json!({})))
            .collect();
        json!({"result": {"status": {"configfile": {"settings": settings}}}})
    }

    #[tokio::test]
    async fn test_m701_uses_host_macro_when_present() {
        // Arrange
        let host = Arc::new(MockHost::new().with_config(Ok(config_with_macros(&["load_filament"]))));
        let engine = TranslationEngine::new(Arc::clone(&host));

        // Act
        let out = engine.translate("M701").await;

        // Assert
        assert_eq!(out.as_deref(), Some("LOAD_FILAMENT"));
        assert_eq!(host.config_queries(), 1);
    }

    #[tokio::test]
    async fn test_m701_falls_back_with_empty_registry() {
        let host = Arc::new(MockHost::new());
        let engine = TranslationEngine::new(host);

        assert_eq!(engine.translate("M701").await.as_deref(), Some("TFT_LOAD_FILAMENT"));
    }

    #[tokio::test]
    async fn test_failed_query_marks_registry_loaded_permanently() {
        // Arrange
        let host = Arc::new(
            MockHost::new().with_config(Err(ApiError::Unreachable("refused".into()))),
        );
        let engine = TranslationEngine::new(Arc::clone(&host));

        // Act
        let first = engine.translate("M702").await;
        let second = engine.translate("M702").await;

        // Assert
        assert_eq!(first.as_deref(), Some("TFT_UNLOAD_FILAMENT"));
        assert_eq!(second.as_deref(), Some("TFT_UNLOAD_FILAMENT"));
        assert!(engine.is_loaded());
        assert_eq!(host.config_queries(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_issue_one_query() {
        // Arrange: a slow config query widens the window for duplicate loads.
        let host = Arc::new(
            MockHost::new()
                .with_config(Ok(config_with_macros(&["PAUSE"])))
                .with_config_delay(Duration::from_millis(50)),
        );
        let engine = Arc::new(TranslationEngine::new(Arc::clone(&host)));

        // Act
        let calls = (0..8).map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.ensure_macros_loaded().await })
        });
        for handle in calls.collect::<Vec<_>>() {
            handle.await.unwrap();
        }

        // Assert
        assert_eq!(host.config_queries(), 1);
        assert!(engine.macros().await.contains("PAUSE"));
    }

    #[tokio::test]
    async fn test_empty_command_does_not_load_registry() {
        let host = Arc::new(MockHost::new());
        let engine = TranslationEngine::new(Arc::clone(&host));

        assert_eq!(engine.translate("   ").await, None);
        assert_eq!(host.config_queries(), 0);
    }

    #[tokio::test]
    async fn test_list_macros_by_category() {
        let host = Arc::new(
            MockHost::new().with_config(Ok(config_with_macros(&["CLEAN_NOZZLE", "my_start"]))),
        );
        let engine = TranslationEngine::new(host);
        engine.ensure_macros_loaded().await;

        let groups = engine.list_macros_by_category().await;

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, MacroCategory::Maintenance);
        assert_eq!(groups[1], (MacroCategory::Custom, vec!["MY_START".to_string()]));
    }
}
