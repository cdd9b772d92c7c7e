use std::time::Instant;

use crate::config::AppConfig;
use crate::departments::Dispatcher;
use crate::engine::classifier::Classifier;
use crate::transport::HttpTransport;

/// Shared application state accessible to all handlers.
///
/// Everything here is request-independent; all per-exchange state lives in
/// the stream engine.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub classifier: Classifier,
    pub dispatcher: Dispatcher,
    started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let transport = HttpTransport::new(&config.server);
        let classifier = Classifier::new(&config.upstream);
        let dispatcher = Dispatcher::new(&config.departments);
        Self {
            config,
            transport,
            classifier,
            dispatcher,
            started_at: Instant::now(),
        }
    }

    /// Name of the first credential that resolved to an empty string.
    ///
    /// Checked once per chat request at handler entry, before any backend
    /// call is made.
    #[must_use]
    pub fn missing_credential(&self) -> Option<String> {
        if self.classifier.missing_credential() {
            return Some("upstream.api_key".to_string());
        }
        self.dispatcher
            .missing_credential()
            .map(|key| format!("departments.{}.api_key", key.as_str()))
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
