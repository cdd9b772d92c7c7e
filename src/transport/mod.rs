use std::time::Duration;

use crate::config::ServerConfig;

/// HTTP transport for outbound calls to the upstream chatbot and the
/// department backends. One pooled client serves the whole process; both
/// call sites suspend on it, so its timeouts bound every suspension point.
pub struct HttpTransport {
    client: reqwest::Client,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_client(config: &ServerConfig) -> Result<reqwest::Client, reqwest::Error> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout))
        .build()
}

impl HttpTransport {
    /// Create a transport with pooling and timeouts from the server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let client = build_client(config).unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to build configured HTTP client, falling back to default client");
            reqwest::Client::new()
        });
        Self { client }
    }

    /// POST a JSON body with a bearer credential and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`reqwest::Error`] on connect failure or
    /// timeout; callers map it into their own taxonomy.
    pub async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(url)
            .bearer_auth(bearer)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
    }
}
