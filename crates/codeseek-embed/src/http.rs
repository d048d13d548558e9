//! Shared HTTP client construction.

use std::time::Duration;

/// Build the HTTP client used for embedding requests.
///
/// 10s connect timeout, `timeout` per request, `codeseek/{version}` user-agent.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn default_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .user_agent(concat!("codeseek/", env!("CARGO_PKG_VERSION")))
        .build()
}
