//! Shared HTTP clients, one per base URL.
//!
//! Keeping a singleton `reqwest::Client` per endpoint reuses TCP
//! connections and TLS sessions across requests instead of paying the
//! handshake cost on every dispatch iteration.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use lazy_static::lazy_static;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create the shared client for `base_url`.
pub fn get_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = HTTP_CLIENT_POOL.lock().unwrap();

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()
        .expect("Failed to build HTTP client");

    pool.insert(base_url.to_string(), client.clone());
    client
}

/// Map a `reqwest` failure onto the transport taxonomy.
pub fn classify_transport(
    provider: &str,
    err: &reqwest::Error,
) -> crate::polyllm::error::ProviderError {
    use crate::polyllm::error::{ProviderError, TransportKind};

    let kind = if err.is_timeout() {
        TransportKind::Timeout
    } else if err.is_connect() {
        TransportKind::ConnectionRefused
    } else {
        TransportKind::Io
    };

    ProviderError::Transport {
        provider: provider.to_string(),
        kind,
        message: err.to_string(),
    }
}
