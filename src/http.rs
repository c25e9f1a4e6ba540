//! Shared HTTP client construction for the catalog, tracker and torrent-client
//! integrations.
//!
//! Every outbound client gets the same timeouts, user-agent and compression
//! settings. Cookie storage is opt-in since only the torrent-client session
//! depends on it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 60;

/// User-Agent sent on every request.
#[must_use]
pub fn user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("catalog-relay/{version}")
}

/// Builds an HTTP client using the shared policy.
///
/// `component` is only used for logging.
///
/// # Errors
///
/// Returns the underlying [`reqwest::Error`] when client construction fails.
pub fn build_http_client(component: &str, cookie_store: bool) -> Result<Client, reqwest::Error> {
    match try_build(cookie_store, false) {
        Ok(result) => result,
        Err(()) => {
            // Some sandboxed environments panic while querying system proxy
            // settings; fall back to environment proxies only.
            warn!(
                component,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build(cookie_store, true) {
                Ok(result) => result,
                Err(()) => base_builder(cookie_store).no_proxy().build(),
            }
        }
    }
}

fn try_build(
    cookie_store: bool,
    disable_system_proxy_lookup: bool,
) -> Result<Result<Client, reqwest::Error>, ()> {
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(cookie_store);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build()
    }))
    .map_err(|_| ())
}

fn base_builder(cookie_store: bool) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .user_agent(user_agent())
        .gzip(true)
        .cookie_store(cookie_store)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = find_first_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = find_first_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn find_first_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
