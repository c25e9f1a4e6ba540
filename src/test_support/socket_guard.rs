//! Skip helper for tests that need a loopback socket (wiremock servers).
//!
//! Some sandboxes forbid binding sockets. Tests call
//! [`start_mock_server_or_skip`] and return early on `None`, unless
//! `CATALOG_RELAY_REQUIRE_SOCKET_TESTS` is set, in which case they fail.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

/// Environment variable that turns socket skips into failures.
pub const REQUIRE_SOCKET_TESTS_ENV: &str = "CATALOG_RELAY_REQUIRE_SOCKET_TESTS";

#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_SOCKET_TESTS_ENV)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Returns true (after logging why) when no loopback socket can be bound.
///
/// # Panics
///
/// Panics when binding fails and socket tests are required.
#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "[socket-bound-test] cannot bind localhost socket at {}:{}; wiremock-based test cannot run in this environment",
        location.file(),
        location.line()
    );
    assert!(
        !socket_tests_required(),
        "{message}. Set {REQUIRE_SOCKET_TESTS_ENV}=0 to allow local skip behavior."
    );

    eprintln!("{message}. Skipping test. Set {REQUIRE_SOCKET_TESTS_ENV}=1 to fail-fast instead.");
    true
}

/// Starts a wiremock server, or returns `None` when sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}
