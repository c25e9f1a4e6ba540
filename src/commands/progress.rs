//! Spinner for long-running commands (acquisition, verification, upload).

use std::future::Future;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub(crate) fn should_use_spinner(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

/// Runs `work` while showing `message` next to a spinner on stderr.
pub(crate) async fn with_spinner<F, T>(quiet: bool, message: String, work: F) -> T
where
    F: Future<Output = T>,
{
    if !should_use_spinner(std::io::stderr().is_terminal(), quiet, is_dumb_terminal()) {
        return work.await;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = work.await;
    spinner.finish_and_clear();
    result
}
