// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::output::Verbosity;

/// Overrides the verbosity with a full filter, e.g. `api=debug,warn`.
const LOG_ENV: &str = "CLIENT_UPDATER_LOG";

fn default_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "warn",
        Verbosity::Normal => "info",
        Verbosity::Verbose => "debug",
    }
}

fn build_filter(verbosity: Verbosity, env: Option<&str>) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbosity)))
}

/// Installs a stderr subscriber. Library `log` records are bridged into it.
///
/// A second call keeps the first subscriber.
pub fn init(verbosity: Verbosity, color: bool) {
    let filter = build_filter(verbosity, std::env::var(LOG_ENV).ok().as_deref());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(color)
                .with_target(true)
                .without_time(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_picks_default_level() {
        assert_eq!(build_filter(Verbosity::Quiet, None).to_string(), "warn");
        assert_eq!(build_filter(Verbosity::Normal, None).to_string(), "info");
        assert_eq!(build_filter(Verbosity::Verbose, None).to_string(), "debug");
    }

    #[test]
    fn environment_overrides_verbosity() {
        let filter = build_filter(Verbosity::Quiet, Some("api=debug"));
        assert_eq!(filter.to_string(), "api=debug");
    }

    #[test]
    fn invalid_environment_is_ignored() {
        let filter = build_filter(Verbosity::Normal, Some("api=loudest"));
        assert_eq!(filter.to_string(), "info");
    }
}
