//! Log subscriber installation.
//!
//! The library itself only emits `tracing` events; binaries and tests call
//! [`init_tracing`] to see them.

use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting JSON output.
pub const JSON_ENV: &str = "LIFESPAN_LOG_JSON";

static INIT: Once = Once::new();

/// Subscriber settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit one JSON object per event.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Reads the settings from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let json = std::env::var(JSON_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            json,
            ..Self::default()
        }
    }

    /// Sets the fallback filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enables or disables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Installs the global subscriber using [`LogConfig::from_env`].
///
/// Environment variables:
/// - `RUST_LOG`: filter directives (default: info)
/// - `LIFESPAN_LOG_JSON`: JSON output when `1` or `true`
pub fn init_tracing() {
    init_tracing_with(&LogConfig::from_env());
}

/// Installs the global subscriber once per process.
///
/// Returns false when this call did not install it, either because an
/// earlier call did or because another subscriber was already set.
pub fn init_tracing_with(config: &LogConfig) -> bool {
    let mut installed = false;
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
        let registry = tracing_subscriber::registry().with(filter);
        let result = if config.json {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_target(true))
                .try_init()
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_target(true).compact())
                .try_init()
        };
        installed = result.is_ok();
        if installed {
            tracing::debug!(json = config.json, "tracing initialized");
        }
    });
    installed
}
