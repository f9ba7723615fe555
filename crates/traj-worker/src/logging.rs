//! Tracing setup and structured per-key logging.

use tracing::{info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use traj_models::KeyOutcome;

use crate::variant::PipelineVariant;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_DIRECTIVE: &str = "traj=info";

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the default filter. `LOG_FORMAT=json` switches to
/// JSON lines; otherwise output is colored text.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Logger for the lifecycle of one metadata key.
#[derive(Debug, Clone)]
pub struct KeyLogger {
    key: String,
    variant: PipelineVariant,
}

impl KeyLogger {
    pub fn new(key: &str, variant: PipelineVariant) -> Self {
        Self {
            key: key.to_string(),
            variant,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            key = %self.key,
            variant = %self.variant,
            "Key started: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            key = %self.key,
            variant = %self.variant,
            "Key warning: {}", message
        );
    }

    /// Log the final outcome; errors go out at warn level.
    pub fn log_outcome(&self, outcome: &KeyOutcome) {
        match outcome {
            KeyOutcome::Exported { artifacts } => info!(
                key = %self.key,
                variant = %self.variant,
                outcome = outcome.as_str(),
                "Key exported: {}", artifacts.join(", ")
            ),
            KeyOutcome::NonUsable => info!(
                key = %self.key,
                variant = %self.variant,
                outcome = outcome.as_str(),
                "Key skipped: trajectory not usable"
            ),
            KeyOutcome::Errored { message } => warn!(
                key = %self.key,
                variant = %self.variant,
                outcome = outcome.as_str(),
                "Key errored: {}", message
            ),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    /// Create a tracing span for this key.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "key",
            key = %self.key,
            variant = %self.variant
        )
    }
}
