//! # Structured Logging Module
//!
//! Environment-aware structured logging for the worker and the submission
//! surface. Human-readable output in development, JSON lines in production.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("DOCKING_LOG")
            .unwrap_or_else(|_| get_log_level(&environment).to_string());

        let console = if environment == "production" {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        };

        // A subscriber installed by the embedding application wins
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            filter = %filter,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("DOCKING_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for task operations
pub fn log_task_operation(
    operation: &str,
    task_id: Uuid,
    run_id: Option<Uuid>,
    protein_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = %task_id,
        run_id = ?run_id,
        protein_id = protein_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "TASK_OPERATION"
    );
}

/// Log structured data for run and batch operations
pub fn log_run_operation(
    operation: &str,
    run_id: Option<Uuid>,
    batch_id: Option<Uuid>,
    status: &str,
    task_count: Option<u32>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        run_id = ?run_id,
        batch_id = ?batch_id,
        status = %status,
        task_count = task_count,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "RUN_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_double_initialization_is_harmless() {
        init_structured_logging();
        init_structured_logging();
        log_error("logging", "test", "boom", None);
    }
}
