//! Configuration validation.
//!
//! Validation never mutates the document; it produces a report the caller
//! can print or act on. Errors block startup, warnings do not.

use crate::{substitution, MasterConfig};

/// A non-fatal observation about the configuration.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

/// Outcome of validating a [`MasterConfig`].
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            field: field.into(),
            message: message.into(),
        });
    }
}

/// Validate a configuration document.
pub fn validate_config(config: &MasterConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.service.name.trim().is_empty() {
        report.error("service.name must not be empty");
    }

    match config.database.connection_url() {
        None => report.error(
            "database: no connection source; set MATCHBOOK_DB_URL, database.url \
             or the database.postgres section",
        ),
        Some(url) => {
            if substitution::has_unresolved_env_vars(&url) {
                report.error(format!(
                    "database: connection settings contain unresolved placeholders: {}",
                    redact_credentials(&url)
                ));
            }
        }
    }

    if config.database.max_connections == 0 {
        report.error("database.max_connections must be at least 1");
    } else if config.database.max_connections == 1 {
        report.warn(
            "database.max_connections",
            "a single connection serialises matchers and cancels across all instruments",
        );
    }

    if config.matching.max_unit_retries == 0 {
        report.error("matching.max_unit_retries must be at least 1");
    }

    if config.matching.snapshot_depth == 0 {
        report.warn("matching.snapshot_depth", "snapshots will always be empty");
    }

    if !matches!(config.logging.format.as_str(), "pretty" | "json" | "compact") {
        report.error(format!(
            "logging.format must be pretty, json or compact (got {:?})",
            config.logging.format
        ));
    }

    if config.metrics.enabled && config.metrics.port == 0 {
        report.error("metrics.port must be set when metrics are enabled");
    }

    report
}

/// Strip the userinfo portion from a connection URL before echoing it.
fn redact_credentials(url: &str) -> String {
    match url.split_once('@') {
        Some((_, rest)) => format!("...@{}", rest),
        None => url.to_string(),
    }
}
