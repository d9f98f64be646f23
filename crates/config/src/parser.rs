//! Loading, generating and saving configuration documents.

use crate::{
    defaults, substitution, DatabaseConfig, LoggingConfig, MasterConfig, MatchingConfig,
    MetricsConfig, PostgresConfig, ServiceConfig,
};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load a configuration file, substituting `${VAR}` placeholders from the
/// environment before parsing.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MasterConfig> {
    let path = path.as_ref();
    info!(?path, "Loading configuration");

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let substituted = substitution::substitute_env_vars(&content);
    debug!(bytes = substituted.len(), "Configuration read and substituted");

    let config: MasterConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Generate a complete configuration with development defaults.
pub fn generate_default_config() -> MasterConfig {
    MasterConfig {
        service: ServiceConfig {
            name: "matchbook".to_string(),
            version: defaults::default_version(),
        },
        database: DatabaseConfig {
            url: None,
            postgres: Some(PostgresConfig {
                host: "localhost".to_string(),
                port: defaults::default_postgres_port(),
                user: "postgres".to_string(),
                password: "${MATCHBOOK_DB_PASSWORD}".to_string(),
                database: "matchbook".to_string(),
            }),
            max_connections: defaults::default_max_connections(),
        },
        matching: MatchingConfig::default(),
        logging: LoggingConfig::default(),
        metrics: MetricsConfig::default(),
    }
}

/// Serialize a configuration document to YAML on disk.
pub fn save_config<P: AsRef<Path>>(config: &MasterConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!(?path, "Saving configuration");

    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}
