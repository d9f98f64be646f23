//! Default values applied when the configuration document omits a field.

pub fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub fn default_max_connections() -> u32 {
    10
}

pub fn default_postgres_port() -> u16 {
    5432
}

pub fn default_max_unit_retries() -> u32 {
    3
}

pub fn default_snapshot_depth() -> usize {
    20
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}
