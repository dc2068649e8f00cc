//! Adapter settings, read from an optional TOML file and `TSQL2_*` variables.

use crate::backend::Dialect;
use crate::types::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "tsql2bridge.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub dialect: Dialect,
    /// Overrides the dialect's type for physical time columns
    #[serde(default)]
    pub time_column_type: Option<String>,
    /// Close the backend connection when the adapter closes
    #[serde(default = "default_true")]
    pub close_connection_on_close: bool,
    /// Prepended to logical names to form physical table names
    #[serde(default)]
    pub table_prefix: String,
    #[serde(default = "default_catalog_table")]
    pub catalog_table: String,
    /// Mirror the catalog into `catalog_table` so it survives reconnects
    #[serde(default = "default_true")]
    pub persist_catalog: bool,
}

const fn default_true() -> bool {
    true
}

fn default_catalog_table() -> String {
    "tsql2_catalog".to_string()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            time_column_type: None,
            close_connection_on_close: default_true(),
            table_prefix: String::new(),
            catalog_table: default_catalog_table(),
            persist_catalog: default_true(),
        }
    }
}

impl AdapterConfig {
    /// Loads settings with priority: environment > file > defaults.
    ///
    /// An explicit `path` must exist; otherwise `./tsql2bridge.toml` is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                debug!(path = %p.display(), "loading config file");
                builder = builder.add_source(File::from(p).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                debug!(path = DEFAULT_CONFIG_FILE, "loading config file");
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
            None => {}
        }
        builder = builder.add_source(Environment::with_prefix("TSQL2").try_parsing(true));

        Ok(builder.build()?.try_deserialize()?)
    }

    /// SQL type of the physical time columns.
    #[must_use]
    pub fn time_type(&self) -> &str {
        self.time_column_type
            .as_deref()
            .unwrap_or_else(|| self.dialect.default_time_type())
    }

    /// Metadata table name, when the catalog is persisted.
    #[must_use]
    pub fn catalog_table(&self) -> Option<&str> {
        self.persist_catalog.then_some(self.catalog_table.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AdapterConfig::default();
        assert_eq!(config.time_type(), "BIGINT");
        assert_eq!(config.catalog_table(), Some("tsql2_catalog"));
        assert!(config.close_connection_on_close);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "dialect = \"oracle\"\ntable_prefix = \"tt_\"\npersist_catalog = false\nclose_connection_on_close = false"
        )
        .unwrap();

        let config = AdapterConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.dialect, Dialect::Oracle);
        assert_eq!(config.time_type(), "NUMBER(19)");
        assert_eq!(config.table_prefix, "tt_");
        assert_eq!(config.catalog_table(), None);
        assert!(!config.close_connection_on_close);
    }

    #[test]
    fn test_explicit_time_type_wins_over_dialect() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "dialect = \"mysql\"\ntime_column_type = \"DECIMAL(20)\"").unwrap();
        let config = AdapterConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.time_type(), "DECIMAL(20)");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(AdapterConfig::load(Some(&missing)).is_err());
    }
}
