use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, write},
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use crate::{db::DEFAULT_DB_FILE, error::LinkGraphError};

pub const DEFAULT_PORT: u16 = 9037;

/// Settings for the lorelink service and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub database: PathBuf,
    pub bind: SocketAddr,
    /// Maintain legacy tag edges on every sync.
    pub sync_tags: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            database: PathBuf::from(DEFAULT_DB_FILE),
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            sync_tags: true,
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_service(&self) -> Result<ServiceConfig, LinkGraphError>;
    fn set_service(&self, config: ServiceConfig) -> Result<(), LinkGraphError>;
}

/// Reads and writes the `[service]` table of a TOML file.
#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_service(&self) -> Result<ServiceConfig, LinkGraphError> {
        tracing::debug!("Attempting to read service config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(ServiceConfig::default());
        }
        let content = read_to_string(&self.path)?;
        let mut config: BTreeMap<String, ServiceConfig> = toml::from_str(&content)?;
        Ok(config.remove("service").unwrap_or_default())
    }

    fn set_service(&self, service: ServiceConfig) -> Result<(), LinkGraphError> {
        tracing::debug!("Attempting to write service config to: {:?}", &self.path);
        let mut config = BTreeMap::new();
        config.insert("service".to_string(), service);
        let toml_string = toml::to_string(&config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("lorelink.toml"));
        assert_eq!(provider.get_service().unwrap(), ServiceConfig::default());
    }

    #[test]
    fn test_partial_table_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lorelink.toml");
        std::fs::write(&path, "[service]\nsync_tags = false\n").unwrap();
        let config = TomlConfigProvider::new(path).get_service().unwrap();
        assert!(!config.sync_tags);
        assert_eq!(config.bind.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("lorelink.toml"));
        let config = ServiceConfig {
            database: dir.path().join("campaign.db"),
            bind: "0.0.0.0:8080".parse().unwrap(),
            sync_tags: false,
        };
        provider.set_service(config.clone()).unwrap();
        assert_eq!(provider.get_service().unwrap(), config);
    }

    #[test]
    fn test_bad_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lorelink.toml");
        std::fs::write(&path, "[service\n").unwrap();
        let err = TomlConfigProvider::new(path).get_service().unwrap_err();
        assert!(matches!(err, LinkGraphError::Config(_)));
    }
}
