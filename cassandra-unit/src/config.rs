//! Configuration management for cassandra-unit

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embedded::{DockerCassandra, DockerSettings, ServerConfig};
use crate::error::{Error, Result};
use crate::resource::ClasspathResources;

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "CASSANDRA_UNIT_CONFIG";

/// Files looked up in the working directory when no path is given
const DEFAULT_CONFIG_FILES: [&str; 4] = [
    "cassandra-unit.toml",
    "cassandra-unit.yaml",
    "cassandra-unit.yml",
    "cassandra-unit.json",
];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CassandraUnitConfig {
    /// How the server is started
    pub server: ServerConfig,

    /// Container used by the Docker backend
    pub docker: DockerSettings,

    /// Where dataset resources are looked up
    pub resources: ResourceSettings,
}

/// Dataset resource roots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    /// Searched in order; the first root containing a location wins
    pub roots: Vec<PathBuf>,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("tests/resources")],
        }
    }
}

impl CassandraUnitConfig {
    /// Load from `path`, or from the default files, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `CASSANDRA_UNIT_CONFIG`, if set
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Some(Path::new(&path))),
            _ => Self::load(None),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        let parse_error = |format: &str, e: &dyn std::fmt::Display| {
            Error::configuration(format!("failed to parse {} config {}: {}", format, path.display(), e))
        };

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| parse_error("TOML", &e))?,
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| parse_error("YAML", &e))?
            }
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_error("JSON", &e))?,
            _ => {
                return Err(Error::configuration(format!(
                    "unsupported config file format: {}",
                    path.display()
                )))
            }
        };
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn load_default() -> Result<Self> {
        for file in DEFAULT_CONFIG_FILES {
            let path = Path::new(file);
            if path.is_file() {
                return Self::load_from_file(path);
            }
        }
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.docker.validate()?;
        if self.resources.roots.is_empty() {
            return Err(Error::configuration("at least one resource root is required"));
        }
        Ok(())
    }

    pub fn resources(&self) -> ClasspathResources {
        ClasspathResources::new(self.resources.roots.iter().cloned())
    }

    pub fn docker_server(&self) -> DockerCassandra {
        DockerCassandra::new(self.docker.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CassandraUnitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.configuration_file, PathBuf::from("cu-cassandra.yaml"));
        assert_eq!(config.docker.native_port, 9142);
        assert_eq!(config.resources.roots, vec![PathBuf::from("tests/resources")]);
    }

    #[test]
    fn test_load_each_format() {
        let dir = TempDir::new().unwrap();
        let files = [
            ("config.toml", "[docker]\nnative_port = 19142\n"),
            ("config.yaml", "docker:\n  native_port: 19142\n"),
            ("config.json", r#"{"docker": {"native_port": 19142}}"#),
        ];
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            let config = CassandraUnitConfig::load(Some(path.as_path())).unwrap();
            assert_eq!(config.docker.native_port, 19142, "{}", name);
            // unspecified sections keep their defaults
            assert_eq!(config.docker.image, "cassandra:4.1");
            assert_eq!(config.server, ServerConfig::default());
        }
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let dir = TempDir::new().unwrap();

        let unknown = dir.path().join("config.ini");
        fs::write(&unknown, "x=1").unwrap();
        assert!(matches!(
            CassandraUnitConfig::load(Some(unknown.as_path())),
            Err(Error::Configuration(_))
        ));

        let invalid = dir.path().join("config.yaml");
        fs::write(&invalid, "server:\n  startup_timeout_seconds: 0\n").unwrap();
        assert!(matches!(
            CassandraUnitConfig::load(Some(invalid.as_path())),
            Err(Error::Configuration(_))
        ));

        let missing = dir.path().join("missing.toml");
        assert!(CassandraUnitConfig::load(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = CassandraUnitConfig::default();
        config.resources.roots.clear();
        assert!(config.validate().is_err());

        config = CassandraUnitConfig::default();
        config.docker.container_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resources_use_configured_roots() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.cql"), "SELECT 1;").unwrap();
        let config = CassandraUnitConfig {
            resources: ResourceSettings {
                roots: vec![dir.path().to_path_buf()],
            },
            ..CassandraUnitConfig::default()
        };
        assert!(config.resources().resolve("data.cql").is_some());
    }
}
