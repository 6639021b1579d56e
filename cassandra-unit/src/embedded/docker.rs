//! Cassandra in a Docker container
//!
//! The container is reused when it is already running, restarted when it
//! exists but is stopped, and created otherwise. Readiness is polled with
//! `SELECT now() FROM system.local` through cqlsh.

use std::net::IpAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::driver::cqlsh::docker;
use crate::driver::{quote_identifier, CqlLegacyClient, CqlSession, CqlshSession, DriverError, LegacyClient};
use crate::embedded::{CassandraServer, ServerConfig};
use crate::error::{Error, Result};
use crate::model::ClusterDescriptor;

/// Port cqlsh and clients use inside the container
const CONTAINER_NATIVE_PORT: u16 = 9042;
const CONTAINER_CONFIGURATION: &str = "/etc/cassandra/cassandra.yaml";
const READINESS_QUERY: &str = "SELECT now() FROM system.local";

/// Docker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    pub container_name: String,
    pub image: String,
    /// Host port published for the native protocol
    pub native_port: u16,
    pub health_check_interval_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            container_name: "cassandra-unit".to_string(),
            image: "cassandra:4.1".to_string(),
            native_port: 9142,
            health_check_interval_seconds: 2,
            request_timeout_seconds: 30,
        }
    }
}

impl DockerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.container_name.trim().is_empty() {
            return Err(Error::configuration("docker container name must not be empty"));
        }
        if self.image.trim().is_empty() {
            return Err(Error::configuration("docker image must not be empty"));
        }
        if self.native_port == 0 {
            return Err(Error::configuration("docker native port must be > 0"));
        }
        if self.health_check_interval_seconds == 0 || self.request_timeout_seconds == 0 {
            return Err(Error::configuration("docker intervals and timeouts must be greater than 0"));
        }
        Ok(())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// What `docker inspect` says about the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    Missing,
}

/// Interpret `docker inspect -f {{.State.Running}}`
pub fn parse_container_state(success: bool, stdout: &str, stderr: &str) -> ContainerState {
    if !success {
        if !stderr.to_ascii_lowercase().contains("no such") {
            log::debug!("docker inspect failed: {}", stderr.trim());
        }
        return ContainerState::Missing;
    }
    match stdout.trim() {
        "true" => ContainerState::Running,
        _ => ContainerState::Stopped,
    }
}

/// [`CassandraServer`] backed by a Cassandra Docker container
#[derive(Debug, Clone, Default)]
pub struct DockerCassandra {
    settings: DockerSettings,
}

impl DockerCassandra {
    pub fn new(settings: DockerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DockerSettings {
        &self.settings
    }

    /// `docker run` arguments creating the container
    pub fn run_args(&self, config: &ServerConfig) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.settings.container_name.clone(),
            "-p".to_string(),
            format!("{}:{}", self.settings.native_port, CONTAINER_NATIVE_PORT),
        ];
        if let Some(configuration) = mounted_configuration(&config.configuration_file) {
            args.push("-v".to_string());
            args.push(format!("{}:{}:ro", configuration, CONTAINER_CONFIGURATION));
        }
        args.push(self.settings.image.clone());
        args
    }

    fn session(&self) -> CqlshSession {
        CqlshSession::new(self.settings.container_name.clone(), self.settings.request_timeout())
    }

    async fn run_docker(&self, args: Vec<String>) -> Result<String> {
        let output = docker(&args, self.settings.request_timeout()).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Load(DriverError::connection(format!(
                "docker {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                stderr.trim()
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub async fn container_state(&self) -> Result<ContainerState> {
        let args = vec![
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            self.settings.container_name.clone(),
        ];
        let output = docker(&args, self.settings.request_timeout()).await?;
        Ok(parse_container_state(
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        ))
    }

    /// Sessions go through the container, so only its published local port is served
    pub fn check_reachable(&self, cluster: &ClusterDescriptor) -> Result<()> {
        if !is_local_host(&cluster.host) {
            return Err(Error::Load(DriverError::connection(format!(
                "All host(s) tried for query failed: {} is not served by container {}",
                cluster.address(),
                self.settings.container_name
            ))));
        }
        if cluster.port != self.settings.native_port {
            return Err(Error::Load(DriverError::connection(format!(
                "All host(s) tried for query failed: {} (container {} listens on port {})",
                cluster.address(),
                self.settings.container_name,
                self.settings.native_port
            ))));
        }
        Ok(())
    }

    /// Poll the readiness query until it succeeds or `timeout` elapses
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let session = self.session();
        let start = Instant::now();
        loop {
            match session.execute(READINESS_QUERY).await {
                Ok(()) => {
                    log::info!(
                        "Cassandra container {} is ready ({:?})",
                        self.settings.container_name,
                        start.elapsed()
                    );
                    return Ok(());
                }
                Err(e) if start.elapsed() < timeout => {
                    log::debug!("Cassandra not ready yet: {}", e);
                    tokio::time::sleep(self.settings.health_check_interval()).await;
                }
                Err(e) => {
                    return Err(Error::Load(DriverError::Timeout(format!(
                        "Cassandra container {} did not become ready within {:?}: {}",
                        self.settings.container_name, timeout, e
                    ))))
                }
            }
        }
    }
}

fn is_local_host(host: &str) -> bool {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback() || ip.is_unspecified())
            .unwrap_or(false)
}

/// Absolute path of the configuration file, when it exists
fn mounted_configuration(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    std::fs::canonicalize(path)
        .ok()
        .map(|absolute| absolute.display().to_string())
}

#[async_trait]
impl CassandraServer for DockerCassandra {
    async fn start(&self, config: &ServerConfig) -> Result<()> {
        self.settings.validate()?;
        let name = self.settings.container_name.clone();
        match self.container_state().await? {
            ContainerState::Running => {
                log::info!("Reusing running Cassandra container {}", name);
            }
            ContainerState::Stopped => {
                log::info!("Restarting Cassandra container {}", name);
                self.run_docker(vec!["start".to_string(), name]).await?;
            }
            ContainerState::Missing => {
                if mounted_configuration(&config.configuration_file).is_none() {
                    log::warn!(
                        "Configuration {} not found, starting {} with the image defaults",
                        config.configuration_file.display(),
                        self.settings.image
                    );
                }
                log::info!("Creating Cassandra container {} from {}", name, self.settings.image);
                self.run_docker(self.run_args(config)).await?;
            }
        }
        self.wait_until_ready(config.startup_timeout()).await
    }

    async fn clean(&self) -> Result<()> {
        let session = self.session();
        let keyspaces = session
            .query("SELECT keyspace_name FROM system_schema.keyspaces")
            .await?;
        for keyspace in keyspaces.into_iter().filter_map(|row| row.into_iter().next()) {
            if keyspace.starts_with("system") {
                continue;
            }
            log::debug!("Dropping keyspace {}", keyspace);
            session
                .execute(&format!("DROP KEYSPACE IF EXISTS {}", quote_identifier(&keyspace)))
                .await?;
        }
        Ok(())
    }

    async fn cql_session(&self, cluster: &ClusterDescriptor) -> Result<Box<dyn CqlSession>> {
        self.check_reachable(cluster)?;
        log::debug!(
            "Opening cqlsh session on {} for cluster {} ({})",
            self.settings.container_name,
            cluster.name,
            cluster.address()
        );
        Ok(Box::new(self.session()))
    }

    async fn legacy_client(&self, cluster: &ClusterDescriptor) -> Result<Box<dyn LegacyClient>> {
        self.check_reachable(cluster)?;
        log::debug!(
            "Opening legacy client on {} for cluster {} ({})",
            self.settings.container_name,
            cluster.name,
            cluster.address()
        );
        Ok(Box::new(CqlLegacyClient::new(self.session())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_container_state() {
        assert_eq!(parse_container_state(true, "true\n", ""), ContainerState::Running);
        assert_eq!(parse_container_state(true, "false\n", ""), ContainerState::Stopped);
        assert_eq!(
            parse_container_state(false, "", "Error: No such object: cassandra-unit"),
            ContainerState::Missing
        );
    }

    #[test]
    fn test_run_args_without_configuration() {
        let docker = DockerCassandra::default();
        let config = ServerConfig::with_configuration("does-not-exist.yaml");
        assert_eq!(
            docker.run_args(&config),
            vec!["run", "-d", "--name", "cassandra-unit", "-p", "9142:9042", "cassandra:4.1"]
        );
    }

    #[test]
    fn test_run_args_mount_existing_configuration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cu-cassandra.yaml");
        std::fs::write(&path, "cluster_name: 'Test Cluster'\n").unwrap();

        let docker = DockerCassandra::new(DockerSettings {
            native_port: 19042,
            ..DockerSettings::default()
        });
        let args = docker.run_args(&ServerConfig::with_configuration(&path));
        assert!(args.contains(&"19042:9042".to_string()));
        let mount = args.iter().position(|a| a == "-v").map(|i| &args[i + 1]).unwrap();
        assert!(mount.ends_with("cu-cassandra.yaml:/etc/cassandra/cassandra.yaml:ro"));
        assert_eq!(args.last().unwrap(), "cassandra:4.1");
    }

    fn cluster(host: &str, port: u16) -> ClusterDescriptor {
        ClusterDescriptor::new("Test Cluster", host, port).unwrap()
    }

    #[test]
    fn test_only_the_published_local_port_is_reachable() {
        let docker = DockerCassandra::default();
        assert!(docker.check_reachable(&cluster("127.0.0.1", 9142)).is_ok());
        assert!(docker.check_reachable(&cluster("localhost", 9142)).is_ok());
        assert!(docker.check_reachable(&cluster("::1", 9142)).is_ok());

        for unreachable in [cluster("127.0.0.1", 19142), cluster("10.1.2.3", 9142), cluster("db.example.com", 9142)] {
            match docker.check_reachable(&unreachable) {
                Err(Error::Load(DriverError::Connection(_))) => {}
                other => panic!("expected a connection error for {}, got {:?}", unreachable.address(), other),
            }
        }
    }

    #[tokio::test]
    async fn test_sessions_refuse_a_mismatched_port() {
        let docker = DockerCassandra::default();
        let target = cluster("127.0.0.1", 19142);
        assert!(matches!(docker.cql_session(&target).await, Err(Error::Load(_))));
        assert!(matches!(docker.legacy_client(&target).await, Err(Error::Load(_))));
    }

    #[test]
    fn test_settings_validation() {
        assert!(DockerSettings::default().validate().is_ok());
        let settings = DockerSettings {
            native_port: 0,
            ..DockerSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Configuration(_))));
    }
}
