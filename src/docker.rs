//! Container-runtime client
//!
//! Thin client over the `docker` CLI: a daemon reachability/version probe
//! and published-port introspection for a running container. The handle is
//! constructed once per invocation by the command layer and passed to
//! whatever needs it; the first successful version query doubles as the
//! connection check.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{exec, Error, Result, INGRESS_CONTAINER_PORT};

/// Server details reported by the runtime daemon.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DockerVersion {
    /// Daemon version string (e.g. "27.1.1")
    pub version: String,
    /// Daemon architecture (e.g. "arm64")
    pub arch: String,
    /// Daemon platform
    #[serde(default)]
    pub platform: Platform,
}

/// Platform block of the daemon version report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Platform {
    /// Platform name (e.g. "Docker Engine - Community")
    pub name: String,
}

/// Client interface for the local container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Query the daemon's server version, proving it is reachable.
    async fn server_version(&self, cancel: &CancellationToken) -> Result<DockerVersion>;

    /// Host port published for `container`'s ingress port.
    async fn exposed_port(&self, container: &str, cancel: &CancellationToken) -> Result<u16>;
}

/// `docker` CLI backed runtime client.
#[derive(Debug, Default, Clone)]
pub struct DockerCli;

impl DockerCli {
    /// Create a new runtime client. No I/O happens until the first call.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn server_version(&self, cancel: &CancellationToken) -> Result<DockerVersion> {
        let mut cmd = Command::new("docker");
        cmd.args(["version", "--format", "{{json .Server}}"]);

        let output = match exec::output(cmd, cancel, "docker version").await {
            Ok(output) => output,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => return Err(Error::docker_unavailable(e.to_string())),
        };
        if !output.status.success() {
            return Err(Error::docker_unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::docker_unavailable(format!("unexpected `docker version` output: {}", e))
        })
    }

    async fn exposed_port(&self, container: &str, cancel: &CancellationToken) -> Result<u16> {
        let mut cmd = Command::new("docker");
        cmd.arg("port")
            .arg(container)
            .arg(format!("{}/tcp", INGRESS_CONTAINER_PORT));

        let output = exec::output(cmd, cancel, "docker port").await?;
        if !output.status.success() {
            return Err(Error::command_failed(format!(
                "docker port {} failed: {}",
                container,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_port_binding(&stdout).ok_or_else(|| {
            Error::command_failed(format!(
                "no published ingress port found for container '{}'",
                container
            ))
        })
    }
}

/// Parse the host port out of `docker port` output (e.g. "0.0.0.0:8000").
///
/// Dual-stack daemons print one binding per line with the same port, so the
/// first non-empty line wins.
fn parse_port_binding(output: &str) -> Option<u16> {
    let line = output.lines().find(|line| !line.trim().is_empty())?;
    line.trim().split(':').next_back()?.parse().ok()
}
