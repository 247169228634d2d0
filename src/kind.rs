//! Cluster-management client for the local cluster backend
//!
//! Wraps the `kind` CLI: existence checks, creation from a generated
//! config (piped on stdin), and deletion. Also owns the volume-mount spec
//! parsing that creation consumes.

use async_trait::async_trait;
use clap::ValueEnum;
use serde::Serialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{exec, Error, Result, INGRESS_CONTAINER_PORT};

/// Default name for the local cluster.
pub const DEFAULT_CLUSTER_NAME: &str = "skiff-local";

/// Local cluster backend selected for an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderName {
    /// kind (Kubernetes-in-Docker), the managed single-node backend
    Kind,
    /// A cluster managed by Docker Desktop; validated but never created
    DockerDesktop,
}

impl ProviderName {
    /// Whether a running cluster's ingress port can be read back from its
    /// control-plane container.
    pub fn supports_port_introspection(self) -> bool {
        matches!(self, ProviderName::Kind)
    }

    /// Whether skiffctl manages cluster creation and deletion for this
    /// backend.
    pub fn supports_lifecycle(self) -> bool {
        matches!(self, ProviderName::Kind)
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderName::Kind => write!(f, "kind"),
            ProviderName::DockerDesktop => write!(f, "docker-desktop"),
        }
    }
}

/// A named local cluster and the backend that manages it.
///
/// Looked up fresh on every invocation; existence is observed, never
/// cached.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Backend managing the cluster.
    pub name: ProviderName,
    /// Name of the cluster resource.
    pub cluster_name: String,
}

impl Provider {
    pub fn new(name: ProviderName, cluster_name: impl Into<String>) -> Self {
        Self {
            name,
            cluster_name: cluster_name.into(),
        }
    }

    /// Name of the node container whose published ports carry ingress
    /// traffic.
    pub fn control_plane_container(&self) -> String {
        format!("{}-control-plane", self.cluster_name)
    }
}

/// A single host path mounted into the cluster node container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
}

/// Parse raw `HOST_PATH:CONTAINER_PATH` specs into mounts, preserving
/// order one-to-one with the input.
///
/// A spec must split on ':' into exactly two parts; the first malformed
/// spec fails the whole batch and no partial list is produced. Path
/// semantics (existence, emptiness) are left to cluster creation.
pub fn parse_volume_mounts(specs: &[String]) -> Result<Vec<VolumeMount>> {
    let mut mounts = Vec::with_capacity(specs.len());
    for spec in specs {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() != 2 {
            return Err(Error::validation(format!(
                "volume {} is not a valid volume spec, must be <HOST_PATH>:<CONTAINER_PATH>",
                spec
            )));
        }
        mounts.push(VolumeMount {
            host_path: parts[0].to_string(),
            container_path: parts[1].to_string(),
        });
    }
    Ok(mounts)
}

/// Client interface for the cluster-management backend.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Whether the named cluster currently exists.
    async fn exists(&self, cancel: &CancellationToken) -> Result<bool>;

    /// Create the cluster, publishing `port` for ingress traffic and
    /// binding `mounts` into the node container.
    async fn create(
        &self,
        port: u16,
        mounts: &[VolumeMount],
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Delete the cluster.
    async fn delete(&self, cancel: &CancellationToken) -> Result<()>;
}

/// `kind` CLI backed cluster client.
#[derive(Debug, Clone)]
pub struct KindCluster {
    cluster_name: String,
}

impl KindCluster {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }
}

#[async_trait]
impl ClusterClient for KindCluster {
    async fn exists(&self, cancel: &CancellationToken) -> Result<bool> {
        let mut cmd = Command::new("kind");
        cmd.args(["get", "clusters"]);

        let output = exec::output(cmd, cancel, "kind get clusters").await?;
        if !output.status.success() {
            return Err(Error::command_failed(format!(
                "kind get clusters failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let clusters = String::from_utf8_lossy(&output.stdout);
        Ok(clusters.lines().any(|line| line.trim() == self.cluster_name))
    }

    async fn create(
        &self,
        port: u16,
        mounts: &[VolumeMount],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let config = cluster_config(port, mounts)?;
        info!("Creating kind cluster: {}", self.cluster_name);

        let mut cmd = Command::new("kind");
        cmd.args([
            "create",
            "cluster",
            "--name",
            self.cluster_name.as_str(),
            "--config",
            "-",
        ]);

        let output =
            exec::output_with_stdin(cmd, config.as_bytes(), cancel, "kind create cluster").await?;
        if !output.status.success() {
            return Err(Error::command_failed(format!(
                "kind create cluster failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    async fn delete(&self, cancel: &CancellationToken) -> Result<()> {
        let mut cmd = Command::new("kind");
        cmd.args(["delete", "cluster", "--name", self.cluster_name.as_str()]);

        let output = exec::output(cmd, cancel, "kind delete cluster").await?;
        if !output.status.success() {
            return Err(Error::command_failed(format!(
                "kind delete cluster failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfig {
    kind: &'static str,
    api_version: &'static str,
    nodes: Vec<NodeConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeConfig {
    role: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extra_mounts: Vec<VolumeMount>,
    extra_port_mappings: Vec<PortMapping>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PortMapping {
    container_port: u16,
    host_port: u16,
}

/// Render the kind config for a single control-plane node publishing the
/// ingress port and binding the extra mounts.
fn cluster_config(port: u16, mounts: &[VolumeMount]) -> Result<String> {
    let config = ClusterConfig {
        kind: "Cluster",
        api_version: "kind.x-k8s.io/v1alpha4",
        nodes: vec![NodeConfig {
            role: "control-plane",
            extra_mounts: mounts.to_vec(),
            extra_port_mappings: vec![PortMapping {
                container_port: INGRESS_CONTAINER_PORT,
                host_port: port,
            }],
        }],
    };
    Ok(serde_yaml::to_string(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_valid_specs_in_order() {
        let mounts =
            parse_volume_mounts(&specs(&["/data:/var/data", "/logs:/var/log/skiff"])).unwrap();
        assert_eq!(
            mounts,
            vec![
                VolumeMount {
                    host_path: "/data".to_string(),
                    container_path: "/var/data".to_string(),
                },
                VolumeMount {
                    host_path: "/logs".to_string(),
                    container_path: "/var/log/skiff".to_string(),
                },
            ]
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(parse_volume_mounts(&[]).unwrap().is_empty());
    }

    #[test]
    fn empty_sides_are_syntactically_accepted() {
        // Path semantics are validated by cluster creation, not the parser.
        let mounts = parse_volume_mounts(&specs(&[":"])).unwrap();
        assert_eq!(mounts[0].host_path, "");
        assert_eq!(mounts[0].container_path, "");
    }

    #[test]
    fn rejects_spec_without_separator() {
        let err = parse_volume_mounts(&specs(&["badformat"])).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("badformat"));
    }

    #[test]
    fn rejects_spec_with_extra_separator() {
        let err = parse_volume_mounts(&specs(&["/a:/b:/c"])).unwrap_err();
        assert!(err.to_string().contains("/a:/b:/c"));
    }

    #[test]
    fn first_malformed_spec_fails_the_batch() {
        let err = parse_volume_mounts(&specs(&["/host/a:/guest/a", "badformat"])).unwrap_err();
        assert!(err.to_string().contains("badformat"));
    }

    #[test]
    fn cluster_config_publishes_ingress_port() {
        let yaml = cluster_config(9000, &[]).unwrap();
        assert!(yaml.contains("kind: Cluster"));
        assert!(yaml.contains("apiVersion: kind.x-k8s.io/v1alpha4"));
        assert!(yaml.contains("role: control-plane"));
        assert!(yaml.contains("containerPort: 80"));
        assert!(yaml.contains("hostPort: 9000"));
        assert!(!yaml.contains("extraMounts"));
    }

    #[test]
    fn cluster_config_includes_extra_mounts() {
        let mounts = vec![VolumeMount {
            host_path: "/data".to_string(),
            container_path: "/var/data".to_string(),
        }];
        let yaml = cluster_config(8000, &mounts).unwrap();
        assert!(yaml.contains("extraMounts"));
        assert!(yaml.contains("hostPath: /data"));
        assert!(yaml.contains("containerPath: /var/data"));
    }

    #[test]
    fn control_plane_container_follows_cluster_name() {
        let provider = Provider::new(ProviderName::Kind, "skiff-local");
        assert_eq!(provider.control_plane_container(), "skiff-local-control-plane");
    }

    #[test]
    fn only_kind_supports_introspection_and_lifecycle() {
        assert!(ProviderName::Kind.supports_port_introspection());
        assert!(ProviderName::Kind.supports_lifecycle());
        assert!(!ProviderName::DockerDesktop.supports_port_introspection());
        assert!(!ProviderName::DockerDesktop.supports_lifecycle());
    }
}
