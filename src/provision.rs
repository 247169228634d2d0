//! Create-or-reuse reconciliation for the local cluster
//!
//! Decides, from observed state, whether to validate an existing cluster
//! or create a new one, and resolves the ingress port to use either way.
//! Port conflicts against a running cluster are never resolved
//! destructively: the existing port wins and a warning names both values.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::docker::ContainerRuntime;
use crate::kind::{parse_volume_mounts, ClusterClient, Provider};
use crate::{Error, Result};

/// Result of reconciling the requested ingress port against a running
/// cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortResolution {
    /// Port the user asked for.
    pub requested: u16,
    /// Port the installation will actually use.
    pub effective: u16,
    /// The existing cluster is bound to a different port than requested.
    pub conflict: bool,
    /// False when the running cluster's port could not be read back.
    pub determinable: bool,
}

/// Reconcile the requested port against the port the running control-plane
/// container is actually bound to.
///
/// The existing port always wins a conflict. Introspection failure does
/// not fail the operation: the requested port is kept and `determinable`
/// is cleared so the caller can warn that the install may fail downstream.
pub async fn reconcile_ingress_port(
    runtime: &dyn ContainerRuntime,
    container: &str,
    requested: u16,
    cancel: &CancellationToken,
) -> Result<PortResolution> {
    match runtime.exposed_port(container, cancel).await {
        Ok(observed) => Ok(PortResolution {
            requested,
            effective: observed,
            conflict: observed != requested,
            determinable: true,
        }),
        Err(e) if e.is_cancelled() => Err(e),
        Err(_) => Ok(PortResolution {
            requested,
            effective: requested,
            conflict: false,
            determinable: false,
        }),
    }
}

/// Terminal outcomes of the create-or-reuse decision. Failure exits are
/// the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOutcome {
    /// An existing cluster was found and validated; install against `port`.
    Validated { port: u16 },
    /// A new cluster was created publishing `port`.
    Created { port: u16 },
}

impl ClusterOutcome {
    /// Ingress port the rest of the pipeline must use.
    pub fn port(self) -> u16 {
        match self {
            ClusterOutcome::Validated { port } | ClusterOutcome::Created { port } => port,
        }
    }
}

/// Ensure the provider's cluster exists: validate it when present, create
/// it when absent.
///
/// An indeterminate existence query is fatal and aborts before any
/// mutation. In the create path, mount specs are parsed and the requested
/// port probed before creation is attempted; creation failures are fatal
/// and never retried here.
pub async fn ensure_cluster(
    provider: &Provider,
    cluster: &dyn ClusterClient,
    runtime: &dyn ContainerRuntime,
    requested_port: u16,
    raw_mounts: &[String],
    cancel: &CancellationToken,
) -> Result<ClusterOutcome> {
    info!("Checking for existing cluster '{}'", provider.cluster_name);
    let exists = match cluster.exists(cancel).await {
        Ok(exists) => exists,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            return Err(Error::cluster_indeterminate(
                provider.cluster_name.as_str(),
                e.to_string(),
            ))
        }
    };

    if exists {
        info!("Existing cluster '{}' found", provider.cluster_name);

        let port = if provider.name.supports_port_introspection() {
            let container = provider.control_plane_container();
            let resolution =
                reconcile_ingress_port(runtime, &container, requested_port, cancel).await?;
            if !resolution.determinable {
                warn!(
                    "Unable to determine which port the existing cluster was configured to use. \
                     Installation will continue but may ultimately fail, in which case it will \
                     be necessary to uninstall first."
                );
            } else if resolution.conflict {
                warn!(
                    "The existing cluster was found to be using port {}, which differs from the \
                     requested port {}. The existing port will be used, as changing ports \
                     requires the existing installation to be uninstalled first.",
                    resolution.effective, resolution.requested
                );
            }
            resolution.effective
        } else {
            requested_port
        };

        info!("Cluster '{}' validation complete", provider.cluster_name);
        return Ok(ClusterOutcome::Validated { port });
    }

    info!(
        "No existing cluster found, cluster '{}' will be created",
        provider.cluster_name
    );

    if !provider.name.supports_lifecycle() {
        return Err(Error::validation(format!(
            "provider '{}' does not support cluster creation; create the cluster manually and re-run",
            provider.name
        )));
    }

    let mounts = parse_volume_mounts(raw_mounts)?;
    port_available(requested_port).await?;

    if let Err(e) = cluster.create(requested_port, &mounts, cancel).await {
        if e.is_cancelled() {
            return Err(e);
        }
        return Err(Error::cluster_create(
            provider.cluster_name.as_str(),
            e.to_string(),
        ));
    }
    info!("Cluster '{}' created", provider.cluster_name);

    Ok(ClusterOutcome::Created {
        port: requested_port,
    })
}

/// Probe that the ingress port can still be bound on the host.
///
/// Only meaningful before creating a cluster; when reusing one the port
/// being bound is expected.
pub async fn port_available(port: u16) -> Result<()> {
    match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(_) => Ok(()),
        Err(e) => Err(Error::PortUnavailable {
            port,
            message: e.to_string(),
        }),
    }
}
