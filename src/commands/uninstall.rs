//! Uninstall command - tear down the local cluster
//!
//! Deletes the kind cluster carrying the platform. A missing cluster is
//! not an error; the command reports it and exits cleanly.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::kind::{ClusterClient, KindCluster, Provider};
use crate::telemetry::TelClient;
use crate::{Error, Result};

/// Entry point for `skiffctl uninstall`.
pub async fn run(provider: Provider, cancel: CancellationToken) -> Result<()> {
    let cluster = KindCluster::new(provider.cluster_name.clone());
    let telemetry = TelClient::new();

    telemetry
        .wrap("local_uninstall", || async {
            if !provider.name.supports_lifecycle() {
                return Err(Error::validation(format!(
                    "provider '{}' clusters are not managed by skiffctl",
                    provider.name
                )));
            }

            let exists = match cluster.exists(&cancel).await {
                Ok(exists) => exists,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    return Err(Error::cluster_indeterminate(
                        provider.cluster_name.as_str(),
                        e.to_string(),
                    ))
                }
            };
            if !exists {
                info!(
                    "No cluster '{}' found, nothing to uninstall",
                    provider.cluster_name
                );
                return Ok(());
            }

            info!("Deleting cluster '{}'", provider.cluster_name);
            cluster.delete(&cancel).await?;
            info!("Cluster '{}' deleted", provider.cluster_name);
            Ok(())
        })
        .await
}
