//! Chart-based installer hand-off
//!
//! The final, assembled install options and the helm-backed installer
//! that consumes them. Option assembly happens in the install command;
//! this module only turns finished options into one helm invocation.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{Error, Result};

/// Helm release name for the platform.
const RELEASE_NAME: &str = "skiff";
/// Chart reference installed for the platform.
const CHART: &str = "skiff/skiff";
/// Namespace the platform is installed into.
const NAMESPACE: &str = "skiff";

/// Final configuration consumed by the installer.
///
/// Assembled once from flags, resolved cluster state and environment
/// overrides; never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOpts {
    /// Chart version to install; empty means "let the installer pick latest".
    pub chart_version: String,
    /// Chart values file to load; empty means none.
    pub values_file: String,
    /// Chart secret files.
    pub secret_files: Vec<String>,
    /// Migrate data from a docker compose installation.
    pub migrate: bool,
    /// Ingress host.
    pub host: String,
    /// Ingress port.
    pub port: u16,
    /// Docker registry server.
    pub docker_server: String,
    /// Docker registry username.
    pub docker_user: String,
    /// Docker registry password.
    pub docker_pass: String,
    /// Docker registry email.
    pub docker_email: String,
    /// Skip launching the web browser post install.
    pub no_browser: bool,
    /// Run the platform in low resource mode.
    pub low_resource_mode: bool,
    /// Allow insecure cookies to be served over http.
    pub insecure_cookies: bool,
}

impl InstallOpts {
    /// Whether registry credentials were supplied.
    pub fn has_registry_auth(&self) -> bool {
        !self.docker_user.is_empty()
    }
}

/// Installer interface the pipeline hands finished options to.
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    /// Deploy the platform chart with the given options.
    async fn install(&self, opts: &InstallOpts, cancel: &CancellationToken) -> Result<()>;
}

/// `helm` CLI backed installer.
#[derive(Debug, Default, Clone)]
pub struct HelmInstaller;

impl HelmInstaller {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChartInstaller for HelmInstaller {
    async fn install(&self, opts: &InstallOpts, cancel: &CancellationToken) -> Result<()> {
        let args = helm_args(opts);
        info!("Installing chart {} as release '{}'", CHART, RELEASE_NAME);

        let mut command = Command::new("helm");
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::install(format!("unable to run helm: {}", e)))?;

        // Collect stderr off to the side so a failure can be reported with
        // helm's own message.
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut collected = Vec::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    collected.push(line);
                }
                collected
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::cancelled("helm install")),
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => info!("{}", line),
                        Ok(None) => break,
                        Err(e) => return Err(Error::install(e.to_string())),
                    },
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::cancelled("helm install")),
            status = child.wait() => status?,
        };

        if !status.success() {
            let detail = match stderr_task {
                Some(task) => task.await.unwrap_or_default().join("\n"),
                None => String::new(),
            };
            return Err(Error::install(format!(
                "helm exited with {}: {}",
                status,
                detail.trim()
            )));
        }
        Ok(())
    }
}

/// Assemble the helm invocation for the given options.
fn helm_args(opts: &InstallOpts) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        RELEASE_NAME.to_string(),
        CHART.to_string(),
        "--namespace".to_string(),
        NAMESPACE.to_string(),
        "--create-namespace".to_string(),
        "--set".to_string(),
        format!("global.ingress.host={}", opts.host),
        "--set".to_string(),
        format!("global.ingress.port={}", opts.port),
    ];

    if !opts.chart_version.is_empty() {
        args.push("--version".to_string());
        args.push(opts.chart_version.clone());
    }
    if !opts.values_file.is_empty() {
        args.push("--values".to_string());
        args.push(opts.values_file.clone());
    }
    for (i, secret) in opts.secret_files.iter().enumerate() {
        args.push("--set-file".to_string());
        args.push(format!("extraSecrets[{}]={}", i, secret));
    }
    if opts.migrate {
        args.push("--set".to_string());
        args.push("migration.enabled=true".to_string());
    }
    if opts.low_resource_mode {
        args.push("--set".to_string());
        args.push("global.lowResourceMode=true".to_string());
    }
    if opts.insecure_cookies {
        args.push("--set".to_string());
        args.push("global.auth.insecureCookies=true".to_string());
    }
    if opts.has_registry_auth() {
        args.push("--set".to_string());
        args.push(format!("imageCredentials.registry={}", opts.docker_server));
        args.push("--set".to_string());
        args.push(format!("imageCredentials.username={}", opts.docker_user));
        args.push("--set".to_string());
        args.push(format!("imageCredentials.password={}", opts.docker_pass));
        args.push("--set".to_string());
        args.push(format!("imageCredentials.email={}", opts.docker_email));
    }

    args
}
