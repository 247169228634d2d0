//! Install command - provision the local cluster and deploy the platform
//!
//! Runs the installation as one observable operation:
//! 1. Pre-check: container runtime reachable
//! 2. Create or validate the local cluster, resolving the ingress port
//! 3. Assemble install options from flags, environment and resolved state
//! 4. Hand off to the chart installer

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::docker::{ContainerRuntime, DockerCli};
use crate::installer::{ChartInstaller, HelmInstaller, InstallOpts};
use crate::kind::{ClusterClient, KindCluster, Provider};
use crate::provision;
use crate::telemetry::TelClient;
use crate::{Error, Result, DEFAULT_INGRESS_PORT};

// Deprecated basic-auth overrides, recognized only to warn on use.
const ENV_BASIC_AUTH_USER: &str = "SKIFFCTL_LOCAL_INSTALL_USERNAME";
const ENV_BASIC_AUTH_PASS: &str = "SKIFFCTL_LOCAL_INSTALL_PASSWORD";

/// Env-var that overrides the docker registry server.
const ENV_DOCKER_SERVER: &str = "SKIFFCTL_LOCAL_INSTALL_DOCKER_SERVER";
/// Env-var that overrides the docker registry username.
const ENV_DOCKER_USER: &str = "SKIFFCTL_LOCAL_INSTALL_DOCKER_USERNAME";
/// Env-var that overrides the docker registry password.
const ENV_DOCKER_PASS: &str = "SKIFFCTL_LOCAL_INSTALL_DOCKER_PASSWORD";
/// Env-var that overrides the docker registry email.
const ENV_DOCKER_EMAIL: &str = "SKIFFCTL_LOCAL_INSTALL_DOCKER_EMAIL";

/// Chart-version literal that means "let the installer pick the latest".
const CHART_VERSION_LATEST: &str = "latest";

/// Install Skiff locally
#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Ingress http port
    #[arg(long, default_value_t = DEFAULT_INGRESS_PORT)]
    pub port: u16,

    /// Ingress http host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Skiff helm chart version to install
    #[arg(long, default_value = CHART_VERSION_LATEST)]
    pub chart_version: String,

    /// Skiff helm chart values file to load
    #[arg(long = "values", default_value = "")]
    pub values_file: String,

    /// Skiff helm chart secret file (repeatable)
    #[arg(long = "secret")]
    pub secret_files: Vec<String>,

    /// Additional volume mounts (format: <HOST_PATH>:<CONTAINER_PATH>)
    #[arg(long = "volume")]
    pub volumes: Vec<String>,

    /// Migrate data from a docker compose installation
    #[arg(long)]
    pub migrate: bool,

    /// Docker registry, can also be specified via SKIFFCTL_LOCAL_INSTALL_DOCKER_SERVER
    #[arg(long, default_value = "https://index.docker.io/v1/")]
    pub docker_server: String,

    /// Docker username, can also be specified via SKIFFCTL_LOCAL_INSTALL_DOCKER_USERNAME
    #[arg(long = "docker-username", default_value = "")]
    pub docker_user: String,

    /// Docker password, can also be specified via SKIFFCTL_LOCAL_INSTALL_DOCKER_PASSWORD
    #[arg(long = "docker-password", default_value = "")]
    pub docker_pass: String,

    /// Docker email, can also be specified via SKIFFCTL_LOCAL_INSTALL_DOCKER_EMAIL
    #[arg(long = "docker-email", default_value = "")]
    pub docker_email: String,

    /// Disable launching the web browser post install
    #[arg(long)]
    pub no_browser: bool,

    /// Run Skiff in low resource mode
    #[arg(long)]
    pub low_resource_mode: bool,

    /// Allow insecure cookies to be served over http
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Basic auth username, managed by the platform since 0.4
    #[arg(short = 'u', long, hide = true)]
    pub username: Option<String>,

    /// Basic auth password, managed by the platform since 0.4
    #[arg(short = 'p', long, hide = true)]
    pub password: Option<String>,
}

/// The install pipeline over its collaborators.
///
/// Collaborators are caller-owned and passed in so the pipeline can be
/// exercised with substitutes.
pub struct Installer<'a> {
    provider: &'a Provider,
    runtime: &'a dyn ContainerRuntime,
    cluster: &'a dyn ClusterClient,
    chart: &'a dyn ChartInstaller,
    telemetry: &'a TelClient,
    args: &'a InstallArgs,
}

impl<'a> Installer<'a> {
    pub fn new(
        provider: &'a Provider,
        runtime: &'a dyn ContainerRuntime,
        cluster: &'a dyn ClusterClient,
        chart: &'a dyn ChartInstaller,
        telemetry: &'a TelClient,
        args: &'a InstallArgs,
    ) -> Self {
        Self {
            provider,
            runtime,
            cluster,
            chart,
            telemetry,
            args,
        }
    }

    /// Run the installation as one observable operation.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.telemetry
            .wrap("local_install", || self.pipeline(cancel))
            .await
    }

    async fn pipeline(&self, cancel: &CancellationToken) -> Result<()> {
        info!("Checking for Docker installation");
        let version = self.runtime.server_version(cancel).await?;
        self.telemetry.attr("docker_version", version.version.as_str());
        self.telemetry.attr("docker_arch", version.arch.as_str());
        self.telemetry
            .attr("docker_platform", version.platform.name.as_str());

        let outcome = provision::ensure_cluster(
            self.provider,
            self.cluster,
            self.runtime,
            self.args.port,
            &self.args.volumes,
            cancel,
        )
        .await?;

        for flag in detect_legacy_flags(self.args) {
            warn!(
                "{} is deprecated and ignored; basic-auth credentials are managed by the platform",
                flag.0
            );
        }
        let opts = build_install_opts(self.args, outcome.port())?;
        self.chart.install(&opts, cancel).await?;

        info!(
            "Skiff installation complete: http://{}:{}",
            opts.host, opts.port
        );
        if !opts.no_browser {
            open_browser(&format!("http://{}:{}", opts.host, opts.port));
        }
        Ok(())
    }
}

/// Entry point for `skiffctl install`.
pub async fn run(provider: Provider, args: InstallArgs, cancel: CancellationToken) -> Result<()> {
    let runtime = DockerCli::new();
    let cluster = KindCluster::new(provider.cluster_name.clone());
    let chart = HelmInstaller::new();
    let telemetry = TelClient::new();

    Installer::new(&provider, &runtime, &cluster, &chart, &telemetry, &args)
        .run(&cancel)
        .await
}

/// Merge flag values, the resolved ingress port and environment overrides
/// into the final install options.
pub fn build_install_opts(args: &InstallArgs, port: u16) -> Result<InstallOpts> {
    let mut opts = InstallOpts {
        chart_version: args.chart_version.clone(),
        values_file: args.values_file.clone(),
        secret_files: args.secret_files.clone(),
        migrate: args.migrate,
        host: args.host.clone(),
        port,
        docker_server: args.docker_server.clone(),
        docker_user: args.docker_user.clone(),
        docker_pass: args.docker_pass.clone(),
        docker_email: args.docker_email.clone(),
        no_browser: args.no_browser,
        low_resource_mode: args.low_resource_mode,
        insecure_cookies: args.insecure_cookies,
    };

    // The flag default must be a documented literal, while the installer
    // treats absence of a version as "latest".
    if opts.chart_version == CHART_VERSION_LATEST {
        opts.chart_version = String::new();
    }

    env_override(&mut opts.docker_server, ENV_DOCKER_SERVER);
    env_override(&mut opts.docker_user, ENV_DOCKER_USER);
    env_override(&mut opts.docker_pass, ENV_DOCKER_PASS);
    env_override(&mut opts.docker_email, ENV_DOCKER_EMAIL);

    validate_registry_auth(&opts)?;
    Ok(opts)
}

/// Replace `original` with the value of the `env` variable when it is set
/// and non-empty. An empty value means "unset", never an explicit override
/// to empty.
fn env_override(original: &mut String, env: &str) {
    if let Ok(v) = std::env::var(env) {
        if !v.is_empty() {
            *original = v;
        }
    }
}

/// Registry credentials must be supplied as a complete group. The server
/// field always carries a default and is exempt.
fn validate_registry_auth(opts: &InstallOpts) -> Result<()> {
    let required = [
        ("--docker-username", &opts.docker_user),
        ("--docker-password", &opts.docker_pass),
        ("--docker-email", &opts.docker_email),
    ];
    if required.iter().all(|(_, value)| value.is_empty()) {
        return Ok(());
    }

    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::validation(format!(
        "docker registry credentials must be provided together; missing {}",
        missing.join(", ")
    )))
}

/// A deprecated flag observed on this invocation. Detected once at
/// option-assembly time; the value never reaches the install options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyFlag(pub &'static str);

fn detect_legacy_flags(args: &InstallArgs) -> Vec<LegacyFlag> {
    let mut legacy = Vec::new();
    if args.username.is_some() || env_present(ENV_BASIC_AUTH_USER) {
        legacy.push(LegacyFlag("--username"));
    }
    if args.password.is_some() || env_present(ENV_BASIC_AUTH_PASS) {
        legacy.push(LegacyFlag("--password"));
    }
    legacy
}

fn env_present(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Best-effort launch of the system browser; failures are ignored.
fn open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let opener = "open";
    #[cfg(not(target_os = "macos"))]
    let opener = "xdg-open";

    match std::process::Command::new(opener)
        .arg(url)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(_) => {}
        Err(e) => debug!("unable to launch browser: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn args() -> InstallArgs {
        InstallArgs {
            port: DEFAULT_INGRESS_PORT,
            host: "localhost".to_string(),
            chart_version: CHART_VERSION_LATEST.to_string(),
            docker_server: "https://index.docker.io/v1/".to_string(),
            ..InstallArgs::default()
        }
    }

    fn clear_env() {
        for name in [
            ENV_DOCKER_SERVER,
            ENV_DOCKER_USER,
            ENV_DOCKER_PASS,
            ENV_DOCKER_EMAIL,
            ENV_BASIC_AUTH_USER,
            ENV_BASIC_AUTH_PASS,
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn env_override_ignores_unset_variable() {
        clear_env();
        let mut value = "original".to_string();
        env_override(&mut value, ENV_DOCKER_SERVER);
        assert_eq!(value, "original");
    }

    #[test]
    #[serial]
    fn env_override_ignores_empty_variable() {
        clear_env();
        std::env::set_var(ENV_DOCKER_SERVER, "");
        let mut value = "original".to_string();
        env_override(&mut value, ENV_DOCKER_SERVER);
        assert_eq!(value, "original");
        clear_env();
    }

    #[test]
    #[serial]
    fn env_override_replaces_unconditionally_when_set() {
        clear_env();
        std::env::set_var(ENV_DOCKER_SERVER, "https://registry.example.com");
        let mut value = "original".to_string();
        env_override(&mut value, ENV_DOCKER_SERVER);
        assert_eq!(value, "https://registry.example.com");
        clear_env();
    }

    #[test]
    #[serial]
    fn latest_chart_version_becomes_the_empty_sentinel() {
        clear_env();
        let opts = build_install_opts(&args(), 8000).unwrap();
        assert_eq!(opts.chart_version, "");
    }

    #[test]
    #[serial]
    fn pinned_chart_version_passes_through() {
        clear_env();
        let opts = build_install_opts(
            &InstallArgs {
                chart_version: "1.2.3".to_string(),
                ..args()
            },
            8000,
        )
        .unwrap();
        assert_eq!(opts.chart_version, "1.2.3");
    }

    #[test]
    #[serial]
    fn resolved_port_wins_over_the_flag() {
        clear_env();
        let opts = build_install_opts(&args(), 8001).unwrap();
        assert_eq!(opts.port, 8001);
    }

    #[test]
    #[serial]
    fn registry_overrides_are_applied_from_the_environment() {
        clear_env();
        std::env::set_var(ENV_DOCKER_USER, "deploy");
        std::env::set_var(ENV_DOCKER_PASS, "hunter2");
        std::env::set_var(ENV_DOCKER_EMAIL, "deploy@example.com");
        let opts = build_install_opts(&args(), 8000).unwrap();
        assert_eq!(opts.docker_user, "deploy");
        assert_eq!(opts.docker_pass, "hunter2");
        assert_eq!(opts.docker_email, "deploy@example.com");
        clear_env();
    }

    #[test]
    #[serial]
    fn partial_registry_credentials_are_rejected() {
        clear_env();
        let err = build_install_opts(
            &InstallArgs {
                docker_user: "deploy".to_string(),
                ..args()
            },
            8000,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("--docker-password"));
        assert!(err.to_string().contains("--docker-email"));
    }

    #[test]
    #[serial]
    fn complete_registry_credentials_are_accepted() {
        clear_env();
        let opts = build_install_opts(
            &InstallArgs {
                docker_user: "deploy".to_string(),
                docker_pass: "hunter2".to_string(),
                docker_email: "deploy@example.com".to_string(),
                ..args()
            },
            8000,
        )
        .unwrap();
        assert!(opts.has_registry_auth());
    }

    #[test]
    #[serial]
    fn legacy_flags_are_detected_but_never_applied() {
        clear_env();
        let install_args = InstallArgs {
            username: Some("admin".to_string()),
            ..args()
        };
        assert_eq!(
            detect_legacy_flags(&install_args),
            vec![LegacyFlag("--username")]
        );

        let opts = build_install_opts(&install_args, 8000).unwrap();
        assert!(!opts.has_registry_auth());
    }

    #[test]
    #[serial]
    fn legacy_env_vars_are_detected() {
        clear_env();
        std::env::set_var(ENV_BASIC_AUTH_PASS, "secret");
        assert_eq!(detect_legacy_flags(&args()), vec![LegacyFlag("--password")]);
        clear_env();
    }
}
