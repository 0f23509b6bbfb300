use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use sealedsecret_provider::cluster::ApiServerProxy;
use sealedsecret_provider::sealing::{build_secret, controller_resolver, resolver_from_config, SecretSpec};
use sealedsecret_provider::{ClusterConfig, Error, ProviderConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sealctl", author, version, about, long_about = None)]
struct Args {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the certificate served by the sealed-secrets controller
    FetchCert(ProviderArgs),
    /// Print the fingerprint of the controller's current public key
    Fingerprint(ProviderArgs),
    /// Normalize a secret spec (YAML) and print the canonical Secret manifest
    Render(RenderArgs),
    /// Show version and build information
    Version,
}

#[derive(Parser, Debug)]
struct ProviderArgs {
    /// Provider configuration file (TOML)
    #[arg(long, env = "SEALEDSECRET_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the sealed-secrets controller service
    #[arg(long, env = "CONTROLLER_NAME")]
    controller_name: Option<String>,

    /// Namespace of the sealed-secrets controller
    #[arg(long, env = "CONTROLLER_NAMESPACE")]
    controller_namespace: Option<String>,

    /// Static controller certificate or public key (PEM file)
    #[arg(long, env = "SEALEDSECRET_PEM_FILE")]
    pem_file: Option<PathBuf>,

    /// API server URL
    #[arg(long, env = "KUBE_HOST")]
    host: Option<String>,

    /// CA bundle (PEM file) used to verify an https API server
    #[arg(long, env = "KUBE_CA_FILE")]
    ca_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Secret spec file (YAML)
    spec: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    init_tracing(args.log_format);

    match args.command {
        Commands::Version => {
            println!("sealctl v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            Ok(())
        }
        Commands::FetchCert(provider_args) => run_fetch_cert(provider_args).await,
        Commands::Fingerprint(provider_args) => run_fingerprint(provider_args).await,
        Commands::Render(render_args) => run_render(render_args),
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    // stdout carries command output, logs go to stderr
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Token cancelled on Ctrl-C so in-flight proxy requests are aborted.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            trigger.cancel();
        }
    });
    cancel
}

fn load_config(args: ProviderArgs) -> Result<ProviderConfig, Error> {
    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading provider configuration");
            ProviderConfig::load(path)?
        }
        None => ProviderConfig::default(),
    };

    if let Some(name) = args.controller_name {
        config.controller_name = name;
    }
    if let Some(namespace) = args.controller_namespace {
        config.controller_namespace = namespace;
    }
    if let Some(path) = args.pem_file {
        config.pem = Some(read_pem_file(&path)?);
    }
    if let Some(host) = args.host {
        match config.cluster.as_mut() {
            Some(cluster) => cluster.host = host,
            None => config.cluster = Some(ClusterConfig::new(host)),
        }
    }
    if let Some(path) = args.ca_file {
        let ca = read_pem_file(&path)?;
        match config.cluster.as_mut() {
            Some(cluster) => cluster.cluster_ca_certificate = Some(ca),
            None => {
                return Err(Error::ConfigError(
                    "--ca-file needs a cluster connection (--host or [cluster])".to_string(),
                ))
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn read_pem_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read {}: {e}", path.display())))
}

async fn run_fetch_cert(args: ProviderArgs) -> Result<(), Error> {
    let config = load_config(args)?;
    let cluster = config.cluster.as_ref().ok_or_else(|| {
        Error::ConfigError("fetch-cert needs a cluster connection (--host or [cluster])".to_string())
    })?;

    let proxy = ApiServerProxy::from_config(cluster)?;
    let resolver = controller_resolver(&config, Arc::new(proxy));
    let pem = resolver.fetch_pem(&shutdown_token()).await?;

    print!("{}", String::from_utf8_lossy(&pem));
    Ok(())
}

async fn run_fingerprint(args: ProviderArgs) -> Result<(), Error> {
    let config = load_config(args)?;
    let resolver = resolver_from_config(&config)?;
    let key = resolver.resolve(&shutdown_token()).await?;

    info!(bits = key.bits(), "Resolved controller public key");
    println!("{}", key.fingerprint());
    Ok(())
}

fn run_render(args: RenderArgs) -> Result<(), Error> {
    let raw = std::fs::read_to_string(&args.spec).map_err(|e| {
        Error::ConfigError(format!("Failed to read {}: {e}", args.spec.display()))
    })?;
    let spec = SecretSpec::from_yaml(&raw)?;
    let secret = build_secret(&spec)?;

    info!(secret = %secret.name, keys = secret.data.len(), "Rendered canonical secret");
    print!("{}", secret.to_yaml()?);
    Ok(())
}
