use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use vmsnap::assemble::ClusterSnapshotAssembler;
use vmsnap::config::Config;
use vmsnap::kube::auth::KubeCredentials;
use vmsnap::kube::client::KubeClient;
use vmsnap::kube::http::TlsOptions;
use vmsnap::model::ClusterSnapshot;
use vmsnap::resource::{BatchExecutor, ResponseCache};

/// Print a correlated snapshot of VMs, storage and nodes of a Harvester cluster
#[derive(Parser, Debug)]
#[command(name = "vmsnap", version = vmsnap::VERSION, about, long_about = None)]
struct Args {
    /// API server base URL
    #[arg(long, env = "VMSNAP_SERVER")]
    server: Option<String>,

    /// Bearer token
    #[arg(long, env = "VMSNAP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// File holding a bearer token
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// CA bundle used to verify the API server
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Namespace of the storage layer's resources
    #[arg(long)]
    storage_namespace: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip the cluster health checks
    #[arg(long)]
    no_health_checks: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    output: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Remember server, storage namespace and credential paths in the config file
    #[arg(long)]
    save_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Logs go to stderr or a file; stdout carries the snapshot
fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let (non_blocking, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.to_string().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("vmsnap {} started with log level: {:?}", vmsnap::VERSION, level);
    if let Some(path) = log_file {
        tracing::info!("Log file: {:?}", path);
    }

    Ok(Some(guard))
}

fn render(snapshot: &ClusterSnapshot, format: OutputFormat, pretty: bool) -> Result<String> {
    let rendered = match format {
        OutputFormat::Json if pretty => serde_json::to_string_pretty(snapshot)?,
        OutputFormat::Json => serde_json::to_string(snapshot)?,
        OutputFormat::Yaml => serde_yaml::to_string(snapshot)?,
    };
    Ok(rendered)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    let server = config
        .effective_server(args.server.as_deref())
        .context("No API server configured. Set VMSNAP_SERVER or use --server")?;

    let credentials = KubeCredentials::resolve(
        args.token.clone(),
        args.token_file.clone().or_else(|| config.token_file.clone()),
    );
    let tls = TlsOptions {
        ca_file: args.ca_file.clone().or_else(|| config.ca_file.clone()),
        insecure: args.insecure,
    };
    let client = KubeClient::new(
        &server,
        credentials,
        config.effective_timeout(args.timeout_secs),
        &tls,
    )?;

    let settings = config.engine_settings(config.effective_storage_namespace(args.storage_namespace.as_deref()));

    if args.save_config {
        config.server = Some(server.clone());
        config.storage_namespace = Some(settings.storage_namespace.clone());
        config.token_file = args.token_file.clone().or(config.token_file.take());
        config.ca_file = tls.ca_file.clone();
        match &args.config {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        tracing::info!("Saved configuration");
    }
    tracing::info!("Using server: {}, storage namespace: {}", server, settings.storage_namespace);

    let cache = Arc::new(ResponseCache::new(settings.cache_ttl));
    let executor = BatchExecutor::new(Arc::new(client), cache);

    let mut assembler = ClusterSnapshotAssembler::new(executor, settings);
    if args.no_health_checks {
        assembler = assembler.with_health_checks(None);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling pass");
            on_interrupt.cancel();
        }
    });

    let snapshot = assembler
        .assemble(&cancel)
        .await
        .context("Failed to assemble cluster snapshot")?;

    println!("{}", render(&snapshot, args.output, args.pretty)?);
    Ok(())
}
