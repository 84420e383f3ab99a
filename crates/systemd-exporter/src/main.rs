//! systemd-exporter - Prometheus exporter for systemd unit metrics.
//!
//! Every scrape of the telemetry path runs one collection cycle against the
//! systemd manager and renders the result in the Prometheus text format.
//! `--once` runs a single cycle and prints it instead of serving HTTP.

mod exposition;
mod handlers;
mod state;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use systemd_exporter_core::collector::{Collector, CollectorConfig, RealFs, SystemdConnector};

use crate::state::AppState;

type SystemdCollector = Collector<SystemdConnector, RealFs>;

/// Output format for `--once`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Prometheus exporter for systemd unit metrics.
#[derive(Parser, Debug)]
#[command(
    name = "systemd-exporter",
    about = "Prometheus exporter for systemd unit metrics",
    version = systemd_exporter_core::VERSION
)]
struct Args {
    /// Address to listen on for web interface and telemetry.
    #[arg(
        long = "web.listen-address",
        default_value = "0.0.0.0:9558",
        env = "SYSTEMD_EXPORTER_LISTEN_ADDRESS"
    )]
    listen_address: String,

    /// Path under which to expose metrics.
    #[arg(
        long = "web.telemetry-path",
        default_value = "/metrics",
        env = "SYSTEMD_EXPORTER_TELEMETRY_PATH"
    )]
    telemetry_path: String,

    /// Regexp of units to collect. Anchored at both ends.
    #[arg(
        long = "collector.unit-whitelist",
        default_value = ".+",
        env = "SYSTEMD_EXPORTER_UNIT_WHITELIST"
    )]
    unit_whitelist: String,

    /// Regexp of units to skip. Takes precedence over the whitelist.
    #[arg(
        long = "collector.unit-blacklist",
        default_value = r".+\.(device)",
        env = "SYSTEMD_EXPORTER_UNIT_BLACKLIST"
    )]
    unit_blacklist: String,

    /// Connect directly to /run/systemd/private instead of the system bus.
    #[arg(long = "collector.private", env = "SYSTEMD_EXPORTER_PRIVATE")]
    private: bool,

    /// procfs mountpoint.
    #[arg(long = "path.procfs", default_value = "/proc", env = "SYSTEMD_EXPORTER_PROCFS")]
    procfs: PathBuf,

    /// cgroupfs mountpoint.
    #[arg(
        long = "path.cgroupfs",
        default_value = "/sys/fs/cgroup",
        env = "SYSTEMD_EXPORTER_CGROUPFS"
    )]
    cgroupfs: PathBuf,

    /// Export systemd_service_restart_total. Requires systemd 235+.
    #[arg(
        long = "collector.enable-restart-count",
        env = "SYSTEMD_EXPORTER_ENABLE_RESTART_COUNT"
    )]
    enable_restart_count: bool,

    /// Export systemd_process_open_fds. Requires read access to /proc/<pid>/fd.
    #[arg(
        long = "collector.enable-file-descriptor-size",
        env = "SYSTEMD_EXPORTER_ENABLE_FD_SIZE"
    )]
    enable_fd_size: bool,

    /// Give up on units still being collected after this many seconds.
    #[arg(
        long = "collector.timeout",
        value_name = "SECONDS",
        value_parser = parse_timeout,
        env = "SYSTEMD_EXPORTER_TIMEOUT"
    )]
    timeout: Option<Duration>,

    /// Collect once, print the samples to stdout and exit.
    #[arg(long)]
    once: bool,

    /// Output format for --once.
    #[arg(long, value_enum, default_value = "text")]
    format: Format,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            unit_whitelist: self.unit_whitelist.clone(),
            unit_blacklist: self.unit_blacklist.clone(),
            private: self.private,
            procfs_path: self.procfs.clone(),
            cgroupfs_path: self.cgroupfs.clone(),
            enable_restart_count: self.enable_restart_count,
            enable_fd_metrics: self.enable_fd_size,
            timeout: self.timeout,
        }
    }
}

/// Parses a positive number of seconds, fractions allowed.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid timeout '{}': {}", s, e))?;
    if secs <= 0.0 {
        return Err(format!("timeout must be positive, got '{}'", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid timeout '{}': {}", s, e))
}

/// The telemetry path must not shadow the landing page or the health check.
fn validate_telemetry_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!("telemetry path must start with '/', got '{}'", path));
    }
    if path == "/" || path == "/health" {
        return Err(format!("telemetry path '{}' is reserved", path));
    }
    Ok(())
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["systemd_exporter", "systemd_exporter_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries --once output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    validate_telemetry_path(&args.telemetry_path)?;

    let config = args.collector_config();
    info!("systemd-exporter {} starting", systemd_exporter_core::VERSION);
    info!(
        "Config: whitelist={}, blacklist={}, private={}, procfs={}, cgroupfs={}, timeout={:?}",
        config.unit_whitelist,
        config.unit_blacklist,
        config.private,
        config.procfs_path.display(),
        config.cgroupfs_path.display(),
        config.timeout
    );
    if config.enable_restart_count {
        info!("Restart count metric: enabled");
    }
    if config.enable_fd_metrics {
        info!("File descriptor metric: enabled");
    }

    let collector = Collector::new(SystemdConnector::new(config.private), RealFs::new(), config)?;

    if args.once {
        return print_once(&collector, args.format);
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(args, collector))
}

fn print_once(collector: &SystemdCollector, format: Format) -> Result<(), Box<dyn Error>> {
    let timestamp = Utc::now();
    let cycle = collector.try_collect()?;
    info!(
        "Collected {} samples from {} units in {:?}",
        cycle.samples.len(),
        cycle.units,
        cycle.timing.total
    );

    match format {
        Format::Text => print!("{}", exposition::render_text(&cycle.samples)?),
        Format::Json => println!("{}", exposition::render_json(&cycle.samples, timestamp)?),
    }
    Ok(())
}

async fn serve(args: Args, collector: SystemdCollector) -> Result<(), Box<dyn Error>> {
    let collector = Arc::new(collector);
    let state = AppState {
        source: Arc::new(move || collector.collect()),
        telemetry_path: Arc::from(args.telemetry_path.as_str()),
    };
    let app = handlers::app(state);

    let listener = tokio::net::TcpListener::bind(&args.listen_address)
        .await
        .map_err(|e| format!("failed to bind {}: {}", args.listen_address, e))?;
    info!(
        "Listening on {} (telemetry path {})",
        args.listen_address, args.telemetry_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("0.5").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_timeout(" 2 ").unwrap(), Duration::from_secs(2));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_validate_telemetry_path() {
        assert!(validate_telemetry_path("/metrics").is_ok());
        assert!(validate_telemetry_path("/systemd/metrics").is_ok());
        assert!(validate_telemetry_path("metrics").is_err());
        assert!(validate_telemetry_path("/").is_err());
        assert!(validate_telemetry_path("/health").is_err());
    }

    #[test]
    fn test_default_args_match_default_config() {
        let args = Args::try_parse_from(["systemd-exporter"]).unwrap();
        assert_eq!(args.listen_address, "0.0.0.0:9558");
        assert_eq!(args.telemetry_path, "/metrics");
        assert!(!args.once);
        assert_eq!(args.format, Format::Text);
        assert_eq!(args.collector_config(), CollectorConfig::default());
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::try_parse_from([
            "systemd-exporter",
            "--collector.unit-whitelist",
            r".+\.service",
            "--collector.unit-blacklist",
            "ssh.*",
            "--collector.private",
            "--path.procfs",
            "/host/proc",
            "--path.cgroupfs",
            "/host/sys/fs/cgroup",
            "--collector.enable-restart-count",
            "--collector.enable-file-descriptor-size",
            "--collector.timeout",
            "3",
        ])
        .unwrap();
        let config = args.collector_config();

        assert_eq!(config.unit_whitelist, r".+\.service");
        assert_eq!(config.unit_blacklist, "ssh.*");
        assert!(config.private);
        assert_eq!(config.procfs_path, PathBuf::from("/host/proc"));
        assert_eq!(config.cgroupfs_path, PathBuf::from("/host/sys/fs/cgroup"));
        assert!(config.enable_restart_count);
        assert!(config.enable_fd_metrics);
        assert_eq!(config.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_once_json() {
        let args =
            Args::try_parse_from(["systemd-exporter", "--once", "--format", "json", "-vv"]).unwrap();
        assert!(args.once);
        assert_eq!(args.format, Format::Json);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Args::try_parse_from(["systemd-exporter", "--format", "xml"]).is_err());
    }
}
