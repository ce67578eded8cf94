mod background;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use gpuprom_core::collector::{Collector, RealFs, RealRunner, SmiSource};

use state::{AppState, HostCollector, SharedCollector};

// ============================================================
// CLI
// ============================================================

#[derive(Parser, Debug)]
#[command(
    name = "gpuprom",
    about = "Prometheus exporter for nvidia-smi GPU, process and PCIe metrics",
    version = gpuprom_core::VERSION
)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:9202", env = "GPUPROM_LISTEN")]
    listen: String,

    /// Path to the nvidia-smi binary.
    #[arg(long, default_value = "/usr/bin/nvidia-smi", env = "GPUPROM_NVIDIA_SMI")]
    nvidia_smi_path: PathBuf,

    /// Path to a GDDR6 memory temperature helper (run as `<path> -j`).
    #[arg(long, env = "GPUPROM_GDDR6")]
    gddr6_path: Option<PathBuf>,

    /// Path to the lspci binary.
    #[arg(long, default_value = "/usr/bin/lspci", env = "GPUPROM_LSPCI")]
    lspci_path: PathBuf,

    /// Docker CLI used to inspect containers of GPU processes.
    #[arg(long, default_value = "docker", env = "GPUPROM_DOCKER")]
    docker_path: PathBuf,

    /// Refresh interval in seconds.
    #[arg(
        long,
        default_value = "5",
        env = "GPUPROM_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// Read nvidia-smi XML from this file instead of running nvidia-smi.
    #[arg(long, env = "GPUPROM_TEST_FILE", value_name = "PATH")]
    test_file: Option<PathBuf>,

    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Path to /sys filesystem.
    #[arg(long, default_value = "/sys")]
    sys_path: String,

    /// Forget process facts of pids that left the GPU process lists.
    #[arg(long)]
    prune_process_cache: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn source(&self) -> SmiSource {
        match self.test_file {
            Some(ref path) => SmiSource::fixture(path),
            None => SmiSource::command(&self.nvidia_smi_path),
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
///
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
    for target in ["gpuprom", "gpuprom_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn create_collector(args: &Args) -> HostCollector {
    Collector::new(RealFs::new(), RealRunner::new(), args.source())
        .with_proc_path(args.proc_path.as_str())
        .with_sys_path(args.sys_path.as_str())
        .with_docker(&args.docker_path)
        .with_lspci(Some(args.lspci_path.clone()))
        .with_memory_temp_helper(args.gddr6_path.clone())
        .with_process_cache_pruning(args.prune_process_cache)
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };
    runtime.block_on(async_main(args));
}

async fn async_main(args: Args) {
    info!(version = gpuprom_core::VERSION, "gpuprom starting");
    info!(
        source = ?args.source(),
        interval_s = args.interval,
        proc = %args.proc_path,
        sys = %args.sys_path,
        gddr6 = ?args.gddr6_path,
        prune_process_cache = args.prune_process_cache,
        "config"
    );

    let collector: SharedCollector<HostCollector> = Arc::new(Mutex::new(create_collector(&args)));
    let state = AppState::shared();

    // The first refresh must succeed; a scrape target with no data is useless.
    let t0 = Instant::now();
    let startup = {
        let collector = Arc::clone(&collector);
        let state = Arc::clone(&state);
        tokio::task::spawn_blocking(move || background::refresh_once(&collector, &state)).await
    };
    match startup {
        Ok(Ok(snapshot)) => background::log_first_snapshot(&snapshot, t0.elapsed()),
        Ok(Err(e)) => {
            error!(error = %e, "initial refresh failed");
            process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "initial refresh panicked");
            process::exit(1);
        }
    }

    let interval = Duration::from_secs(args.interval);
    tokio::spawn(background::tick_loop(
        Arc::clone(&collector),
        Arc::clone(&state),
        interval,
    ));

    let addr: SocketAddr = match args.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(listen = %args.listen, error = %e, "invalid listen address");
            process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    info!(%addr, "listening");

    let app = handlers::router(state);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        process::exit(1);
    }
    info!("gpuprom stopped");
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["gpuprom"]).unwrap();
        assert_eq!(args.listen, "0.0.0.0:9202");
        assert_eq!(args.interval, 5);
        assert_eq!(args.lspci_path, PathBuf::from("/usr/bin/lspci"));
        assert_eq!(args.docker_path, PathBuf::from("docker"));
        assert!(args.gddr6_path.is_none());
        assert!(!args.prune_process_cache);
        assert_eq!(args.source(), SmiSource::command("/usr/bin/nvidia-smi"));
    }

    #[test]
    fn test_test_file_selects_fixture() {
        let args =
            Args::try_parse_from(["gpuprom", "--test-file", "/tmp/sample.xml", "-vv"]).unwrap();
        assert_eq!(args.source(), SmiSource::fixture("/tmp/sample.xml"));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_interval_must_be_positive() {
        assert!(Args::try_parse_from(["gpuprom", "--interval", "0"]).is_err());
        let args = Args::try_parse_from(["gpuprom", "--interval", "30"]).unwrap();
        assert_eq!(args.interval, 30);
    }
}
