use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use dirsync::config::ListenerConfig;
use dirsync::utils::file_io::open_file_for_append;
use dirsync::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match ListenerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_observability(&config.runtime.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Shutdown and module-reload signals
    let (graceful_tx, graceful_rx) = watch::channel(());
    let (reload_tx, reload_rx) = watch::channel(());
    tokio::spawn(async move {
        if let Err(e) = watch_signals(graceful_tx, reload_tx).await {
            error!("signal handling failed: {:?}", e);
        }
    });

    let mut listener = match dirsync::build_listener(config, graceful_rx, reload_rx).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to start listener: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("listener started");
    if let Err(e) = listener.run().await {
        error!("listener stops: {e}");
        return ExitCode::FAILURE;
    }

    info!("listener stops.");
    ExitCode::SUCCESS
}

async fn watch_signals(
    graceful_tx: watch::Sender<()>,
    reload_tx: watch::Sender<()>,
) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(dirsync::Error::Io)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(dirsync::Error::Io)?;
    let mut sighup = signal(SignalKind::hangup()).map_err(dirsync::Error::Io)?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT detected.");
                break;
            },
            _ = sigterm.recv() => {
                info!("SIGTERM detected.");
                break;
            },
            _ = sighup.recv() => {
                info!("SIGHUP detected, scheduling module reload.");
                let _ = reload_tx.send(());
            },
        }
    }

    graceful_tx
        .send(())
        .map_err(|e| dirsync::Error::Fatal(format!("failed to send shutdown signal: {e}")))?;
    Ok(())
}

fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(PathBuf::from(log_dir).join("listener.log"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
