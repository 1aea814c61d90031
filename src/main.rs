use d_lock::build_store;
use d_lock::coordination::build_backend;
use d_lock::gather_metrics;
use d_lock::run_contention;
use d_lock::DLockConfig;
use d_lock::Error;
use d_lock::LockManager;
use d_lock::Result;
use d_lock::StockFacade;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let settings = DLockConfig::new()?.validate()?;

    // Initializing Logs
    init_observability();

    // Initializing Shutdown Signal
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = graceful_shutdown(shutdown).await {
                error!("Failed to listen for shutdown signals: {:?}", e);
            }
        }
    });

    let backend = build_backend(&settings.coordination, &shutdown).await?;
    let store = build_store(&settings.storage)?;
    let locks = LockManager::new(backend, &settings.lock);
    info!(instance_id = locks.instance_id(), "Lock manager ready");
    let facade = StockFacade::new(locks, store.clone(), settings.lock.clone());

    let report = run_contention(&facade, store.as_ref(), &settings.simulation, &shutdown).await?;

    println!("{report}");
    println!("{}", gather_metrics());

    shutdown.cancel();
    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(shutdown: CancellationToken) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(signal_error)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(signal_error)?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = shutdown.cancelled() => {
            return Ok(());
        },
    }

    shutdown.cancel();
    info!("Shutdown requested, abandoning pending lock waits");
    Ok(())
}

fn signal_error(e: std::io::Error) -> Error {
    Error::Fatal(format!("Failed to install signal handler: {e}"))
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
