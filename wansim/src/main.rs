//! `wansimd`: serves the impairment control plane over HTTP.

use std::sync::Arc;

use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};
use wansim::{config::AppConfig, router};
use wansim_tc::{command::Runner, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    Registry::default().with(env_filter).with(fmt::layer().with_target(true)).init();

    let config = AppConfig::load()?;
    info!(?config, "loaded configuration");

    let executor = Runner::boxed();
    let lister = config.lister(Arc::clone(&executor));
    let engine = Arc::new(Engine::with_options(executor, lister, config.engine_options()));

    let listener = TcpListener::bind(config.listen).await?;
    info!(addr = %config.listen, "wansimd listening");

    axum::serve(listener, router(engine)).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
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
