use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use persons_core::{init_logging, open_pool, open_pool_in_memory, PersonStore, SqlitePersonStore};
use persons_server::{build_router, settings::Settings, state::AppState};
use tokio::sync::Notify;

#[derive(Debug, Parser)]
#[command(name = "persons_server", version, about = "Person records HTTP service")]
struct Args {
    /// TOML config file; `configs/persons.toml` is used when present.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings =
        Settings::load(args.config.as_deref()).context("failed to load configuration")?;
    init_logging(&settings.logging.level, settings.logging.dir.as_deref())
        .map_err(|err| anyhow!(err))
        .context("failed to initialize logging")?;

    let pool = if settings.database.is_in_memory() {
        open_pool_in_memory()
    } else {
        open_pool(&settings.database.path, settings.database.pool_options())
    }
    .with_context(|| format!("failed to open database `{}`", settings.database.path))?;

    let store: Arc<dyn PersonStore> = Arc::new(SqlitePersonStore::new(pool.clone()));
    let app = build_router(
        AppState::new(store, settings.web.request_timeout()),
        &settings.web.path_prefix,
    );

    let addr = settings.web.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(
        "event=server_start module=server status=ok address={} prefix={}",
        addr, settings.web.path_prefix
    );

    let stop = Arc::new(Notify::new());
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown({
                let stop = Arc::clone(&stop);
                async move { stop.notified().await }
            })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => {
            pool.close();
            return joined.context("server task failed")?.context("server error");
        }
        _ = shutdown_signal() => {}
    }

    let grace = settings.web.shutdown_grace();
    info!(
        "event=server_shutdown module=server status=draining grace_secs={}",
        grace.as_secs()
    );
    stop.notify_one();

    let outcome = match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => joined.context("server task failed")?.context("server error"),
        Err(_) => {
            warn!("event=server_shutdown module=server status=forced reason=grace_elapsed");
            server.abort();
            Ok(())
        }
    };

    pool.close();
    info!("event=server_shutdown module=server status=ok");
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("event=signal_install module=server status=error signal=SIGINT error={err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(
                    "event=signal_install module=server status=error signal=SIGTERM error={err}"
                );
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
}
