use std::error::Error;

use clap::Parser;
use tracing::info;

mod cli;
mod data_dir;
mod dsn;

use chatgate_core::bootstrap;
use chatgate_router::gateway_router;

use crate::cli::Cli;
use crate::data_dir::resolve_data_dir;
use crate::dsn::resolve_dsn;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("chatgate failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir.as_deref());
    let dsn = resolve_dsn(cli.dsn.as_deref(), &data_dir)?;
    let config = cli.into_patch(data_dir, dsn).into_config()?;
    info!(
        host = %config.host,
        port = config.port,
        data_dir = %config.data_dir,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        payments = config.payment.enabled,
        "config loaded"
    );

    let boot = bootstrap(&config).await?;
    let app = gateway_router(boot.state, config.cors_origin.as_deref());

    let bind = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chatgate=info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler; run until the process is killed.
        std::future::pending::<()>().await;
    }
}
