use std::sync::Arc;

use color_eyre::eyre::Context as _;
use migration::{Migrator, MigratorTrait as _};
use sea_orm::Database;
use tokio::{signal::unix::SignalKind, sync::Notify};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use platform_client::PlatformClient;
use token_vault::TokenVault;

pub mod config;
pub mod diagnostics;
pub mod fanout;
pub mod feed;
pub mod poller;
pub mod refresh;
pub mod repository;
pub mod rpc;
pub mod server;
pub mod websub;

use config::{Config, TOKEN_REFRESH_TICK_INTERVAL, WEBSUB_TICK_INTERVAL};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // `tracing-journald` is best-effort: the multi-user service runs in more
    // places than the reference deployment's single systemd unit, and a
    // missing journal socket shouldn't keep the whole pipeline from starting.
    let journald_layer = match tracing_journald::layer() {
        Ok(layer) => Some(layer),
        Err(error) => {
            eprintln!("tracing journald subscriber unavailable, logging to stdout only: {error}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(journald_layer)
        .with(ErrorLayer::default())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let vault = match &config.key_directory {
        Some(directory) => TokenVault::load_from_directory(directory)
            .wrap_err("failed to load data protection key")?,
        None => {
            tracing::warn!("DATA_PROTECTION_KEY_DIRECTORY not set, using an ephemeral key (dev only)");
            TokenVault::ephemeral()
        }
    };

    let http = reqwest::Client::builder()
        .https_only(true)
        .build()
        .wrap_err("unable to build reqwest client")?;

    let db = Database::connect(&config.database_url)
        .await
        .wrap_err("unable to connect to database")?;
    Migrator::up(&db, None).await?;

    let platform_client = PlatformClient::new(
        http.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    );

    let video_queue_notify = Arc::new(Notify::const_new());
    let websub_notify = Arc::new(Notify::const_new());

    let shutdown = CancellationToken::new();
    let tasks = TaskTracker::new();

    let mut refresh_task = tasks.spawn(refresh::run(
        shutdown.clone(),
        db.clone(),
        platform_client.clone(),
        vault.clone(),
        TOKEN_REFRESH_TICK_INTERVAL,
    ));

    let mut websub_task = tasks.spawn(websub::run(
        shutdown.clone(),
        db.clone(),
        websub::WebSubManager::new(http.clone(), config.webhook_callback_url()),
        websub_notify.clone(),
        WEBSUB_TICK_INTERVAL,
    ));

    let mut poller_task = tasks.spawn(poller::run(
        shutdown.clone(),
        db.clone(),
        platform_client.clone(),
        vault.clone(),
        config.polling_interval,
    ));

    let mut fanout_task = tasks.spawn(fanout::run(
        shutdown.clone(),
        db.clone(),
        platform_client.clone(),
        vault.clone(),
        config.fanout_interval,
    ));

    let mut server_task = tasks.spawn(server::run(
        shutdown.clone(),
        config.bind_addr.clone(),
        db,
        platform_client,
        vault,
        config.operator_token.clone(),
        config.platform_host.clone(),
        video_queue_notify,
        websub_notify,
    ));

    let mut sigint = tokio::signal::unix::signal(SignalKind::interrupt())?;
    let mut sigquit = tokio::signal::unix::signal(SignalKind::quit())?;
    let mut sighup = tokio::signal::unix::signal(SignalKind::hangup())?;
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;

    let mut shutdown_signal = async move || {
        tokio::select! {
            Some(_) = sigint.recv() => tracing::info!("received SIGINT"),
            Some(_) = sigquit.recv() => tracing::info!("received SIGQUIT"),
            Some(_) = sighup.recv() => tracing::info!("received SIGHUP"),
            Some(_) = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    };

    tokio::select! {
        result = &mut refresh_task => tracing::error!(?result, "token refresh loop exited"),
        result = &mut websub_task => tracing::error!(?result, "websub manager exited"),
        result = &mut poller_task => tracing::error!(?result, "fallback poller exited"),
        result = &mut fanout_task => tracing::error!(?result, "fan-out processor exited"),
        result = &mut server_task => tracing::error!(?result, "http server exited"),
        _ = shutdown_signal() => tracing::warn!("shutdown requested"),
    }

    shutdown.cancel();
    tasks.close();

    tokio::select! {
        () = tasks.wait() => tracing::info!("exited gracefully"),
        _ = shutdown_signal() => tracing::warn!("second shutdown request during drain, exiting immediately"),
    }

    Ok(())
}
