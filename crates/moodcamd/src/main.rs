use anyhow::{Context, Result};
use moodcam_core::{CommentaryCatalog, MessageRotator};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod audio;
mod backends;
mod config;
mod dbus_interface;
mod effects;
mod engine;
mod error;
mod sampler;
mod state;
#[cfg(test)]
mod testing;

use audio::{CommandCuePlayer, CuePlayer, SilentCuePlayer};
use backends::DeviceBackends;
use config::Config;
use dbus_interface::{MoodCamService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "moodcamd starting");

    let config = Config::from_env();

    let catalog = match &config.commentary_path {
        Some(path) => CommentaryCatalog::load(path)
            .with_context(|| format!("loading commentary from {}", path.display()))?,
        None => CommentaryCatalog::embedded().context("loading built-in commentary")?,
    };
    let rotator = MessageRotator::new(Arc::new(catalog), config.retry_attempts);

    let cues: Arc<dyn CuePlayer> = if config.audio_enabled {
        Arc::new(CommandCuePlayer::new(&config.audio_player, &config.sound_dir))
    } else {
        tracing::info!("audio cues disabled via MOODCAM_AUDIO_ENABLED=0");
        Arc::new(SilentCuePlayer)
    };

    let backends = Arc::new(DeviceBackends::new(&config.camera_device, config.model_paths()));
    tracing::info!(
        device = %config.camera_device,
        models = %config.model_dir.display(),
        "session backends configured"
    );

    let session = engine::spawn_session(config.session_settings(), backends, rotator, cues);

    let conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, MoodCamService::new(session.clone()))?
        .build()
        .await
        .context("registering on the session bus")?;

    let forwarder = tokio::spawn(dbus_interface::forward_state_changes(
        conn.clone(),
        session.subscribe(),
    ));

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "moodcamd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("moodcamd shutting down");

    if let Err(e) = session.shutdown().await {
        tracing::warn!(error = %e, "session already stopped");
    }
    forwarder.abort();

    Ok(())
}
