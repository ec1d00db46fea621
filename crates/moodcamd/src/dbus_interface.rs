use crate::engine::SessionHandle;
use crate::error::EngineError;
use crate::state::SessionState;
use moodcam_core::Mode;
use tokio::sync::watch;
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.freedesktop.MoodCam1";
pub const OBJECT_PATH: &str = "/org/freedesktop/MoodCam1";

/// D-Bus interface for the MoodCam daemon.
///
/// Bus name: org.freedesktop.MoodCam1
/// Object path: /org/freedesktop/MoodCam1
pub struct MoodCamService {
    session: SessionHandle,
}

impl MoodCamService {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Busy => zbus::fdo::Error::LimitsExceeded(err.to_string()),
        EngineError::NotReady(_) => zbus::fdo::Error::Failed(err.to_string()),
        EngineError::ChannelClosed => zbus::fdo::Error::Failed(err.to_string()),
    }
}

#[interface(name = "org.freedesktop.MoodCam1")]
impl MoodCamService {
    /// Switch between "mood" and "age". Returns the session state as JSON.
    async fn set_mode(&self, mode: &str) -> zbus::fdo::Result<String> {
        let mode: Mode = mode
            .parse()
            .map_err(|e: moodcam_core::ContractError| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        tracing::info!(%mode, "set_mode requested");
        let state = self.session.set_mode(mode).await.map_err(to_fdo)?;
        Ok(state.to_json())
    }

    /// Sample one frame now and return the resulting state as JSON.
    async fn check(&self) -> zbus::fdo::Result<String> {
        tracing::info!("check requested");
        let state = self.session.check().await.map_err(to_fdo)?;
        Ok(state.to_json())
    }

    /// Release and reacquire the camera and models.
    async fn restart(&self) -> zbus::fdo::Result<String> {
        tracing::info!("restart requested");
        let state = self.session.restart().await.map_err(to_fdo)?;
        Ok(state.to_json())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let state = self.session.snapshot();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "session": state,
        })
        .to_string())
    }

    /// Emitted with the full state JSON whenever the session publishes.
    #[zbus(signal)]
    async fn state_changed(emitter: &SignalEmitter<'_>, state: &str) -> zbus::Result<()>;
}

/// Forward every published state as a `StateChanged` signal until the
/// session stops.
pub async fn forward_state_changes(
    conn: zbus::Connection,
    mut states: watch::Receiver<SessionState>,
) -> zbus::Result<()> {
    let iface = conn
        .object_server()
        .interface::<_, MoodCamService>(OBJECT_PATH)
        .await?;

    while states.changed().await.is_ok() {
        let json = states.borrow_and_update().to_json();
        if let Err(e) = MoodCamService::state_changed(iface.signal_emitter(), &json).await {
            tracing::warn!(error = %e, "failed to emit StateChanged");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Phase;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(to_fdo(EngineError::Busy), zbus::fdo::Error::LimitsExceeded(_)));
        match to_fdo(EngineError::NotReady(Phase::Error)) {
            zbus::fdo::Error::Failed(msg) => assert!(msg.contains("error")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }
}
