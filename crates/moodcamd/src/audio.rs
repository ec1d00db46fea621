//! Best-effort sound cues for mood results.

use moodcam_core::ExpressionLabel;
use std::path::PathBuf;
use std::process::Stdio;

/// Plays the cue for a mood. Must not block and must never fail the caller.
pub trait CuePlayer: Send + Sync {
    fn play(&self, label: ExpressionLabel);
}

/// Sound file for each mood. Labels without their own recording share one.
pub fn cue_file(label: ExpressionLabel) -> &'static str {
    match label {
        ExpressionLabel::Happy | ExpressionLabel::Fearful | ExpressionLabel::Disgusted => "happy.wav",
        ExpressionLabel::Sad => "sad.wav",
        ExpressionLabel::Angry => "angry.wav",
        ExpressionLabel::Surprised => "surprise.wav",
        ExpressionLabel::Neutral => "neutral.mp3",
    }
}

/// Spawns an external player (e.g. `paplay`) per cue without waiting for it.
pub struct CommandCuePlayer {
    player: String,
    sound_dir: PathBuf,
}

impl CommandCuePlayer {
    pub fn new(player: impl Into<String>, sound_dir: impl Into<PathBuf>) -> Self {
        Self {
            player: player.into(),
            sound_dir: sound_dir.into(),
        }
    }
}

impl CuePlayer for CommandCuePlayer {
    fn play(&self, label: ExpressionLabel) {
        let path = self.sound_dir.join(cue_file(label));
        let spawned = tokio::process::Command::new(&self.player)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(player = %self.player, error = %e, "audio cue failed to start");
                return;
            }
        };

        tracing::debug!(%label, path = %path.display(), "audio cue started");
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    tracing::warn!(%status, path = %path.display(), "audio cue player failed")
                }
                Err(e) => tracing::warn!(error = %e, "audio cue player lost"),
            }
        });
    }
}

/// Used when audio is disabled.
pub struct SilentCuePlayer;

impl CuePlayer for SilentCuePlayer {
    fn play(&self, label: ExpressionLabel) {
        tracing::trace!(%label, "audio disabled; cue dropped");
    }
}
