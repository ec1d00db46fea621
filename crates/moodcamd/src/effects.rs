//! Celebration window and audio cue dispatch.

use crate::audio::CuePlayer;
use chrono::{DateTime, Utc};
use moodcam_core::Outcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Owns the celebration deadline for one session.
///
/// The deadline is a plain value polled by the session loop through
/// [`expired`](Self::expired), so re-triggering replaces it and teardown
/// drops it with the session.
pub struct EffectCoordinator {
    duration: Duration,
    deadline: Option<Instant>,
    until: Option<DateTime<Utc>>,
    cues: Arc<dyn CuePlayer>,
}

impl EffectCoordinator {
    pub fn new(duration: Duration, cues: Arc<dyn CuePlayer>) -> Self {
        Self {
            duration,
            deadline: None,
            until: None,
            cues,
        }
    }

    /// Apply the effects for a newly decided outcome.
    ///
    /// A mood result (re)starts the celebration and plays its cue; anything
    /// else turns the celebration off.
    pub fn trigger(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::MoodResult { label, .. } => {
                let restarted = self.deadline.is_some();
                self.deadline = Some(Instant::now() + self.duration);
                self.until = chrono::Duration::from_std(self.duration)
                    .ok()
                    .map(|d| Utc::now() + d);
                tracing::debug!(%label, restarted, secs = self.duration.as_secs_f32(), "celebration started");
                self.cues.play(*label);
            }
            _ => {
                self.cancel();
            }
        }
    }

    /// Turn the celebration off. Returns whether one was active.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.deadline.take().is_some();
        self.until = None;
        if was_active {
            tracing::debug!("celebration cancelled");
        }
        was_active
    }

    /// Resolves when the active celebration's deadline passes; pending
    /// forever while none is active.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Clear an elapsed celebration.
    pub fn expire(&mut self) {
        if self.deadline.take().is_some() {
            self.until = None;
            tracing::debug!("celebration expired");
        }
    }

    pub fn is_celebrating(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn celebration_until(&self) -> Option<DateTime<Utc>> {
        self.until
    }
}
