//! The published session record.

use crate::config::SamplingMode;
use chrono::{DateTime, Utc};
use moodcam_core::{Mode, Outcome};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Acquiring the camera and loading models.
    Loading,
    /// Set up, nothing sampled yet.
    Ready,
    /// An inference call is in flight.
    Scanning,
    /// Between samples.
    Idle,
    /// Setup or the worker failed; waiting for a restart.
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Scanning => "scanning",
            Phase::Idle => "idle",
            Phase::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EffectsState {
    pub celebrating: bool,
    pub celebration_until: Option<DateTime<Utc>>,
    pub scan_line_on: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Samples decided since the daemon started, across mode changes and
    /// restarts. Stale results are counted separately.
    pub samples: u64,
    pub skipped_ticks: u64,
    /// Frame grab or backend failures (each decided as no face).
    pub inference_failures: u64,
    /// Results discarded because the mode changed while they were in flight.
    pub stale_results: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub phase: Phase,
    pub mode: Mode,
    pub sampling: SamplingMode,
    pub last_outcome: Option<Outcome>,
    /// Display text for `last_outcome`. Presentation only.
    pub display: Option<String>,
    pub message: Option<String>,
    pub effects: EffectsState,
    pub error: Option<String>,
    pub stats: Stats,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(mode: Mode, sampling: SamplingMode) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            phase: Phase::Loading,
            mode,
            sampling,
            last_outcome: None,
            display: None,
            message: None,
            effects: EffectsState::default(),
            error: None,
            stats: Stats::default(),
            updated_at: Utc::now(),
        }
    }

    /// Forget the current outcome and its commentary.
    pub fn clear_outcome(&mut self) {
        self.last_outcome = None;
        self.display = None;
        self.message = None;
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialise session state");
            "{}".to_string()
        })
    }
}
