use moodcam_core::{ModelPaths, Mode, StabilityFilter};
use moodcam_hw::{CaptureConstraints, FacingMode};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How sampling ticks are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplingMode {
    /// Sample on a fixed interval; ticks that land while a call is in
    /// flight are skipped.
    Continuous { interval_ms: u64 },
    /// Sample only on an explicit Check.
    OnDemand,
}

impl SamplingMode {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            SamplingMode::Continuous { interval_ms } => Some(Duration::from_millis(*interval_ms)),
            SamplingMode::OnDemand => None,
        }
    }
}

/// Per-session tunables handed to the state machine.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub constraints: CaptureConstraints,
    pub start_mode: Mode,
    pub sampling: SamplingMode,
    pub filter: StabilityFilter,
    pub celebration: Duration,
    /// How long Restart and Shutdown wait for an in-flight call before
    /// abandoning it.
    pub shutdown_grace: Duration,
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
    pub start_mode: Mode,
    pub sampling: SamplingMode,
    /// Dominant expression score must exceed this for a mood result.
    pub mood_threshold: f32,
    /// Face detection score must exceed this for an age/gender read.
    pub age_quality_threshold: f32,
    pub celebration_secs: u64,
    pub shutdown_grace_ms: u64,
    /// Random draws per commentary pick before accepting a repeat.
    pub retry_attempts: usize,
    pub audio_enabled: bool,
    /// Program that plays one sound file given as its only argument.
    pub audio_player: String,
    pub sound_dir: PathBuf,
    /// Replaces the built-in commentary catalog when set.
    pub commentary_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `MOODCAM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = CaptureConstraints::default();

        let model_dir = var("MOODCAM_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(moodcam_core::default_model_dir);

        let sound_dir = var("MOODCAM_SOUND_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/usr/share/moodcam/sounds"));

        let interval_ms = parse_or(&var, "MOODCAM_SAMPLE_INTERVAL_MS", 2000u64).max(1);
        let sampling = match var("MOODCAM_SAMPLING").as_deref() {
            Some("on_demand") | Some("on-demand") | Some("manual") => SamplingMode::OnDemand,
            Some("continuous") | None => SamplingMode::Continuous { interval_ms },
            Some(other) => {
                tracing::warn!(value = other, "unknown MOODCAM_SAMPLING; using continuous");
                SamplingMode::Continuous { interval_ms }
            }
        };

        Self {
            camera_device: var("MOODCAM_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir,
            width: parse_or(&var, "MOODCAM_WIDTH", defaults.width),
            height: parse_or(&var, "MOODCAM_HEIGHT", defaults.height),
            facing: parse_or(&var, "MOODCAM_FACING", defaults.facing),
            start_mode: parse_or(&var, "MOODCAM_MODE", Mode::default()),
            sampling,
            mood_threshold: parse_or(
                &var,
                "MOODCAM_MOOD_THRESHOLD",
                moodcam_core::filter::DEFAULT_MOOD_THRESHOLD,
            ),
            age_quality_threshold: parse_or(
                &var,
                "MOODCAM_AGE_QUALITY_THRESHOLD",
                moodcam_core::filter::DEFAULT_AGE_QUALITY_THRESHOLD,
            ),
            celebration_secs: parse_or(&var, "MOODCAM_CELEBRATION_SECS", 5),
            shutdown_grace_ms: parse_or(&var, "MOODCAM_SHUTDOWN_GRACE_MS", 2000),
            retry_attempts: parse_or(
                &var,
                "MOODCAM_RETRY_ATTEMPTS",
                moodcam_core::rotator::DEFAULT_RETRY_ATTEMPTS,
            ),
            audio_enabled: var("MOODCAM_AUDIO_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
            audio_player: var("MOODCAM_AUDIO_PLAYER").unwrap_or_else(|| "paplay".to_string()),
            sound_dir,
            commentary_path: var("MOODCAM_COMMENTARY_PATH").map(PathBuf::from),
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            constraints: CaptureConstraints {
                width: self.width,
                height: self.height,
                facing: self.facing,
            },
            start_mode: self.start_mode,
            sampling: self.sampling,
            filter: StabilityFilter::new(self.mood_threshold, self.age_quality_threshold),
            celebration: Duration::from_secs(self.celebration_secs),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.camera_device, "/dev/video0");
        assert_eq!((c.width, c.height), (720, 560));
        assert_eq!(c.start_mode, Mode::Mood);
        assert_eq!(c.sampling, SamplingMode::Continuous { interval_ms: 2000 });
        assert_eq!(c.mood_threshold, 0.5);
        assert_eq!(c.age_quality_threshold, 0.7);
        assert_eq!(c.celebration_secs, 5);
        assert_eq!(c.session_settings().shutdown_grace, Duration::from_secs(2));
        assert_eq!(c.retry_attempts, 5);
        assert!(c.audio_enabled);
        assert_eq!(c.audio_player, "paplay");
        assert!(c.commentary_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("MOODCAM_CAMERA_DEVICE", "/dev/video2"),
            ("MOODCAM_MODE", "age"),
            ("MOODCAM_SAMPLING", "on_demand"),
            ("MOODCAM_MOOD_THRESHOLD", "0.3"),
            ("MOODCAM_FACING", "environment"),
            ("MOODCAM_AUDIO_ENABLED", "0"),
            ("MOODCAM_COMMENTARY_PATH", "/etc/moodcam/lines.toml"),
        ]);
        assert_eq!(c.camera_device, "/dev/video2");
        assert_eq!(c.start_mode, Mode::Age);
        assert_eq!(c.sampling, SamplingMode::OnDemand);
        assert_eq!(c.mood_threshold, 0.3);
        assert_eq!(c.facing, FacingMode::Environment);
        assert!(!c.audio_enabled);
        assert_eq!(c.commentary_path, Some(PathBuf::from("/etc/moodcam/lines.toml")));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let c = config(&[
            ("MOODCAM_MOOD_THRESHOLD", "lots"),
            ("MOODCAM_SAMPLING", "sometimes"),
            ("MOODCAM_SAMPLE_INTERVAL_MS", "0"),
        ]);
        assert_eq!(c.mood_threshold, 0.5);
        assert_eq!(c.sampling, SamplingMode::Continuous { interval_ms: 1 });
    }

    #[test]
    fn test_session_settings() {
        let c = config(&[("MOODCAM_SAMPLE_INTERVAL_MS", "1200"), ("MOODCAM_WIDTH", "640")]);
        let s = c.session_settings();
        assert_eq!(s.constraints.width, 640);
        assert_eq!(s.sampling.interval(), Some(Duration::from_millis(1200)));
        assert_eq!(s.celebration, Duration::from_secs(5));
        assert_eq!(SamplingMode::OnDemand.interval(), None);
    }
}
