//! Single-slot inference dispatch.
//!
//! The capture session and the backend travel together into one blocking
//! job and come back with its result. While they are away the adapter is
//! busy, which is the only in-flight guard the session needs: a second call
//! cannot start because there is nothing to start it with.
//!
//! A call that never returns (a wedged V4L2 dequeue, a hung backend) is
//! abandoned on shutdown after a grace period. The detached job keeps the
//! resources and drops them, closing the device, if it ever returns.

use crate::error::SessionError;
use moodcam_core::{FeatureSet, InferenceBackend, RawDetection};
use moodcam_hw::CaptureSession;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Everything a sample needs, owned by whichever side currently holds it.
pub struct SessionResources {
    pub capture: CaptureSession,
    pub backend: Box<dyn InferenceBackend>,
}

/// Result of one inference call.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Generation the call was started under.
    pub generation: u64,
    pub detection: Option<RawDetection>,
    /// The frame grab or the backend failed; `detection` is `None`.
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRefused {
    /// A call is already in flight.
    Busy,
    /// No resources installed (not loaded, or torn down).
    Unloaded,
}

#[derive(Default)]
pub struct InferenceAdapter {
    idle: Option<SessionResources>,
    in_flight: Option<JoinHandle<(SessionResources, Sample)>>,
}

impl InferenceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, resources: SessionResources) {
        self.idle = Some(resources);
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.idle.is_some() || self.in_flight.is_some()
    }

    /// Start one grab + inspect call on the blocking pool.
    pub fn start(&mut self, features: FeatureSet, generation: u64) -> Result<(), StartRefused> {
        if self.in_flight.is_some() {
            return Err(StartRefused::Busy);
        }
        let mut resources = self.idle.take().ok_or(StartRefused::Unloaded)?;

        self.in_flight = Some(tokio::task::spawn_blocking(move || {
            let (detection, failed) = sample_once(&mut resources, features);
            let sample = Sample {
                generation,
                detection,
                failed,
            };
            (resources, sample)
        }));
        Ok(())
    }

    /// Wait for the in-flight call. Pending forever when nothing is in
    /// flight, so it can sit in a `select!` unconditionally.
    ///
    /// A panicking job loses the resources with it; that is reported as a
    /// terminal error.
    pub async fn finished(&mut self) -> Result<Sample, SessionError> {
        let Some(handle) = self.in_flight.as_mut() else {
            return std::future::pending().await;
        };
        let joined = handle.await;
        self.in_flight = None;

        match joined {
            Ok((resources, sample)) => {
                self.idle = Some(resources);
                Ok(sample)
            }
            Err(e) => Err(SessionError::WorkerCrashed(e.to_string())),
        }
    }

    /// Wait up to `grace` for an in-flight call, then release the camera
    /// and drop the backend. A call still running after that is detached.
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.in_flight.is_some() {
            let waited = tokio::time::timeout(grace, self.finished()).await;
            match waited {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "in-flight call failed during shutdown"),
                Err(_) => {
                    self.in_flight = None;
                    tracing::warn!(
                        grace_ms = grace.as_millis() as u64,
                        "inference call still running; abandoning it"
                    );
                }
            }
        }
        if let Some(mut resources) = self.idle.take() {
            resources.capture.release();
        }
    }
}

fn sample_once(resources: &mut SessionResources, features: FeatureSet) -> (Option<RawDetection>, bool) {
    let frame = match resources.capture.grab() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "frame grab failed; treating as no face");
            return (None, true);
        }
    };

    let started = Instant::now();
    let result = resources
        .backend
        .inspect(&frame.data, frame.width, frame.height, features);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(detection) => {
            tracing::debug!(
                backend = resources.backend.name(),
                sequence = frame.sequence,
                elapsed_ms,
                face = detection.is_some(),
                "inference call finished"
            );
            (detection, false)
        }
        Err(e) => {
            tracing::warn!(
                backend = resources.backend.name(),
                error = %e,
                elapsed_ms,
                "inference call failed; treating as no face"
            );
            (None, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackends, Step};
    use crate::backends::SessionBackends;
    use moodcam_core::{Mode, RawDetection};
    use moodcam_hw::CaptureConstraints;

    fn adapter(backends: &FakeBackends) -> InferenceAdapter {
        let mut adapter = InferenceAdapter::new();
        adapter.install(SessionResources {
            capture: backends.acquire_capture(&CaptureConstraints::default()).unwrap(),
            backend: backends.load_backend().unwrap(),
        });
        adapter
    }

    #[tokio::test]
    async fn test_second_start_is_refused_while_busy() {
        let backends = FakeBackends::default();
        let (release, step) = Step::blocked(Some(RawDetection::face(0.9)));
        backends.script.push(step);
        let mut adapter = adapter(&backends);

        adapter.start(Mode::Mood.features(), 1).unwrap();
        assert!(adapter.is_busy());
        assert_eq!(adapter.start(Mode::Mood.features(), 1), Err(StartRefused::Busy));

        release.send(()).unwrap();
        let sample = adapter.finished().await.unwrap();
        assert_eq!(sample.generation, 1);
        assert!(sample.detection.is_some());
        assert!(!adapter.is_busy());
        assert_eq!(backends.script.calls(), 1);

        adapter.start(Mode::Mood.features(), 2).unwrap();
        assert_eq!(adapter.finished().await.unwrap().generation, 2);
    }

    #[tokio::test]
    async fn test_backend_failure_yields_failed_sample() {
        let backends = FakeBackends::default();
        backends.script.push(Step::Fail);
        let mut adapter = adapter(&backends);

        adapter.start(Mode::Age.features(), 0).unwrap();
        let sample = adapter.finished().await.unwrap();
        assert!(sample.failed);
        assert!(sample.detection.is_none());
        assert_eq!(backends.script.features(), vec![Mode::Age.features()]);
    }

    #[tokio::test]
    async fn test_panic_is_terminal() {
        let backends = FakeBackends::default();
        backends.script.push(Step::Panic);
        let mut adapter = adapter(&backends);

        adapter.start(Mode::Mood.features(), 0).unwrap();
        assert!(matches!(adapter.finished().await, Err(SessionError::WorkerCrashed(_))));
        assert!(!adapter.is_loaded());
        assert_eq!(adapter.start(Mode::Mood.features(), 0), Err(StartRefused::Unloaded));
    }

    #[tokio::test]
    async fn test_shutdown_waits_then_releases() {
        let backends = FakeBackends::default();
        let (release, step) = Step::blocked(None);
        backends.script.push(step);
        let mut adapter = adapter(&backends);
        adapter.start(Mode::Mood.features(), 0).unwrap();

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            release.send(()).unwrap();
        });
        adapter.shutdown(Duration::from_secs(5)).await;
        releaser.join().unwrap();

        assert!(!adapter.is_loaded());
        assert_eq!(backends.released(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_stuck_call() {
        let backends = FakeBackends::default();
        let (release, step) = Step::blocked(None);
        backends.script.push(step);
        let mut adapter = adapter(&backends);
        adapter.start(Mode::Mood.features(), 0).unwrap();

        tokio::time::timeout(Duration::from_secs(5), adapter.shutdown(Duration::from_millis(20)))
            .await
            .expect("shutdown should not wait for the stuck call");
        assert!(!adapter.is_busy());
        assert!(!adapter.is_loaded());
        assert_eq!(backends.released(), 0);

        // The detached job closes the camera once the call returns.
        drop(release);
        for _ in 0..100 {
            if backends.released() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backends.released(), 1);
    }

    #[tokio::test]
    async fn test_unloaded_adapter_refuses() {
        let mut adapter = InferenceAdapter::new();
        assert_eq!(adapter.start(Mode::Mood.features(), 0), Err(StartRefused::Unloaded));
    }
}
