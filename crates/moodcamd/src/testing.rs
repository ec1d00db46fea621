//! In-process fakes for the camera, backend and audio seams.

use crate::audio::CuePlayer;
use crate::backends::SessionBackends;
use crate::error::SessionError;
use moodcam_core::{
    ExpressionLabel, Expressions, FeatureSet, Gender, InferenceBackend, InferenceError, RawDetection,
};
use moodcam_hw::{CameraError, CaptureConstraints, CaptureDevice, CaptureSession, Frame, FrameSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

pub(crate) fn mood(label: ExpressionLabel, score: f32) -> RawDetection {
    let mut scores = [(1.0 - score) / 6.0; 7];
    scores[label.index()] = score;
    RawDetection::face(0.95).with_expressions(Expressions::new(scores))
}

pub(crate) fn age(years: f32, gender: Gender, face_score: f32) -> RawDetection {
    RawDetection::face(face_score).with_age_gender(years, gender)
}

/// One scripted backend call.
pub(crate) enum Step {
    Detect(Option<RawDetection>),
    Fail,
    Panic,
    /// Block the calling thread until released, then detect.
    Blocked {
        release: mpsc::Receiver<()>,
        then: Option<RawDetection>,
    },
}

impl Step {
    pub fn blocked(then: Option<RawDetection>) -> (mpsc::Sender<()>, Step) {
        let (tx, rx) = mpsc::channel();
        (tx, Step::Blocked { release: rx, then })
    }
}

/// Shared queue of backend responses. When empty, calls return the fallback.
#[derive(Clone, Default)]
pub(crate) struct Script {
    steps: Arc<Mutex<VecDeque<Step>>>,
    fallback: Arc<Mutex<Option<RawDetection>>>,
    calls: Arc<AtomicUsize>,
    features: Arc<Mutex<Vec<FeatureSet>>>,
}

impl Script {
    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn detect(&self, detection: RawDetection) {
        self.push(Step::Detect(Some(detection)));
    }

    pub fn set_fallback(&self, detection: Option<RawDetection>) {
        *self.fallback.lock().unwrap() = detection;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn features(&self) -> Vec<FeatureSet> {
        self.features.lock().unwrap().clone()
    }
}

struct ScriptedBackend {
    script: Script,
}

impl InferenceBackend for ScriptedBackend {
    fn inspect(
        &mut self,
        _frame: &[u8],
        _width: u32,
        _height: u32,
        features: FeatureSet,
    ) -> Result<Option<RawDetection>, InferenceError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        self.script.features.lock().unwrap().push(features);
        let step = self.script.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(self.script.fallback.lock().unwrap().clone()),
            Some(Step::Detect(detection)) => Ok(detection),
            Some(Step::Fail) => Err(InferenceError::Failed("scripted failure".into())),
            Some(Step::Panic) => panic!("scripted panic"),
            Some(Step::Blocked { release, then }) => {
                let _ = release.recv();
                Ok(then)
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct FakeSource {
    released: Arc<AtomicUsize>,
}

impl FrameSource for FakeSource {
    fn grab(&mut self) -> Result<Frame, CameraError> {
        Ok(Frame {
            data: vec![128; 16],
            width: 4,
            height: 4,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        })
    }

    fn describe(&self) -> String {
        "fake 4x4".into()
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeDevice {
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    fail: Option<CameraError>,
}

impl CaptureDevice for FakeDevice {
    fn open(&self, _: &CaptureConstraints) -> Result<Box<dyn FrameSource>, CameraError> {
        if let Some(err) = &self.fail {
            return Err(err.clone());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            released: self.released.clone(),
        }))
    }
}

/// Camera + backend factory with switchable failures.
#[derive(Default)]
pub(crate) struct FakeBackends {
    pub script: Script,
    pub camera_failure: Mutex<Option<CameraError>>,
    pub load_failure: Mutex<Option<SessionError>>,
    load_gate: Mutex<Option<mpsc::Receiver<()>>>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl FakeBackends {
    /// Make the next model load block until the returned sender fires or
    /// is dropped.
    pub fn gate_load(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.load_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl SessionBackends for FakeBackends {
    fn acquire_capture(&self, constraints: &CaptureConstraints) -> Result<CaptureSession, SessionError> {
        let device = FakeDevice {
            opened: self.opened.clone(),
            released: self.released.clone(),
            fail: self.camera_failure.lock().unwrap().clone(),
        };
        Ok(CaptureSession::acquire(&device, constraints)?)
    }

    fn load_backend(&self) -> Result<Box<dyn InferenceBackend>, SessionError> {
        let gate = self.load_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        if let Some(err) = self.load_failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(Box::new(ScriptedBackend {
            script: self.script.clone(),
        }))
    }
}

/// Records cues instead of playing them.
#[derive(Default)]
pub(crate) struct RecordingCues {
    played: Mutex<Vec<ExpressionLabel>>,
}

impl RecordingCues {
    pub fn played(&self) -> Vec<ExpressionLabel> {
        self.played.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.played.lock().unwrap().len()
    }
}

impl CuePlayer for RecordingCues {
    fn play(&self, label: ExpressionLabel) {
        self.played.lock().unwrap().push(label);
    }
}
