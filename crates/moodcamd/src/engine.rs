//! The session state machine.
//!
//! One task owns the session: it loads resources, paces sampling, decides
//! outcomes and fires effects. Everything else talks to it through a
//! [`SessionHandle`] and reads the published [`SessionState`].
//!
//! Loading runs on the blocking pool while the task keeps serving commands:
//! a Check during `Loading` is refused with `NotReady`, a mode change is
//! applied at once, and a Restart answers when the new load settles.

use crate::audio::CuePlayer;
use crate::backends::SessionBackends;
use crate::config::SessionSettings;
use crate::effects::EffectCoordinator;
use crate::error::{EngineError, SessionError};
use crate::sampler::{InferenceAdapter, Sample, SessionResources, StartRefused};
use crate::state::{Phase, SessionState};
use chrono::Utc;
use moodcam_core::{MessageRotator, Mode, Outcome, StabilityFilter};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Interval, MissedTickBehavior};

type StateReply = oneshot::Sender<Result<SessionState, EngineError>>;
type LoadJob = JoinHandle<Result<SessionResources, SessionError>>;

/// Messages sent from the control surface to the session task.
enum SessionCommand {
    SetMode { mode: Mode, reply: StateReply },
    Check { reply: StateReply },
    Restart { reply: StateReply },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Clone-safe handle to the session task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Switch classification mode. Returns the state after the reset.
    pub async fn set_mode(&self, mode: Mode) -> Result<SessionState, EngineError> {
        self.request(|reply| SessionCommand::SetMode { mode, reply }).await
    }

    /// Sample now and wait for the decided outcome.
    pub async fn check(&self) -> Result<SessionState, EngineError> {
        self.request(|reply| SessionCommand::Check { reply }).await
    }

    /// Tear down capture and backend and load them again. Returns once the
    /// new load has settled, in `Ready` or `Error`.
    pub async fn restart(&self) -> Result<SessionState, EngineError> {
        self.request(|reply| SessionCommand::Restart { reply }).await
    }

    /// Stop the session task, releasing the camera.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Shutdown { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    async fn request(
        &self,
        command: impl FnOnce(StateReply) -> SessionCommand,
    ) -> Result<SessionState, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Start a session on the current runtime. Loading begins immediately.
pub fn spawn_session(
    settings: SessionSettings,
    backends: Arc<dyn SessionBackends>,
    rotator: MessageRotator,
    cues: Arc<dyn CuePlayer>,
) -> SessionHandle {
    let (machine, handle) = SessionStateMachine::new(settings, backends, rotator, cues);
    tokio::spawn(machine.run());
    handle
}

struct SessionStateMachine {
    settings: SessionSettings,
    filter: StabilityFilter,
    backends: Arc<dyn SessionBackends>,
    commands: mpsc::Receiver<SessionCommand>,
    published: watch::Sender<SessionState>,
    adapter: InferenceAdapter,
    effects: EffectCoordinator,
    rotator: MessageRotator,
    /// Present only in continuous mode while the session is usable.
    ticker: Option<Interval>,
    state: SessionState,
    /// Bumped on every mode change and restart; older results are stale.
    generation: u64,
    /// Caller waiting on an explicit Check.
    pending_check: Option<StateReply>,
    /// Capture + backend load running on the blocking pool.
    loading: Option<LoadJob>,
    /// Restart callers waiting for the load to settle.
    load_waiters: Vec<StateReply>,
}

impl SessionStateMachine {
    fn new(
        settings: SessionSettings,
        backends: Arc<dyn SessionBackends>,
        rotator: MessageRotator,
        cues: Arc<dyn CuePlayer>,
    ) -> (Self, SessionHandle) {
        let state = SessionState::new(settings.start_mode, settings.sampling);
        let (published, state_rx) = watch::channel(state.clone());
        let (tx, commands) = mpsc::channel(8);

        let machine = SessionStateMachine {
            effects: EffectCoordinator::new(settings.celebration, cues),
            filter: settings.filter,
            settings,
            backends,
            commands,
            published,
            adapter: InferenceAdapter::new(),
            rotator,
            ticker: None,
            state,
            generation: 0,
            pending_check: None,
            loading: None,
            load_waiters: Vec::new(),
        };
        (machine, SessionHandle { tx, state: state_rx })
    }

    async fn run(mut self) {
        tracing::info!(
            session = %self.state.session_id,
            mode = %self.state.mode,
            sampling = ?self.settings.sampling,
            "session starting"
        );
        self.load();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        self.teardown().await;
                        break;
                    };
                    if !self.handle(command).await {
                        break;
                    }
                }
                loaded = load_finished(&mut self.loading) => {
                    self.loading = None;
                    self.on_loaded(loaded);
                }
                _ = next_tick(&mut self.ticker) => self.on_tick(),
                finished = self.adapter.finished() => match finished {
                    Ok(sample) => self.on_sample(sample),
                    Err(e) => self.fail(e),
                },
                _ = self.effects.expired() => {
                    self.effects.expire();
                    self.publish();
                }
            }
        }

        tracing::info!(session = %self.state.session_id, "session stopped");
    }

    /// Returns `false` once the session should stop.
    async fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::SetMode { mode, reply } => {
                self.set_mode(mode);
                let _ = reply.send(Ok(self.state.clone()));
            }
            SessionCommand::Check { reply } => self.check(reply),
            SessionCommand::Restart { reply } => {
                self.restart().await;
                self.load_waiters.push(reply);
            }
            SessionCommand::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Start acquiring the camera, then loading the models, off the task.
    /// A failure in either drops whatever was acquired.
    fn load(&mut self) {
        self.set_phase(Phase::Loading);
        self.state.error = None;
        self.publish();

        let backends = self.backends.clone();
        let constraints = self.settings.constraints;
        self.loading = Some(tokio::task::spawn_blocking(move || -> Result<SessionResources, SessionError> {
            let capture = backends.acquire_capture(&constraints)?;
            let backend = backends.load_backend()?;
            Ok(SessionResources { capture, backend })
        }));
    }

    fn on_loaded(&mut self, loaded: Result<Result<SessionResources, SessionError>, JoinError>) {
        match loaded {
            Ok(Ok(resources)) => {
                tracing::info!(backend = resources.backend.name(), "session ready");
                self.adapter.install(resources);
                self.ticker = self.settings.sampling.interval().map(|period| {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    ticker
                });
                self.set_phase(Phase::Ready);
                self.publish();
            }
            Ok(Err(e)) => self.fail(e),
            Err(e) => self.fail(SessionError::WorkerCrashed(e.to_string())),
        }
        for reply in self.load_waiters.drain(..) {
            let _ = reply.send(Ok(self.state.clone()));
        }
    }

    /// Release everything the session holds. An in-flight call gets the
    /// configured grace period; a pending load is abandoned outright.
    async fn teardown(&mut self) {
        self.ticker = None;
        if self.loading.take().is_some() {
            tracing::info!("abandoning load in progress");
        }
        self.adapter.shutdown(self.settings.shutdown_grace).await;
        self.effects.cancel();
        if let Some(reply) = self.pending_check.take() {
            let _ = reply.send(Err(EngineError::NotReady(self.state.phase)));
        }
    }

    async fn restart(&mut self) {
        tracing::info!(phase = %self.state.phase, "restart requested");
        self.teardown().await;
        self.generation += 1;
        self.state.clear_outcome();
        self.rotator.reset();
        self.load();
    }

    fn fail(&mut self, err: SessionError) {
        tracing::error!(error = %err, "session failed; restart required");
        self.ticker = None;
        self.effects.cancel();
        self.state.error = Some(err.to_string());
        self.set_phase(Phase::Error);
        if let Some(reply) = self.pending_check.take() {
            let _ = reply.send(Err(EngineError::NotReady(Phase::Error)));
        }
        self.publish();
    }

    fn set_mode(&mut self, mode: Mode) {
        if mode == self.state.mode {
            return;
        }
        tracing::info!(from = %self.state.mode, to = %mode, "mode changed");

        self.state.mode = mode;
        self.generation += 1;
        self.state.clear_outcome();
        self.effects.cancel();
        self.rotator.reset();
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.reset_immediately();
        }
        self.publish();
    }

    fn check(&mut self, reply: StateReply) {
        if self.state.phase == Phase::Error || !self.adapter.is_loaded() {
            let _ = reply.send(Err(EngineError::NotReady(self.state.phase)));
            return;
        }
        if self.pending_check.is_some() || self.adapter.is_busy() {
            let _ = reply.send(Err(EngineError::Busy));
            return;
        }
        if self.start_sample() {
            self.pending_check = Some(reply);
        } else {
            let _ = reply.send(Err(EngineError::Busy));
        }
    }

    fn on_tick(&mut self) {
        if self.adapter.is_busy() {
            self.state.stats.skipped_ticks += 1;
            tracing::debug!(
                skipped = self.state.stats.skipped_ticks,
                "tick skipped; inference call still in flight"
            );
            return;
        }
        self.start_sample();
    }

    fn start_sample(&mut self) -> bool {
        match self.adapter.start(self.state.mode.features(), self.generation) {
            Ok(()) => {
                self.set_phase(Phase::Scanning);
                self.publish();
                true
            }
            Err(StartRefused::Busy) => false,
            Err(StartRefused::Unloaded) => {
                tracing::warn!("sample requested without loaded resources");
                false
            }
        }
    }

    fn on_sample(&mut self, sample: Sample) {
        self.set_phase(Phase::Idle);

        if sample.generation != self.generation {
            self.state.stats.stale_results += 1;
            tracing::debug!(
                started = sample.generation,
                current = self.generation,
                "discarding result from before a mode change"
            );
        } else {
            self.state.stats.samples += 1;
            if sample.failed {
                self.state.stats.inference_failures += 1;
            }
            let outcome = self.filter.decide(sample.detection.as_ref(), self.state.mode);
            self.apply(outcome);
        }

        self.publish();
        if let Some(reply) = self.pending_check.take() {
            let _ = reply.send(Ok(self.state.clone()));
        }
    }

    /// Record the outcome; effects and commentary fire only when its
    /// category differs from the previous one.
    fn apply(&mut self, outcome: Outcome) {
        let changed = self
            .state
            .last_outcome
            .as_ref()
            .map(Outcome::category)
            != Some(outcome.category());

        if changed {
            tracing::info!(mode = %self.state.mode, outcome = %outcome, "outcome changed");
            self.effects.trigger(&outcome);
            self.state.message = outcome.commentary().map(|category| self.rotator.pick(category));
        }

        self.state.display = Some(outcome.to_string());
        self.state.last_outcome = Some(outcome);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.state.phase != phase {
            tracing::debug!(from = %self.state.phase, to = %phase, "phase transition");
            self.state.phase = phase;
        }
    }

    fn publish(&mut self) {
        self.state.effects.celebrating = self.effects.is_celebrating();
        self.state.effects.celebration_until = self.effects.celebration_until();
        self.state.effects.scan_line_on = self.adapter.is_busy();
        self.state.updated_at = Utc::now();
        self.published.send_replace(self.state.clone());
    }
}

/// Result of the pending load; pending forever when nothing is loading.
async fn load_finished(
    loading: &mut Option<LoadJob>,
) -> Result<Result<SessionResources, SessionError>, JoinError> {
    match loading {
        Some(job) => job.await,
        None => std::future::pending().await,
    }
}

/// Next sampling tick; pending forever without a ticker.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
