use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::error::SessionError;
use crate::machines::MachineRegistry;
use crate::models::{DayOutcome, Plan, SessionSnapshot};
use crate::planner::PlannerConfig;
use crate::sync::{SinkRegistry, StoreEvent};
use crate::utils::time::local_day;
use crate::vision::{fingerprint, FrameSource, MatchPolicy, MatchVerdict, SharedCamera};

use super::clock::{Clock, SystemClock};
use super::session::{SegmentStatus, SessionPhase, SessionState};
use super::ticker::{TickReport, Ticker};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Outcome of a successful capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    pub verdict: MatchVerdict,
    pub completed: bool,
    /// The segment that just started, if any.
    pub next: Option<SegmentStatus>,
    /// Store writes that failed. The capture still counted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Owns the live session: transitions, persistence after each one, the
/// camera slot and the tick loop.
pub struct SessionController<S: FrameSource + 'static> {
    state: Arc<Mutex<SessionState>>,
    registry: MachineRegistry,
    sinks: SinkRegistry,
    camera: SharedCamera<S>,
    policy: MatchPolicy,
    planner: PlannerConfig,
    clock: Arc<dyn Clock>,
    ticker: Mutex<Option<Ticker>>,
    tick_interval: Duration,
    reports: Arc<watch::Sender<TickReport>>,
}

impl<S: FrameSource + 'static> SessionController<S> {
    pub fn new(
        registry: MachineRegistry,
        sinks: SinkRegistry,
        camera: SharedCamera<S>,
        policy: MatchPolicy,
    ) -> Self {
        Self::with_clock(registry, sinks, camera, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        registry: MachineRegistry,
        sinks: SinkRegistry,
        camera: SharedCamera<S>,
        policy: MatchPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let idle = SessionState::idle();
        let (reports, _) = watch::channel(TickReport::of(&idle, clock.now()));
        Self {
            state: Arc::new(Mutex::new(idle)),
            registry,
            sinks,
            camera,
            policy,
            planner: PlannerConfig::default(),
            clock,
            ticker: Mutex::new(None),
            tick_interval: Duration::from_secs(1),
            reports: Arc::new(reports),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_planner(mut self, planner: PlannerConfig) -> Self {
        self.planner = planner;
        self
    }

    pub fn camera(&self) -> &SharedCamera<S> {
        &self.camera
    }

    pub fn subscribe(&self) -> watch::Receiver<TickReport> {
        self.reports.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn report(&self) -> TickReport {
        let guard = self.state.lock().await;
        TickReport::of(&guard, self.clock.now())
    }

    /// Restore a stored session. Snapshots that cannot be resumed are
    /// discarded. Returns the phase after loading.
    pub async fn resume(&self) -> Result<SessionPhase> {
        let db = self.registry.database();
        let snapshot = match db.load_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_warn!("discarding unreadable session snapshot: {err:#}");
                self.persist(None).await;
                None
            }
        };

        let Some(snapshot) = snapshot else {
            return Ok(SessionPhase::Idle);
        };

        let Some(restored) = SessionState::from_snapshot(snapshot) else {
            log_info!("stored session has no plan; clearing it");
            self.persist(None).await;
            return Ok(SessionPhase::Idle);
        };

        let phase = restored.phase();
        log_info!(
            "resumed session {} at segment {} ({:?})",
            restored.session_id().unwrap_or("-"),
            restored.current_index() + 1,
            phase
        );
        *self.state.lock().await = restored;

        if phase == SessionPhase::InSegment {
            self.spawn_ticker().await;
        }
        self.publish().await;
        Ok(phase)
    }

    pub async fn plan(&self, total_minutes: u32, slack_minutes: u32) -> Result<Plan> {
        let mut rng = StdRng::from_entropy();
        self.plan_with_rng(total_minutes, slack_minutes, &mut rng).await
    }

    pub async fn plan_with_rng<R>(
        &self,
        total_minutes: u32,
        slack_minutes: u32,
        rng: &mut R,
    ) -> Result<Plan>
    where
        R: Rng + Send + ?Sized,
    {
        let machines = self.registry.names().await?;
        let mut guard = self.state.lock().await;
        let next = guard.plan_with(total_minutes, slack_minutes, &machines, &self.planner, rng)?;

        let plan = next.plan().clone();
        let plan_id = next.session_id().map(str::to_owned);
        let stored = next.to_snapshot();
        *guard = next;
        drop(guard);
        self.persist(stored).await;
        log_info!(
            "planned session {}: {} segment(s), {} min, slack {} min",
            plan_id.as_deref().unwrap_or("-"),
            plan.len(),
            total_minutes,
            slack_minutes
        );

        self.publish().await;
        Ok(plan)
    }

    pub async fn start(&self) -> Result<SegmentStatus> {
        let enrollment = self.registry.enrollment_map().await?;
        let now = self.clock.now();

        let mut guard = self.state.lock().await;
        let next = guard.start(now, |machine| {
            enrollment
                .get(machine)
                .is_some_and(|reference| reference.is_enrolled())
        })?;
        let status = next.status(now).ok_or(SessionError::NoActiveSegment)?;

        let stored = next.to_snapshot();
        *guard = next;
        drop(guard);
        self.persist(stored).await;
        log_info!("started {}", status.heading());

        self.spawn_ticker().await;
        self.publish().await;
        Ok(status)
    }

    pub async fn open_camera(&self) -> Result<()> {
        self.camera.lock().await.open().await?;
        Ok(())
    }

    pub async fn close_camera(&self) -> bool {
        self.camera.lock().await.close()
    }

    /// Grab a frame and try to prove the active segment.
    ///
    /// Window and match failures come back as [`SessionError`] inside the
    /// `anyhow::Error` and leave the session unchanged.
    pub async fn capture(&self) -> Result<CaptureReport> {
        let mut guard = self.state.lock().await;
        let machine = guard
            .current_segment()
            .map(|segment| segment.machine.clone())
            .ok_or(SessionError::NoActiveSegment)?;

        // No frame is grabbed outside the window.
        let now = self.clock.now();
        let eligibility = guard.eligibility(now)?;
        if !eligibility.allows_capture() {
            log_info!("capture for {machine} rejected: {eligibility}");
            return Err(SessionError::OutsideWindow(eligibility).into());
        }

        let frame = self.camera.lock().await.grab()?;
        let live = fingerprint(&frame)?;
        let references = self.registry.references(&machine).await?;

        let outcome = match guard.capture(now, &live, &references, &self.policy) {
            Ok(outcome) => outcome,
            Err(err) => {
                log_info!("capture for {machine} rejected: {err}");
                return Err(err.into());
            }
        };

        // The verified transition is committed before anything is written.
        let completed = outcome.completed();
        let next = outcome.state.status(now);
        let stored = outcome.state.to_snapshot();
        *guard = outcome.state;
        drop(guard);

        let mut warnings = Vec::new();
        if completed {
            let db = self.registry.database();
            let day = local_day(now);
            match db.record_day(day, DayOutcome::Done).await {
                Ok(()) => {
                    log_info!("session complete; {day} marked done");
                    self.sinks.notify(db, StoreEvent::Calendar).await;
                }
                Err(err) => {
                    log_error!("session complete but {day} was not recorded: {err:#}");
                    warnings.push(format!("failed to record {day} as done: {err:#}"));
                }
            }
            warnings.extend(self.persist(None).await);
            self.camera.lock().await.close();
            self.cancel_ticker().await;
        } else {
            warnings.extend(self.persist(stored).await);
            if let Some(status) = &next {
                log_info!("{machine} verified; now {}", status.heading());
            }
        }

        self.publish().await;
        Ok(CaptureReport {
            verdict: outcome.verdict,
            completed,
            next,
            warnings,
        })
    }

    /// Back to idle from any phase. Releases the camera and forgets the
    /// stored session.
    pub async fn reset(&self) -> Result<()> {
        self.cancel_ticker().await;
        self.camera.lock().await.close();

        let mut guard = self.state.lock().await;
        let next = guard.reset();
        *guard = next;
        drop(guard);
        self.persist(None).await;

        log_info!("session reset");
        self.publish().await;
        Ok(())
    }

    /// Stop background work without touching stored state.
    pub async fn shutdown(&self) {
        self.cancel_ticker().await;
        self.camera.lock().await.close();
    }

    /// Store `snapshot`, or clear the stored one for `None`. A failed write
    /// leaves the in-memory session in charge; the message is returned so
    /// callers can surface it.
    async fn persist(&self, snapshot: Option<SessionSnapshot>) -> Option<String> {
        let db = self.registry.database();
        let result = match &snapshot {
            Some(snapshot) => db.save_snapshot(snapshot).await,
            None => db.clear_snapshot().await,
        };
        result.err().map(|err| {
            log_error!("failed to persist session: {err:#}");
            format!("session not saved: {err:#}")
        })
    }

    async fn publish(&self) {
        let report = self.report().await;
        self.reports.send_replace(report);
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(previous) = ticker_guard.take() {
            previous.stop();
        }
        *ticker_guard = Some(Ticker::spawn(
            self.state.clone(),
            self.clock.clone(),
            self.reports.clone(),
            self.tick_interval,
        ));
    }

    async fn cancel_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.stop();
        }
    }

    #[cfg(test)]
    async fn ticker_running(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }
}
