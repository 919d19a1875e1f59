use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::models::{FingerprintPair, Plan, Segment, SessionSnapshot};
use crate::planner::{plan_session, PlannerConfig};
use crate::utils::time::format_mmss;
use crate::vision::{match_references, MatchPolicy, MatchVerdict};

use super::window::{Eligibility, WindowGate, WindowState, MAX_SLACK_MINUTES};

pub const MIN_TOTAL_MINUTES: u32 = 5;
pub const MAX_TOTAL_MINUTES: u32 = 240;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Planned,
    InSegment,
    Completed,
}

/// Session progress. Every transition returns a new value and leaves the
/// receiver untouched, so a failed transition never needs rolling back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    session_id: Option<String>,
    plan: Plan,
    current_index: usize,
    slack_minutes: u32,
    total_minutes: u32,
    gate: Option<WindowGate>,
    completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub state: SessionState,
    pub verdict: MatchVerdict,
}

impl CaptureOutcome {
    pub fn completed(&self) -> bool {
        self.state.phase() == SessionPhase::Completed
    }
}

/// Point-in-time view of the active segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStatus {
    pub index: usize,
    pub count: usize,
    pub machine: String,
    pub minutes: u32,
    pub elapsed_secs: i64,
    pub remaining_secs: u64,
    pub window: WindowState,
    pub eligibility: Eligibility,
}

impl SegmentStatus {
    pub fn countdown(&self) -> String {
        format_mmss(self.remaining_secs)
    }

    pub fn heading(&self) -> String {
        format!(
            "Segment {}/{}: {} ({} min)",
            self.index + 1,
            self.count,
            self.machine,
            self.minutes
        )
    }
}

impl SessionState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.completed {
            SessionPhase::Completed
        } else if self.gate.is_some() {
            SessionPhase::InSegment
        } else if !self.plan.is_empty() {
            SessionPhase::Planned
        } else {
            SessionPhase::Idle
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn slack_minutes(&self) -> u32 {
        self.slack_minutes
    }

    pub fn total_minutes(&self) -> u32 {
        self.total_minutes
    }

    pub fn current_segment(&self) -> Option<&Segment> {
        self.gate.as_ref()?;
        self.plan.get(self.current_index)
    }

    pub fn window(&self) -> Option<WindowState> {
        self.gate.map(|gate| gate.window())
    }

    pub fn segment_started_at(&self) -> Option<DateTime<Utc>> {
        self.gate.map(|gate| gate.started_at())
    }

    /// Generate a fresh plan. Allowed from any phase except mid-segment.
    pub fn plan_with<S, R>(
        &self,
        total_minutes: u32,
        slack_minutes: u32,
        machines: &[S],
        config: &PlannerConfig,
        rng: &mut R,
    ) -> Result<Self, SessionError>
    where
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        if self.phase() == SessionPhase::InSegment {
            return Err(SessionError::SessionActive);
        }
        if !(MIN_TOTAL_MINUTES..=MAX_TOTAL_MINUTES).contains(&total_minutes) {
            return Err(SessionError::TotalOutOfRange {
                value: total_minutes,
                min: MIN_TOTAL_MINUTES,
                max: MAX_TOTAL_MINUTES,
            });
        }
        if slack_minutes > MAX_SLACK_MINUTES {
            return Err(SessionError::SlackOutOfRange {
                value: slack_minutes,
                max: MAX_SLACK_MINUTES,
            });
        }

        let plan = plan_session(total_minutes, machines, config, rng)?;
        Ok(Self {
            session_id: Some(Uuid::new_v4().to_string()),
            plan,
            current_index: 0,
            slack_minutes,
            total_minutes,
            gate: None,
            completed: false,
        })
    }

    /// Begin segment 0. Every machine in the plan must already be enrolled.
    pub fn start<F>(&self, now: DateTime<Utc>, is_enrolled: F) -> Result<Self, SessionError>
    where
        F: Fn(&str) -> bool,
    {
        match self.phase() {
            SessionPhase::Planned => {}
            SessionPhase::InSegment => return Err(SessionError::SessionActive),
            SessionPhase::Idle | SessionPhase::Completed => return Err(SessionError::NoPlan),
        }

        if let Some(missing) = self.plan.machines().into_iter().find(|m| !is_enrolled(m)) {
            return Err(SessionError::UnenrolledMachine(missing.to_string()));
        }

        let first = self.plan.get(0).ok_or(SessionError::NoPlan)?;
        Ok(Self {
            current_index: 0,
            gate: Some(WindowGate::start(now, first, self.slack_minutes)),
            ..self.clone()
        })
    }

    pub fn eligibility(&self, now: DateTime<Utc>) -> Result<Eligibility, SessionError> {
        self.gate
            .map(|gate| gate.eligibility(now))
            .ok_or(SessionError::NoActiveSegment)
    }

    pub fn status(&self, now: DateTime<Utc>) -> Option<SegmentStatus> {
        let gate = self.gate?;
        let segment = self.plan.get(self.current_index)?;
        Some(SegmentStatus {
            index: self.current_index,
            count: self.plan.len(),
            machine: segment.machine.clone(),
            minutes: segment.minutes,
            elapsed_secs: gate.elapsed_secs(now),
            remaining_secs: gate.remaining_secs(now),
            window: gate.window(),
            eligibility: gate.eligibility(now),
        })
    }

    /// Check a live fingerprint against the active machine's references.
    ///
    /// The window is checked before any hashing result is consulted; both
    /// failure kinds leave the session where it was.
    pub fn capture(
        &self,
        now: DateTime<Utc>,
        live: &FingerprintPair,
        references: &[FingerprintPair],
        policy: &MatchPolicy,
    ) -> Result<CaptureOutcome, SessionError> {
        let gate = self.gate.ok_or(SessionError::NoActiveSegment)?;

        let eligibility = gate.eligibility(now);
        if !eligibility.allows_capture() {
            return Err(SessionError::OutsideWindow(eligibility));
        }

        let verdict = match_references(live, references, policy);
        if !verdict.passed {
            return Err(SessionError::NoMatch {
                best_score: verdict.best_score,
            });
        }

        Ok(CaptureOutcome {
            state: self.advance(now),
            verdict,
        })
    }

    /// Move to the next segment, timing it from `now`, or complete.
    fn advance(&self, now: DateTime<Utc>) -> Self {
        let next_index = self.current_index + 1;
        match self.plan.get(next_index) {
            Some(next) => Self {
                current_index: next_index,
                gate: Some(WindowGate::start(now, next, self.slack_minutes)),
                ..self.clone()
            },
            None => Self {
                current_index: self.plan.len(),
                gate: None,
                completed: true,
                ..self.clone()
            },
        }
    }

    pub fn reset(&self) -> Self {
        Self::idle()
    }

    /// Persisted form, or `None` when there is nothing to keep.
    pub fn to_snapshot(&self) -> Option<SessionSnapshot> {
        match self.phase() {
            SessionPhase::Idle | SessionPhase::Completed => None,
            SessionPhase::Planned | SessionPhase::InSegment => {
                let window = self.window().unwrap_or(WindowState {
                    target_secs: 0,
                    window_start_secs: 0,
                    window_end_secs: 0,
                });
                Some(SessionSnapshot {
                    session_id: self.session_id.clone(),
                    plan: self.plan.clone(),
                    current_index: self.current_index,
                    slack_minutes: self.slack_minutes,
                    total_minutes: self.total_minutes,
                    segment_start_at: self.segment_started_at(),
                    window_start_sec: window.window_start_secs,
                    window_end_sec: window.window_end_secs,
                })
            }
        }
    }

    /// Rebuild from a stored snapshot. The window is recomputed from the
    /// segment and slack rather than trusted from storage.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Option<Self> {
        if !snapshot.is_resumable() {
            return None;
        }

        let slack_minutes = snapshot.slack_minutes.min(MAX_SLACK_MINUTES);
        let (current_index, gate) = match snapshot.segment_start_at {
            Some(started_at) => {
                let segment = snapshot.plan.get(snapshot.current_index)?;
                (
                    snapshot.current_index,
                    Some(WindowGate::start(started_at, segment, slack_minutes)),
                )
            }
            None => (0, None),
        };

        Some(Self {
            session_id: snapshot.session_id,
            total_minutes: snapshot.total_minutes,
            plan: snapshot.plan,
            current_index,
            slack_minutes,
            gate,
            completed: false,
        })
    }
}
