use std::mem::discriminant;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::session::{SegmentStatus, SessionPhase, SessionState};
use super::window::Eligibility;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// What the ticker publishes once per interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub phase: SessionPhase,
    pub segment: Option<SegmentStatus>,
}

impl TickReport {
    pub fn of(state: &SessionState, now: DateTime<Utc>) -> Self {
        Self {
            at: now,
            phase: state.phase(),
            segment: state.status(now),
        }
    }
}

/// Handle to a running tick loop. Dropping it does not stop the loop;
/// call [`Ticker::stop`].
pub struct Ticker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Ticker {
    pub fn spawn(
        state: Arc<Mutex<SessionState>>,
        clock: Arc<dyn Clock>,
        reports: Arc<watch::Sender<TickReport>>,
        period: Duration,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(state, clock, reports, period, cancel_token.clone()));
        Self {
            handle,
            cancel_token,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(self) {
        self.cancel_token.cancel();
        self.handle.abort();
    }
}

async fn tick_loop(
    state: Arc<Mutex<SessionState>>,
    clock: Arc<dyn Clock>,
    reports: Arc<watch::Sender<TickReport>>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_eligibility: Option<Eligibility> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = {
                    let guard = state.lock().await;
                    TickReport::of(&guard, clock.now())
                };

                let eligibility = report.segment.as_ref().map(|s| s.eligibility);
                if let Some(e) = eligibility {
                    if last_eligibility.map(|l| discriminant(&l)) != Some(discriminant(&e)) {
                        log_info!("segment window changed: {e}");
                    }
                }
                last_eligibility = eligibility;
                log_debug!("tick {:?}", report.segment.as_ref().map(|s| s.remaining_secs));

                let keep_going = report.phase == SessionPhase::InSegment;
                reports.send_replace(report);
                if !keep_going {
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_debug!("ticker cancelled");
                break;
            }
        }
    }
}
