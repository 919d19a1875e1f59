use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Segment;
use crate::utils::time::{elapsed_secs, format_mmss};

pub const MAX_SLACK_MINUTES: u32 = 5;

/// Capture window for one segment, in seconds since the segment started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowState {
    pub target_secs: u32,
    pub window_start_secs: u32,
    pub window_end_secs: u32,
}

impl WindowState {
    pub fn for_segment(segment: &Segment, slack_minutes: u32) -> Self {
        let target_secs = segment.target_secs();
        let slack_secs = slack_minutes.saturating_mul(60);
        Self {
            target_secs,
            window_start_secs: target_secs.saturating_sub(slack_secs),
            window_end_secs: target_secs.saturating_add(slack_secs),
        }
    }

    pub fn eligibility(&self, elapsed_secs: i64) -> Eligibility {
        if elapsed_secs < i64::from(self.window_start_secs) {
            Eligibility::TooEarly {
                wait_secs: (i64::from(self.window_start_secs) - elapsed_secs) as u64,
            }
        } else if elapsed_secs > i64::from(self.window_end_secs) {
            Eligibility::TooLate
        } else {
            Eligibility::Eligible
        }
    }

    /// Countdown to the target, floored at zero.
    pub fn remaining_secs(&self, elapsed_secs: i64) -> u64 {
        (i64::from(self.target_secs) - elapsed_secs).max(0) as u64
    }

    pub fn label(&self) -> String {
        format!(
            "Window: {} to {}",
            format_mmss(u64::from(self.window_start_secs)),
            format_mmss(u64::from(self.window_end_secs))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Eligibility {
    #[serde(rename_all = "camelCase")]
    TooEarly { wait_secs: u64 },
    Eligible,
    /// The segment can no longer be proven; only a reset recovers.
    TooLate,
}

impl Eligibility {
    pub fn allows_capture(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::TooEarly { wait_secs } => {
                write!(f, "Too early. Wait {}.", format_mmss(*wait_secs))
            }
            Eligibility::Eligible => write!(f, "Within window. Capture allowed."),
            Eligibility::TooLate => write!(f, "Too late. Segment failed."),
        }
    }
}

/// Wall-clock timer for the active segment. Not pause-aware: time keeps
/// accruing while the process is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGate {
    started_at: DateTime<Utc>,
    window: WindowState,
}

impl WindowGate {
    pub fn start(now: DateTime<Utc>, segment: &Segment, slack_minutes: u32) -> Self {
        Self {
            started_at: now,
            window: WindowState::for_segment(segment, slack_minutes),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn window(&self) -> WindowState {
        self.window
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        elapsed_secs(self.started_at, now)
    }

    pub fn eligibility(&self, now: DateTime<Utc>) -> Eligibility {
        self.window.eligibility(self.elapsed_secs(now))
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        self.window.remaining_secs(self.elapsed_secs(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn oversized_segment_saturates_instead_of_overflowing() {
        let window = WindowState::for_segment(&Segment::new("Bike", u32::MAX), u32::MAX);
        assert_eq!(window.target_secs, u32::MAX);
        assert_eq!(window.window_start_secs, 0);
        assert_eq!(window.window_end_secs, u32::MAX);
        assert!(window.window_start_secs <= window.target_secs);
        assert_eq!(window.eligibility(0), Eligibility::Eligible);
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 12, 6, 30, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn ten_minutes_with_one_minute_slack() {
        let gate = WindowGate::start(at(0), &Segment::new("Treadmill", 10), 1);
        let window = gate.window();
        assert_eq!(window.target_secs, 600);
        assert_eq!(window.window_start_secs, 540);
        assert_eq!(window.window_end_secs, 660);

        assert_eq!(gate.eligibility(at(539)), Eligibility::TooEarly { wait_secs: 1 });
        assert_eq!(gate.eligibility(at(540)), Eligibility::Eligible);
        assert_eq!(gate.eligibility(at(600)), Eligibility::Eligible);
        assert_eq!(gate.eligibility(at(660)), Eligibility::Eligible);
        assert_eq!(gate.eligibility(at(661)), Eligibility::TooLate);
    }

    #[test]
    fn zero_slack_is_exact_second() {
        let gate = WindowGate::start(at(0), &Segment::new("Bike", 5), 0);
        assert!(!gate.eligibility(at(299)).allows_capture());
        assert!(gate.eligibility(at(300)).allows_capture());
        assert_eq!(gate.eligibility(at(301)), Eligibility::TooLate);
    }

    #[test]
    fn window_start_never_negative() {
        let window = WindowState::for_segment(&Segment::new("Bike", 3), 5);
        assert_eq!(window.window_start_secs, 0);
        assert_eq!(window.window_end_secs, 480);
        assert!(window.window_start_secs <= window.target_secs);
        assert!(window.target_secs <= window.window_end_secs);
    }

    #[test]
    fn sub_second_progress_is_floored() {
        let gate = WindowGate::start(at(0), &Segment::new("Bike", 10), 1);
        let almost = at(539) + Duration::milliseconds(999);
        assert_eq!(gate.elapsed_secs(almost), 539);
        assert!(!gate.eligibility(almost).allows_capture());
    }

    #[test]
    fn countdown_floors_at_zero() {
        let gate = WindowGate::start(at(0), &Segment::new("Bike", 10), 1);
        assert_eq!(gate.remaining_secs(at(0)), 600);
        assert_eq!(gate.remaining_secs(at(590)), 10);
        assert_eq!(gate.remaining_secs(at(700)), 0);
    }

    #[test]
    fn clock_moving_backwards_reads_too_early() {
        let gate = WindowGate::start(at(100), &Segment::new("Bike", 5), 0);
        assert_eq!(gate.eligibility(at(90)), Eligibility::TooEarly { wait_secs: 310 });
    }

    #[test]
    fn labels() {
        let window = WindowState::for_segment(&Segment::new("Bike", 10), 1);
        assert_eq!(window.label(), "Window: 09:00 to 11:00");
        assert_eq!(
            Eligibility::TooEarly { wait_secs: 75 }.to_string(),
            "Too early. Wait 01:15."
        );
    }
}
