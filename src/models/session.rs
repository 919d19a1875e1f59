use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Plan;

/// Persisted form of an in-progress session, written after every mutation
/// and read back to resume after the process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub session_id: Option<String>,
    pub plan: Plan,
    pub current_index: usize,
    pub slack_minutes: u32,
    pub total_minutes: u32,
    pub segment_start_at: Option<DateTime<Utc>>,
    pub window_start_sec: u32,
    pub window_end_sec: u32,
}

impl SessionSnapshot {
    /// Snapshots without a plan carry nothing worth resuming.
    pub fn is_resumable(&self) -> bool {
        !self.plan.is_empty() && self.current_index < self.plan.len()
    }
}
