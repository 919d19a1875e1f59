/// Tunables for splitting a session across machines.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// No segment may be shorter than this.
    pub min_segment_minutes: u32,

    /// With two machines, each chunk gets at least this share of the total
    /// (floored to whole minutes, never below `min_segment_minutes`).
    pub two_way_min_share: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_segment_minutes: 5,
            two_way_min_share: 0.2,
        }
    }
}

impl PlannerConfig {
    /// Smallest total that can be split across `machines` without breaking
    /// the per-segment floor.
    pub fn minimum_total(&self, machines: usize) -> u32 {
        self.min_segment_minutes * machines.max(1) as u32
    }
}
