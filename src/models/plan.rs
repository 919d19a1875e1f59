use serde::{Deserialize, Serialize};

/// One machine/duration unit of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub machine: String,
    pub minutes: u32,
}

impl Segment {
    pub fn new(machine: impl Into<String>, minutes: u32) -> Self {
        Self {
            machine: machine.into(),
            minutes,
        }
    }

    pub fn target_secs(&self) -> u32 {
        self.minutes.saturating_mul(60)
    }
}

/// Segments in execution order. Serializes as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    segments: Vec<Segment>,
}

impl Plan {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_minutes(&self) -> u32 {
        self.segments
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(s.minutes))
    }

    /// Distinct machine names in first-use order.
    pub fn machines(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if !seen.contains(&segment.machine.as_str()) {
                seen.push(segment.machine.as_str());
            }
        }
        seen
    }
}
