use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outcome written for a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOutcome {
    Done,
    Missed,
}

impl DayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayOutcome::Done => "done",
            DayOutcome::Missed => "missed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "done" => Some(DayOutcome::Done),
            "missed" => Some(DayOutcome::Missed),
            _ => None,
        }
    }
}

/// What a day looks like when read back, including inferred misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Done,
    Missed,
    /// Today or later with nothing recorded yet.
    Open,
}

/// Date → outcome map. Keys serialize as `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarRecord {
    days: BTreeMap<NaiveDate, DayOutcome>,
}

impl CalendarRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, day: NaiveDate, outcome: DayOutcome) {
        self.days.insert(day, outcome);
    }

    pub fn outcome(&self, day: NaiveDate) -> Option<DayOutcome> {
        self.days.get(&day).copied()
    }

    /// Explicit records win; an unrecorded day before `today` reads as missed.
    pub fn status_on(&self, day: NaiveDate, today: NaiveDate) -> DayStatus {
        match self.outcome(day) {
            Some(DayOutcome::Done) => DayStatus::Done,
            Some(DayOutcome::Missed) => DayStatus::Missed,
            None if day < today => DayStatus::Missed,
            None => DayStatus::Open,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &DayOutcome)> {
        self.days.iter()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl FromIterator<(NaiveDate, DayOutcome)> for CalendarRecord {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, DayOutcome)>>(iter: T) -> Self {
        Self {
            days: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missed_is_inferred_for_past_days_only() {
        let mut record = CalendarRecord::new();
        record.record(day(2026, 5, 3), DayOutcome::Done);
        let today = day(2026, 5, 5);

        assert_eq!(record.status_on(day(2026, 5, 3), today), DayStatus::Done);
        assert_eq!(record.status_on(day(2026, 5, 4), today), DayStatus::Missed);
        assert_eq!(record.status_on(today, today), DayStatus::Open);
        assert_eq!(record.status_on(day(2026, 5, 6), today), DayStatus::Open);
        // Inference never writes anything back.
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn serializes_with_date_keys() {
        let record: CalendarRecord = [(day(2026, 2, 1), DayOutcome::Done)].into_iter().collect();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"2026-02-01":"done"}"#);
        let back: CalendarRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
