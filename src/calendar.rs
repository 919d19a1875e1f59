//! Month grid derived from the calendar record.

use std::fmt::Write as _;

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;

use crate::models::{CalendarRecord, DayStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub is_today: bool,
}

/// One month laid out Sunday-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub first_day: NaiveDate,
    /// Empty cells before the 1st so it lands under its weekday.
    pub leading_blanks: u32,
    pub days: Vec<DayCell>,
}

impl MonthView {
    /// `None` if `year`/`month` is not a real month.
    pub fn build(year: i32, month: u32, record: &CalendarRecord, today: NaiveDate) -> Option<Self> {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next_month = first_day.checked_add_months(Months::new(1))?;

        let days = first_day
            .iter_days()
            .take_while(|day| *day < next_month)
            .map(|date| DayCell {
                date,
                status: record.status_on(date, today),
                is_today: date == today,
            })
            .collect();

        Some(Self {
            first_day,
            leading_blanks: first_day.weekday().num_days_from_sunday(),
            days,
        })
    }

    pub fn containing(day: NaiveDate, record: &CalendarRecord, today: NaiveDate) -> Option<Self> {
        Self::build(day.year(), day.month(), record, today)
    }

    /// The month `offset` months away from this one.
    pub fn shifted(&self, offset: i32, record: &CalendarRecord, today: NaiveDate) -> Option<Self> {
        let magnitude = Months::new(offset.unsigned_abs());
        let first = if offset >= 0 {
            self.first_day.checked_add_months(magnitude)?
        } else {
            self.first_day.checked_sub_months(magnitude)?
        };
        Self::containing(first, record, today)
    }

    pub fn label(&self) -> String {
        self.first_day.format("%B %Y").to_string()
    }

    pub fn done_count(&self) -> usize {
        self.days.iter().filter(|d| d.status == DayStatus::Done).count()
    }

    /// Plain-text grid: `+` done, `x` missed, `.` open, `[..]` today.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:^28}", self.label());
        out.push_str(" Su  Mo  Tu  We  Th  Fr  Sa\n");

        let mut column = 0;
        for _ in 0..self.leading_blanks {
            out.push_str("    ");
            column += 1;
        }
        for cell in &self.days {
            let marker = match cell.status {
                DayStatus::Done => '+',
                DayStatus::Missed => 'x',
                DayStatus::Open => '.',
            };
            let day = cell.date.day();
            if cell.is_today {
                let _ = write!(out, "[{day:>2}]");
            } else {
                let _ = write!(out, " {day:>2}{marker}");
            }
            column += 1;
            if column == 7 {
                out.push('\n');
                column = 0;
            }
        }
        if column != 0 {
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayOutcome;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn april_2026_layout() {
        // April 1st 2026 is a Wednesday.
        let record: CalendarRecord = [
            (day(2026, 4, 3), DayOutcome::Done),
            (day(2026, 4, 20), DayOutcome::Done),
        ]
        .into_iter()
        .collect();
        let view = MonthView::build(2026, 4, &record, day(2026, 4, 10)).unwrap();

        assert_eq!(view.leading_blanks, 3);
        assert_eq!(view.days.len(), 30);
        assert_eq!(view.label(), "April 2026");

        assert_eq!(view.days[0].status, DayStatus::Missed);
        assert_eq!(view.days[2].status, DayStatus::Done);
        assert!(view.days[9].is_today);
        assert_eq!(view.days[9].status, DayStatus::Open);
        assert_eq!(view.days[15].status, DayStatus::Open);
        // Recorded future days still show their record.
        assert_eq!(view.days[19].status, DayStatus::Done);
        assert_eq!(view.done_count(), 2);
    }

    #[test]
    fn leap_february_and_navigation() {
        let record = CalendarRecord::new();
        let today = day(2028, 2, 1);
        let feb = MonthView::containing(today, &record, today).unwrap();
        assert_eq!(feb.days.len(), 29);

        let jan = feb.shifted(-1, &record, today).unwrap();
        assert_eq!(jan.first_day, day(2028, 1, 1));
        assert!(jan.days.iter().all(|d| d.status == DayStatus::Missed));

        let dec = feb.shifted(10, &record, today).unwrap();
        assert_eq!(dec.first_day, day(2028, 12, 1));
        assert!(dec.days.iter().all(|d| d.status == DayStatus::Open));
    }

    #[test]
    fn invalid_month() {
        assert_eq!(MonthView::build(2026, 13, &CalendarRecord::new(), day(2026, 1, 1)), None);
    }

    #[test]
    fn render_marks_today() {
        let today = day(2026, 4, 10);
        let view = MonthView::build(2026, 4, &CalendarRecord::new(), today).unwrap();
        let text = view.render();
        assert!(text.contains("[10]"));
        assert!(text.contains("  9x"));
        assert!(text.contains(" 11."));
        // 3 blanks + 30 days = 33 cells = 5 rows, plus the two header lines.
        assert_eq!(text.lines().count(), 7);
    }
}
