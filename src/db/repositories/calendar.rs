use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};

use crate::db::{
    connection::Database,
    helpers::{parse_day, parse_outcome},
};
use crate::models::{CalendarRecord, DayOutcome};
use crate::utils::time::day_key;

fn upsert_day(conn: &Connection, day: NaiveDate, outcome: DayOutcome) -> Result<()> {
    conn.execute(
        "INSERT INTO calendar_days (day, outcome, recorded_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(day) DO UPDATE SET outcome = excluded.outcome,
                                        recorded_at = excluded.recorded_at",
        params![day_key(day), outcome.as_str(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl Database {
    pub async fn record_day(&self, day: NaiveDate, outcome: DayOutcome) -> Result<()> {
        self.execute(move |conn| upsert_day(conn, day, outcome)).await
    }

    pub async fn load_calendar(&self) -> Result<CalendarRecord> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT day, outcome FROM calendar_days")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.iter()
                .map(|(day, outcome)| -> Result<(NaiveDate, DayOutcome)> {
                    Ok((parse_day(day)?, parse_outcome(outcome)?))
                })
                .collect()
        })
        .await
    }

    pub async fn replace_calendar(&self, record: CalendarRecord) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM calendar_days", [])?;
            for (day, outcome) in record.iter() {
                upsert_day(&tx, *day, *outcome)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
