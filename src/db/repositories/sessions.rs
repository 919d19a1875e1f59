use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::connection::Database;
use crate::models::SessionSnapshot;

impl Database {
    /// Overwrite the single stored snapshot.
    pub async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let payload =
            serde_json::to_string(snapshot).context("failed to serialize session snapshot")?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO session_snapshot (id, payload, updated_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET payload = excluded.payload,
                                               updated_at = excluded.updated_at",
                params![payload, Utc::now().to_rfc3339()],
            )
            .context("failed to write session snapshot")?;
            Ok(())
        })
        .await
    }

    pub async fn load_snapshot(&self) -> Result<Option<SessionSnapshot>> {
        self.execute(|conn| {
            let payload: Option<String> = conn
                .query_row("SELECT payload FROM session_snapshot WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .optional()?;

            payload
                .map(|raw| {
                    serde_json::from_str::<SessionSnapshot>(&raw)
                        .context("stored session snapshot is corrupt")
                })
                .transpose()
        })
        .await
    }

    pub async fn clear_snapshot(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM session_snapshot", [])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Plan, Segment};

    fn snapshot(index: usize) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Some("abc".into()),
            plan: Plan::new(vec![Segment::new("Bike", 10), Segment::new("Rower", 20)]),
            current_index: index,
            slack_minutes: 1,
            total_minutes: 30,
            segment_start_at: Some(Utc::now()),
            window_start_sec: 540,
            window_end_sec: 660,
        }
    }

    #[tokio::test]
    async fn save_overwrites_and_clear_removes() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.load_snapshot().await.unwrap(), None);

        db.save_snapshot(&snapshot(0)).await.unwrap();
        let second = snapshot(1);
        db.save_snapshot(&second).await.unwrap();
        assert_eq!(db.load_snapshot().await.unwrap(), Some(second));

        db.clear_snapshot().await.unwrap();
        assert_eq!(db.load_snapshot().await.unwrap(), None);
    }
}
