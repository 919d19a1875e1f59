use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{connection::Database, helpers::to_u32};
use crate::models::{FrameSize, Machine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineRemoval {
    Removed,
    NotFound,
    /// Refused: the list may never become empty.
    LastMachine,
}

fn next_position(conn: &Connection) -> Result<i64> {
    let position: i64 =
        conn.query_row("SELECT COALESCE(MAX(position), -1) + 1 FROM machines", [], |row| {
            row.get(0)
        })?;
    Ok(position)
}

fn insert_if_missing(conn: &Connection, name: &str) -> Result<bool> {
    let position = next_position(conn)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO machines (name, position, created_at) VALUES (?1, ?2, ?3)",
        params![name, position, Utc::now().to_rfc3339()],
    )?;
    Ok(inserted > 0)
}

pub(crate) fn latest_size(conn: &Connection, machine: &str) -> Result<Option<FrameSize>> {
    let size = conn
        .query_row(
            "SELECT frame_width, frame_height FROM enrollment_hashes
             WHERE machine = ?1 ORDER BY id DESC LIMIT 1",
            params![machine],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;
    size.map(|(w, h)| Ok(FrameSize::new(to_u32(w, "frame_width")?, to_u32(h, "frame_height")?)))
        .transpose()
}

impl Database {
    pub async fn list_machine_names(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM machines ORDER BY position ASC")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .await
    }

    pub async fn list_machines(&self) -> Result<Vec<Machine>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.name, COUNT(h.id)
                 FROM machines m
                 LEFT JOIN enrollment_hashes h ON h.machine = m.name
                 GROUP BY m.name
                 ORDER BY m.position ASC",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut machines = Vec::with_capacity(rows.len());
            for (name, count) in rows {
                let aspect_ratio = latest_size(conn, &name)?.and_then(|s| s.aspect_ratio());
                machines.push(Machine {
                    enrolled: count > 0,
                    reference_count: count as usize,
                    aspect_ratio,
                    name,
                });
            }
            Ok(machines)
        })
        .await
    }

    /// Insert `defaults` when the table is empty. Returns whether anything
    /// was written.
    pub async fn seed_machines(&self, defaults: Vec<String>) -> Result<bool> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let count: i64 = tx.query_row("SELECT COUNT(*) FROM machines", [], |row| row.get(0))?;
            if count > 0 {
                return Ok(false);
            }
            for name in &defaults {
                insert_if_missing(&tx, name)?;
            }
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    /// Append a machine. Returns `false` if the name already exists.
    pub async fn insert_machine(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.execute(move |conn| insert_if_missing(conn, &name)).await
    }

    /// Delete a machine and its enrollment in one transaction.
    pub async fn delete_machine(&self, name: &str) -> Result<MachineRemoval> {
        let name = name.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let exists: bool = tx
                .query_row("SELECT 1 FROM machines WHERE name = ?1", params![name], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(MachineRemoval::NotFound);
            }

            // Checked inside the same task so two removals cannot both pass.
            let count: i64 = tx.query_row("SELECT COUNT(*) FROM machines", [], |row| row.get(0))?;
            if count <= 1 {
                return Ok(MachineRemoval::LastMachine);
            }

            tx.execute("DELETE FROM machines WHERE name = ?1", params![name])?;
            tx.execute("DELETE FROM enrollment_hashes WHERE machine = ?1", params![name])?;
            tx.commit()?;
            Ok(MachineRemoval::Removed)
        })
        .await
    }

    /// Make the stored list exactly `names`, in that order. Enrollment for
    /// dropped machines is left alone; the enrollment map is replaced
    /// separately.
    pub async fn replace_machines(&self, names: Vec<String>) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM machines", [])?;
            let now = Utc::now().to_rfc3339();
            let mut position = 0i64;
            for name in &names {
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO machines (name, position, created_at) VALUES (?1, ?2, ?3)",
                    params![name, position, now],
                )?;
                position += inserted as i64;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
