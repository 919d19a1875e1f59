use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::{connection::Database, helpers::to_u32};
use crate::models::{EnrollmentMap, EnrollmentReference, FingerprintPair, FrameSize};

use super::machines::latest_size;

fn load_pairs(conn: &Connection, machine: &str) -> Result<Vec<FingerprintPair>> {
    let mut stmt = conn.prepare(
        "SELECT difference_hash, average_hash FROM enrollment_hashes
         WHERE machine = ?1 ORDER BY id ASC",
    )?;
    let pairs = stmt
        .query_map(params![machine], |row| {
            Ok(FingerprintPair {
                difference: row.get(0)?,
                average: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(pairs)
}

fn load_reference(conn: &Connection, machine: &str) -> Result<Option<EnrollmentReference>> {
    let hashes = load_pairs(conn, machine)?;
    if hashes.is_empty() {
        return Ok(None);
    }
    let size = latest_size(conn, machine)?.unwrap_or_default();
    Ok(Some(EnrollmentReference { hashes, size }))
}

fn insert_pair(conn: &Connection, machine: &str, pair: &FingerprintPair, size: FrameSize) -> Result<()> {
    conn.execute(
        "INSERT INTO enrollment_hashes
            (machine, difference_hash, average_hash, frame_width, frame_height, captured_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            machine,
            pair.difference,
            pair.average,
            i64::from(size.width),
            i64::from(size.height),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Rows are inserted oldest first, so only the last pair carries the
/// reference size that should read back.
fn insert_reference(conn: &Connection, machine: &str, reference: &EnrollmentReference) -> Result<()> {
    for pair in &reference.hashes {
        insert_pair(conn, machine, pair, reference.size)?;
    }
    Ok(())
}

impl Database {
    pub async fn load_enrollment(&self, machine: &str) -> Result<Option<EnrollmentReference>> {
        let machine = machine.to_string();
        self.execute(move |conn| load_reference(conn, &machine)).await
    }

    pub async fn load_enrollment_map(&self) -> Result<EnrollmentMap> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT machine FROM enrollment_hashes")?;
            let machines = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut map = EnrollmentMap::new();
            for machine in machines {
                if let Some(reference) = load_reference(conn, &machine)? {
                    map.insert(machine, reference);
                }
            }
            Ok(map)
        })
        .await
    }

    /// Append one capture to a machine's references.
    pub async fn append_enrollment(
        &self,
        machine: &str,
        pair: FingerprintPair,
        size: FrameSize,
    ) -> Result<()> {
        let machine = machine.to_string();
        self.execute(move |conn| insert_pair(conn, &machine, &pair, size))
            .await
    }

    /// Replace the references of every machine in `map`; machines not in
    /// the map keep theirs.
    pub async fn merge_enrollment_map(&self, map: EnrollmentMap) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for (machine, reference) in &map {
                tx.execute("DELETE FROM enrollment_hashes WHERE machine = ?1", params![machine])?;
                insert_reference(&tx, machine, reference)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Make the stored enrollment exactly `map`.
    pub async fn replace_enrollment_map(&self, map: EnrollmentMap) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM enrollment_hashes", [])?;
            for (machine, reference) in &map {
                insert_reference(&tx, machine, reference)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
