//! Best-effort mirror of the machine list, enrollment map and calendar,
//! keyed by user id.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::models::{CalendarRecord, EnrollmentMap};

use super::{PersistenceSink, StoreEvent};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// One user's mirrored data. Absent fields are left untouched by a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machines: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enroll: Option<EnrollmentMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<CalendarRecord>,
}

impl RemoteDocument {
    /// Overlay every field present in `partial`.
    pub fn merge(&mut self, partial: RemoteDocument) {
        if partial.machines.is_some() {
            self.machines = partial.machines;
        }
        if partial.enroll.is_some() {
            self.enroll = partial.enroll;
        }
        if partial.calendar.is_some() {
            self.calendar = partial.calendar;
        }
    }

    /// Read the maps named by `events` out of the local store.
    pub async fn collect(db: &Database, events: &[StoreEvent]) -> Result<Self> {
        let mut doc = RemoteDocument::default();
        for event in events {
            match event {
                StoreEvent::Machines => doc.machines = Some(db.list_machine_names().await?),
                StoreEvent::Enrollment => doc.enroll = Some(db.load_enrollment_map().await?),
                StoreEvent::Calendar => doc.calendar = Some(db.load_calendar().await?),
            }
        }
        Ok(doc)
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteDocument>>;

    /// Read-modify-write: fields absent from `partial` keep their remote value.
    async fn merge(&self, user_id: &str, partial: RemoteDocument) -> Result<()>;
}

/// Stores one JSON document per user in a directory, e.g. a synced folder.
#[derive(Debug, Clone)]
pub struct FileRemoteStore {
    dir: PathBuf,
}

impl FileRemoteStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn document_path(&self, user_id: &str) -> Result<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !user_id.starts_with('.');
        if !valid {
            bail!("invalid user id '{user_id}'");
        }
        Ok(self.dir.join(format!("{user_id}.json")))
    }
}

#[async_trait]
impl RemoteStore for FileRemoteStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteDocument>> {
        let path = self.document_path(user_id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let doc = serde_json::from_str(&raw)
            .with_context(|| format!("remote document {} is corrupt", path.display()))?;
        Ok(Some(doc))
    }

    async fn merge(&self, user_id: &str, partial: RemoteDocument) -> Result<()> {
        let path = self.document_path(user_id)?;
        // A corrupt remote document is replaced rather than blocking writes.
        let mut doc = self.fetch(user_id).await.unwrap_or_default().unwrap_or_default();
        doc.merge(partial);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let serialized = serde_json::to_string_pretty(&doc)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Write-through sink for a signed-in user.
///
/// A push that fails leaves the mirror dirty; the next change then pushes
/// all three maps instead of just the one that changed.
pub struct RemoteMirror {
    user_id: String,
    store: Arc<dyn RemoteStore>,
    dirty: AtomicBool,
}

impl RemoteMirror {
    pub fn new(user_id: impl Into<String>, store: Arc<dyn RemoteStore>) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Push everything now, regardless of the dirty flag.
    pub async fn push_all(&self, db: &Database) -> Result<()> {
        self.push(db, &StoreEvent::ALL).await
    }

    async fn push(&self, db: &Database, events: &[StoreEvent]) -> Result<()> {
        let result = async {
            let doc = RemoteDocument::collect(db, events).await?;
            self.store.merge(&self.user_id, doc).await
        }
        .await;

        match &result {
            Ok(()) => self.dirty.store(false, Ordering::SeqCst),
            Err(err) => {
                self.dirty.store(true, Ordering::SeqCst);
                log_warn!("remote push for {} failed, will retry in full: {err:#}", self.user_id);
            }
        }
        result
    }
}

#[async_trait]
impl PersistenceSink for RemoteMirror {
    fn name(&self) -> &str {
        "remote-mirror"
    }

    async fn on_change(&self, db: &Database, event: StoreEvent) -> Result<()> {
        if self.is_dirty() {
            self.push(db, &StoreEvent::ALL).await
        } else {
            self.push(db, &[event]).await
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrateReport {
    pub machines: bool,
    pub enroll: bool,
    pub calendar: bool,
}

impl HydrateReport {
    pub fn any(&self) -> bool {
        self.machines || self.enroll || self.calendar
    }
}

/// Overwrite local maps with the remote copy where the remote has one.
/// An empty remote machine list is ignored so the local list never empties.
pub async fn hydrate(db: &Database, store: &dyn RemoteStore, user_id: &str) -> Result<HydrateReport> {
    let mut report = HydrateReport::default();
    let Some(doc) = store.fetch(user_id).await? else {
        log_info!("no remote data for {user_id}; keeping local state");
        return Ok(report);
    };

    if let Some(machines) = doc.machines.filter(|m| !m.is_empty()) {
        db.replace_machines(machines).await?;
        report.machines = true;
    }
    if let Some(enroll) = doc.enroll {
        db.replace_enrollment_map(enroll).await?;
        report.enroll = true;
    }
    if let Some(calendar) = doc.calendar {
        db.replace_calendar(calendar).await?;
        report.calendar = true;
    }

    log_info!("hydrated from remote for {user_id}: {report:?}");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayOutcome, FingerprintPair, FrameSize};
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails the first `failures` merges, then records.
    struct FlakyStore {
        failures: AtomicUsize,
        merged: Mutex<Vec<RemoteDocument>>,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                merged: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for FlakyStore {
        async fn fetch(&self, _user_id: &str) -> Result<Option<RemoteDocument>> {
            Ok(None)
        }

        async fn merge(&self, _user_id: &str, partial: RemoteDocument) -> Result<()> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                bail!("network unreachable");
            }
            self.merged.lock().unwrap().push(partial);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_push_makes_next_push_full() {
        let db = Database::in_memory().unwrap();
        db.insert_machine("Bike").await.unwrap();
        let store = Arc::new(FlakyStore::new(1));
        let mirror = RemoteMirror::new("u1", store.clone());

        assert!(mirror.on_change(&db, StoreEvent::Calendar).await.is_err());
        assert!(mirror.is_dirty());

        mirror.on_change(&db, StoreEvent::Calendar).await.unwrap();
        assert!(!mirror.is_dirty());

        mirror.on_change(&db, StoreEvent::Calendar).await.unwrap();

        let merged = store.merged.lock().unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].machines, Some(vec!["Bike".to_string()]));
        assert!(merged[0].enroll.is_some());
        assert!(merged[0].calendar.is_some());
        assert_eq!(merged[1].machines, None);
        assert_eq!(merged[1].enroll, None);
        assert!(merged[1].calendar.is_some());
    }

    #[tokio::test]
    async fn file_store_merges_fields() {
        let dir = TempDir::new().unwrap();
        let store = FileRemoteStore::new(dir.path());
        assert_eq!(store.fetch("alice").await.unwrap(), None);

        store
            .merge(
                "alice",
                RemoteDocument {
                    machines: Some(vec!["Rower".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let calendar: CalendarRecord = [(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), DayOutcome::Done)]
            .into_iter()
            .collect();
        store
            .merge(
                "alice",
                RemoteDocument {
                    calendar: Some(calendar.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let doc = store.fetch("alice").await.unwrap().unwrap();
        assert_eq!(doc.machines, Some(vec!["Rower".to_string()]));
        assert_eq!(doc.calendar, Some(calendar));
        assert_eq!(doc.enroll, None);
    }

    #[tokio::test]
    async fn rejects_path_like_user_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileRemoteStore::new(dir.path());
        assert!(store.fetch("../etc/passwd").await.is_err());
        assert!(store.fetch("").await.is_err());
    }

    #[tokio::test]
    async fn hydrate_overwrites_local() {
        let dir = TempDir::new().unwrap();
        let store = FileRemoteStore::new(dir.path());
        let db = Database::in_memory().unwrap();
        db.insert_machine("Bike").await.unwrap();
        db.append_enrollment("Bike", FingerprintPair::new("aa", "bb"), FrameSize::new(4, 3))
            .await
            .unwrap();

        let mut enroll = EnrollmentMap::new();
        enroll.insert(
            "Treadmill".into(),
            serde_json::from_str(r#"{"hash":"00ff","size":[720,1280]}"#).unwrap(),
        );
        store
            .merge(
                "bob",
                RemoteDocument {
                    machines: Some(vec!["Treadmill".into(), "Rower".into()]),
                    enroll: Some(enroll),
                    calendar: None,
                },
            )
            .await
            .unwrap();

        let report = hydrate(&db, &store, "bob").await.unwrap();
        assert_eq!(
            report,
            HydrateReport {
                machines: true,
                enroll: true,
                calendar: false
            }
        );
        assert_eq!(
            db.list_machine_names().await.unwrap(),
            vec!["Treadmill".to_string(), "Rower".to_string()]
        );
        let map = db.load_enrollment_map().await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(
            map["Treadmill"].hashes,
            vec![FingerprintPair::difference_only("00ff")]
        );
    }

    #[tokio::test]
    async fn hydrate_ignores_empty_machine_list() {
        let dir = TempDir::new().unwrap();
        let store = FileRemoteStore::new(dir.path());
        let db = Database::in_memory().unwrap();
        db.insert_machine("Bike").await.unwrap();
        store
            .merge(
                "carol",
                RemoteDocument {
                    machines: Some(Vec::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = hydrate(&db, &store, "carol").await.unwrap();
        assert!(!report.any());
        assert_eq!(db.list_machine_names().await.unwrap(), vec!["Bike".to_string()]);
    }
}
