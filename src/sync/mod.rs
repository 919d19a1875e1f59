//! Observers for local persistence.
//!
//! Every write to the machine list, the enrollment map or the calendar is
//! followed by a [`StoreEvent`]. Registered sinks react to it; their
//! failures are logged and never reach the caller that made the write.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use log::warn;

use crate::db::Database;

pub mod remote;

pub use remote::{hydrate, FileRemoteStore, HydrateReport, RemoteDocument, RemoteMirror, RemoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    Machines,
    Enrollment,
    Calendar,
}

impl StoreEvent {
    pub const ALL: [StoreEvent; 3] = [StoreEvent::Machines, StoreEvent::Enrollment, StoreEvent::Calendar];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreEvent::Machines => "machines",
            StoreEvent::Enrollment => "enroll",
            StoreEvent::Calendar => "calendar",
        }
    }
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    fn name(&self) -> &str;

    /// Called after `event`'s data has been committed locally. `db` holds
    /// the current state.
    async fn on_change(&self, db: &Database, event: StoreEvent) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct SinkRegistry {
    sinks: Arc<RwLock<Vec<Arc<dyn PersistenceSink>>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn PersistenceSink>) {
        let mut guard = match self.sinks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(sink);
    }

    pub fn clear(&self) {
        let mut guard = match self.sinks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn PersistenceSink>> {
        match self.sinks.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Fan `event` out to every sink. Best effort.
    pub async fn notify(&self, db: &Database, event: StoreEvent) {
        for sink in self.snapshot() {
            if let Err(err) = sink.on_change(db, event).await {
                warn!(
                    "persistence sink '{}' failed on {} change: {err:#}",
                    sink.name(),
                    event.as_str()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<StoreEvent>>,
    }

    #[async_trait]
    impl PersistenceSink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn on_change(&self, _db: &Database, event: StoreEvent) -> Result<()> {
            self.seen.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl PersistenceSink for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn on_change(&self, _db: &Database, _event: StoreEvent) -> Result<()> {
            bail!("offline")
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_stop_others() {
        let db = Database::in_memory().unwrap();
        let registry = SinkRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.register(Arc::new(Broken));
        registry.register(recorder.clone());

        registry.notify(&db, StoreEvent::Calendar).await;
        registry.notify(&db, StoreEvent::Machines).await;

        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![StoreEvent::Calendar, StoreEvent::Machines]
        );

        registry.clear();
        assert!(registry.is_empty());
    }
}
