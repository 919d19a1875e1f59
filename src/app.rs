use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;

use crate::app_dirs::AppDirs;
use crate::db::Database;
use crate::machines::MachineRegistry;
use crate::settings::SettingsStore;
use crate::sync::{FileRemoteStore, RemoteMirror, SinkRegistry};
use crate::timer::SessionController;
use crate::vision::{Camera, FrameSource};

/// Everything a command needs, opened from one data directory.
pub struct App {
    pub data_dir: PathBuf,
    pub db: Database,
    pub settings: SettingsStore,
    pub sinks: SinkRegistry,
    pub registry: MachineRegistry,
}

impl App {
    pub async fn open_default() -> Result<Self> {
        let data_dir = AppDirs::data_dir()
            .ok_or_else(|| anyhow!("could not determine a data directory; set GYMPROOF_HOME"))?;
        Self::open(&data_dir).await
    }

    pub async fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("gymproof.db"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let sinks = SinkRegistry::new();
        let registry = MachineRegistry::open(db.clone(), sinks.clone()).await?;

        let app = Self {
            data_dir: data_dir.to_path_buf(),
            db,
            settings,
            sinks,
            registry,
        };
        if let Some(user_id) = app.settings.sync().user_id {
            app.sinks
                .register(Arc::new(RemoteMirror::new(user_id.clone(), Arc::new(app.remote_store()))));
            info!("mirroring changes for {user_id}");
        }
        Ok(app)
    }

    pub fn remote_store(&self) -> FileRemoteStore {
        let dir = self
            .settings
            .sync()
            .mirror_dir
            .unwrap_or_else(|| self.data_dir.join("mirror"));
        FileRemoteStore::new(dir)
    }

    pub fn session_controller<S: FrameSource + 'static>(&self, source: S) -> SessionController<S> {
        SessionController::new(
            self.registry.clone(),
            self.sinks.clone(),
            Camera::shared(source),
            self.settings.match_policy(),
        )
        .with_tick_interval(self.settings.tick_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RemoteStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_store_with_defaults() {
        let dir = TempDir::new().unwrap();
        let app = App::open(&dir.path().join("home")).await.unwrap();
        assert_eq!(
            app.registry.names().await.unwrap(),
            vec!["Elliptical", "Treadmill"]
        );
        assert!(app.sinks.is_empty());
        assert!(dir.path().join("home").join("gymproof.db").exists());
    }

    #[tokio::test]
    async fn signed_in_user_gets_a_mirror() {
        let dir = TempDir::new().unwrap();
        {
            let app = App::open(dir.path()).await.unwrap();
            app.settings.sign_in("dana".into(), None).unwrap();
        }
        let app = App::open(dir.path()).await.unwrap();
        assert_eq!(app.sinks.len(), 1);

        app.registry.add("Rower").await.unwrap();
        let doc = app.remote_store().fetch("dana").await.unwrap().unwrap();
        assert_eq!(
            doc.machines,
            Some(vec!["Elliptical".to_string(), "Treadmill".to_string(), "Rower".to_string()])
        );
    }
}
