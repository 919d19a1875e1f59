use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::vision::MatchPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDefaults {
    pub total_minutes: u32,
    pub slack_minutes: u32,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            total_minutes: 60,
            slack_minutes: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Signed-in user; `None` means local only.
    pub user_id: Option<String>,
    pub mirror_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UserSettings {
    plan: PlanDefaults,
    match_policy: MatchPolicy,
    tick_interval_ms: u64,
    sync: SyncSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            plan: PlanDefaults::default(),
            match_policy: MatchPolicy::default(),
            tick_interval_ms: 1000,
            sync: SyncSettings::default(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn plan_defaults(&self) -> PlanDefaults {
        self.read().plan
    }

    pub fn update_plan_defaults(&self, plan: PlanDefaults) -> Result<()> {
        let mut guard = self.write();
        guard.plan = plan;
        self.persist(&guard)
    }

    pub fn match_policy(&self) -> MatchPolicy {
        self.read().match_policy
    }

    pub fn update_match_policy(&self, policy: MatchPolicy) -> Result<()> {
        let mut guard = self.write();
        guard.match_policy = policy;
        self.persist(&guard)
    }

    /// Ticker period, never below 50ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.read().tick_interval_ms.max(50))
    }

    pub fn sync(&self) -> SyncSettings {
        self.read().sync.clone()
    }

    pub fn sign_in(&self, user_id: String, mirror_dir: Option<PathBuf>) -> Result<()> {
        let mut guard = self.write();
        guard.sync.user_id = Some(user_id);
        if mirror_dir.is_some() {
            guard.sync.mirror_dir = mirror_dir;
        }
        self.persist(&guard)
    }

    pub fn sign_out(&self) -> Result<()> {
        let mut guard = self.write();
        guard.sync.user_id = None;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }
}
