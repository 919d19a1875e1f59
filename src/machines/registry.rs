use anyhow::{Context, Result};
use serde::Serialize;

use crate::db::{Database, MachineRemoval};
use crate::error::RegistryError;
use crate::models::machine::normalize_name;
use crate::models::{EnrollmentMap, FingerprintPair, Machine, DEFAULT_MACHINES};
use crate::sync::{SinkRegistry, StoreEvent};
use crate::vision::{fingerprint, Frame, FrameSource, SharedCamera};

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Result of one enrollment capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReceipt {
    pub machine: String,
    pub pair: FingerprintPair,
    pub reference_count: usize,
    pub aspect_ratio: Option<f64>,
}

/// Machine list and enrollment references, with change notification.
#[derive(Clone)]
pub struct MachineRegistry {
    db: Database,
    sinks: SinkRegistry,
}

impl MachineRegistry {
    /// Seeds the default machines the first time the store is opened.
    pub async fn open(db: Database, sinks: SinkRegistry) -> Result<Self> {
        let defaults = DEFAULT_MACHINES.iter().map(|m| m.to_string()).collect();
        if db.seed_machines(defaults).await? {
            log_info!("seeded default machines {:?}", DEFAULT_MACHINES);
        }
        Ok(Self { db, sinks })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn list(&self) -> Result<Vec<Machine>> {
        self.db.list_machines().await
    }

    pub async fn names(&self) -> Result<Vec<String>> {
        self.db.list_machine_names().await
    }

    /// Add a machine. Returns `false` if it already existed.
    pub async fn add(&self, raw_name: &str) -> Result<bool> {
        let name = normalize_name(raw_name).ok_or(RegistryError::EmptyName)?;
        let inserted = self.db.insert_machine(&name).await?;
        if inserted {
            log_info!("added machine {name}");
            self.sinks.notify(&self.db, StoreEvent::Machines).await;
        }
        Ok(inserted)
    }

    /// Remove a machine together with its enrollment.
    pub async fn remove(&self, name: &str) -> Result<()> {
        match self.db.delete_machine(name).await? {
            MachineRemoval::Removed => {
                log_info!("removed machine {name}");
                self.sinks.notify(&self.db, StoreEvent::Machines).await;
                self.sinks.notify(&self.db, StoreEvent::Enrollment).await;
                Ok(())
            }
            MachineRemoval::NotFound => Err(RegistryError::UnknownMachine(name.to_string()).into()),
            MachineRemoval::LastMachine => Err(RegistryError::LastMachine(name.to_string()).into()),
        }
    }

    pub async fn is_enrolled(&self, name: &str) -> Result<bool> {
        Ok(self
            .db
            .load_enrollment(name)
            .await?
            .is_some_and(|reference| reference.is_enrolled()))
    }

    pub async fn references(&self, name: &str) -> Result<Vec<FingerprintPair>> {
        Ok(self
            .db
            .load_enrollment(name)
            .await?
            .map(|reference| reference.hashes)
            .unwrap_or_default())
    }

    pub async fn enrollment_map(&self) -> Result<EnrollmentMap> {
        self.db.load_enrollment_map().await
    }

    /// Fingerprint `frame` and append it to `name`'s references.
    pub async fn enroll_frame(&self, name: &str, frame: &Frame) -> Result<EnrollmentReceipt> {
        if !self.names().await?.iter().any(|m| m == name) {
            return Err(RegistryError::UnknownMachine(name.to_string()).into());
        }

        let pair = fingerprint(frame)?;
        let size = frame.size();
        self.db.append_enrollment(name, pair.clone(), size).await?;
        self.sinks.notify(&self.db, StoreEvent::Enrollment).await;

        let reference_count = self
            .db
            .load_enrollment(name)
            .await?
            .map_or(0, |reference| reference.hashes.len());
        log_info!("enrolled {name}: {} reference(s)", reference_count);

        Ok(EnrollmentReceipt {
            machine: name.to_string(),
            pair,
            reference_count,
            aspect_ratio: size.aspect_ratio(),
        })
    }

    /// Grab a frame from an already open camera and enroll it.
    pub async fn enroll_from<S: FrameSource>(
        &self,
        name: &str,
        camera: &SharedCamera<S>,
    ) -> Result<EnrollmentReceipt> {
        let frame = camera.lock().await.grab()?;
        self.enroll_frame(name, &frame).await
    }

    pub async fn export_enrollment(&self) -> Result<String> {
        let map = self.enrollment_map().await?;
        serde_json::to_string_pretty(&map).context("failed to serialize enrollment")
    }

    /// Merge an exported map (current or single-hash format). Machines it
    /// names that are not in the list yet are appended. Returns how many
    /// machines were imported.
    pub async fn import_enrollment(&self, json: &str) -> Result<usize> {
        let map: EnrollmentMap =
            serde_json::from_str(json).context("enrollment file is not valid JSON")?;
        let map: EnrollmentMap = map
            .into_iter()
            .filter_map(|(name, reference)| normalize_name(&name).map(|n| (n, reference)))
            .collect();

        let mut added_machine = false;
        for name in map.keys() {
            added_machine |= self.db.insert_machine(name).await?;
        }
        let count = map.len();
        self.db.merge_enrollment_map(map).await?;

        if added_machine {
            self.sinks.notify(&self.db, StoreEvent::Machines).await;
        }
        self.sinks.notify(&self.db, StoreEvent::Enrollment).await;
        log_info!("imported enrollment for {count} machine(s)");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{match_references, Camera, MatchPolicy, StillFrameSource};
    use assert_matches::assert_matches;
    use image::{Rgba, RgbaImage};

    fn stripes() -> RgbaImage {
        RgbaImage::from_fn(64, 48, |x, _| {
            let v = if (x / 8) % 2 == 0 { 20 } else { 230 };
            Rgba([v, v, v, 255])
        })
    }

    async fn registry() -> MachineRegistry {
        MachineRegistry::open(Database::in_memory().unwrap(), SinkRegistry::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn starts_with_defaults() {
        let registry = registry().await;
        assert_eq!(registry.names().await.unwrap(), vec!["Elliptical", "Treadmill"]);
    }

    #[tokio::test]
    async fn add_trims_and_ignores_duplicates() {
        let registry = registry().await;
        assert!(registry.add("  Rower ").await.unwrap());
        assert!(!registry.add("Rower").await.unwrap());
        let err = registry.add("   ").await.unwrap_err();
        assert_matches!(err.downcast_ref::<RegistryError>(), Some(RegistryError::EmptyName));
        assert_eq!(
            registry.names().await.unwrap(),
            vec!["Elliptical", "Treadmill", "Rower"]
        );
    }

    #[tokio::test]
    async fn last_machine_cannot_be_removed() {
        let registry = registry().await;
        registry.remove("Elliptical").await.unwrap();
        let err = registry.remove("Treadmill").await.unwrap_err();
        assert_matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::LastMachine(name)) if name == "Treadmill"
        );
        let err = registry.remove("Stairs").await.unwrap_err();
        assert_matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::UnknownMachine(_))
        );
    }

    #[tokio::test]
    async fn enrollment_appends_and_cascades() {
        let registry = registry().await;
        let camera = Camera::shared(StillFrameSource::new(stripes()));
        camera.lock().await.open().await.unwrap();

        let first = registry.enroll_from("Treadmill", &camera).await.unwrap();
        assert_eq!(first.reference_count, 1);
        assert_eq!(first.aspect_ratio, Some(64.0 / 48.0));
        let second = registry.enroll_from("Treadmill", &camera).await.unwrap();
        assert_eq!(second.reference_count, 2);
        assert!(registry.is_enrolled("Treadmill").await.unwrap());
        assert!(!registry.is_enrolled("Elliptical").await.unwrap());

        registry.remove("Treadmill").await.unwrap();
        assert!(!registry.is_enrolled("Treadmill").await.unwrap());
        assert!(registry.enrollment_map().await.unwrap().is_empty());
    }

    fn checkerboard(cell: u32) -> RgbaImage {
        RgbaImage::from_fn(64, 48, |x, y| {
            let v = if ((x / cell) + (y / cell)) % 2 == 0 { 20 } else { 230 };
            Rgba([v, v, v, 255])
        })
    }

    #[tokio::test]
    async fn any_of_three_references_matches() {
        let registry = registry().await;
        let source = StillFrameSource::new(stripes());
        let camera = Camera::shared(source.clone());
        camera.lock().await.open().await.unwrap();

        registry.enroll_from("Treadmill", &camera).await.unwrap();
        source.show(checkerboard(8));
        registry.enroll_from("Treadmill", &camera).await.unwrap();
        source.show(checkerboard(16));
        let third = registry.enroll_from("Treadmill", &camera).await.unwrap();
        assert_eq!(third.reference_count, 3);

        let references = registry.references("Treadmill").await.unwrap();
        assert_eq!(references.len(), 3);
        assert_eq!(references[2], third.pair);

        let policy = MatchPolicy::default();
        for picture in [checkerboard(8), checkerboard(16)] {
            let live = fingerprint(&Frame::from_rgba(picture).unwrap()).unwrap();
            let verdict = match_references(&live, &references, &policy);
            assert!(verdict.passed);
            assert_eq!(verdict.best_score, Some(0));
        }
    }

    #[tokio::test]
    async fn enrolling_unknown_machine_fails() {
        let registry = registry().await;
        let frame = Frame::from_rgba(stripes()).unwrap();
        let err = registry.enroll_frame("Stairs", &frame).await.unwrap_err();
        assert_matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::UnknownMachine(_))
        );
    }

    #[tokio::test]
    async fn import_accepts_legacy_shape() {
        let registry = registry().await;
        let count = registry
            .import_enrollment(
                r#"{
                    "Treadmill": {"hash": "0123456789abcdef", "size": [720, 1280]},
                    "Rower": {"hashes": [{"d": "ffff", "a": "0000"}], "size": [4, 3]}
                }"#,
            )
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            registry.names().await.unwrap(),
            vec!["Elliptical", "Treadmill", "Rower"]
        );
        assert_eq!(
            registry.references("Treadmill").await.unwrap(),
            vec![FingerprintPair::difference_only("0123456789abcdef")]
        );

        let exported = registry.export_enrollment().await.unwrap();
        let round: EnrollmentMap = serde_json::from_str(&exported).unwrap();
        assert_eq!(round, registry.enrollment_map().await.unwrap());
    }
}
