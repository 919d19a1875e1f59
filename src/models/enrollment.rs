//! Enrollment references: the stored fingerprints a live frame is checked
//! against.
//!
//! Portable shape (used by the remote mirror and import/export):
//!
//! ```json
//! { "Treadmill": { "hashes": [{ "d": "…", "a": "…" }], "size": [720, 1280] } }
//! ```
//!
//! Older exports stored a single difference hash as `{ "hash": "…", "size":
//! [w, h] }`. That shape still deserializes and becomes one pair with no
//! average hash, which the matcher scores with the difference-only threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

pub type EnrollmentMap = BTreeMap<String, EnrollmentReference>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintPair {
    #[serde(rename = "d")]
    pub difference: String,
    #[serde(
        rename = "a",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub average: Option<String>,
}

impl FingerprintPair {
    pub fn new(difference: impl Into<String>, average: impl Into<String>) -> Self {
        Self {
            difference: difference.into(),
            average: Some(average.into()),
        }
    }

    /// A pair carried over from the single-hash format.
    pub fn difference_only(difference: impl Into<String>) -> Self {
        Self {
            difference: difference.into(),
            average: None,
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height, for the aiming guide overlay.
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(self.width as f64 / self.height as f64)
        }
    }
}

impl From<[u32; 2]> for FrameSize {
    fn from(v: [u32; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<FrameSize> for [u32; 2] {
    fn from(s: FrameSize) -> Self {
        [s.width, s.height]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredEnrollment")]
pub struct EnrollmentReference {
    pub hashes: Vec<FingerprintPair>,
    pub size: FrameSize,
}

impl EnrollmentReference {
    pub fn is_enrolled(&self) -> bool {
        !self.hashes.is_empty()
    }

    /// Append a capture; earlier references are kept.
    pub fn push(&mut self, pair: FingerprintPair, size: FrameSize) {
        self.hashes.push(pair);
        self.size = size;
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEnrollment {
    // Tried first: `Current` has only defaulted fields and would accept it.
    Legacy {
        hash: String,
        #[serde(default)]
        size: FrameSize,
    },
    Current {
        #[serde(default)]
        hashes: Vec<FingerprintPair>,
        #[serde(default)]
        size: FrameSize,
    },
}

impl From<StoredEnrollment> for EnrollmentReference {
    fn from(stored: StoredEnrollment) -> Self {
        match stored {
            StoredEnrollment::Current { hashes, size } => Self { hashes, size },
            StoredEnrollment::Legacy { hash, size } => Self {
                hashes: vec![FingerprintPair::difference_only(hash)],
                size,
            },
        }
    }
}
