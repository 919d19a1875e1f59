use serde::{Deserialize, Serialize};

use crate::models::FingerprintPair;

/// Acceptance thresholds for a live fingerprint.
///
/// Both values were tuned by hand against phone camera captures; they are
/// settings rather than constants so they can be adjusted per install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPolicy {
    /// Maximum difference + average distance for a full pair.
    pub combined_threshold: u32,
    /// Maximum difference distance for a pair without an average hash.
    pub difference_only_threshold: u32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            combined_threshold: 30,
            difference_only_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchVerdict {
    pub passed: bool,
    /// Lowest score seen; `None` when there was nothing to compare against.
    pub best_score: Option<u32>,
}

/// Bit distance between two hex strings, digit by digit.
///
/// The shorter string is treated as if padded with `0` digits. Characters
/// that are not hex digits count as `0`.
pub fn hamming_distance(a: &str, b: &str) -> u32 {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = nibble(a.get(i).copied());
            let y = nibble(b.get(i).copied());
            (x ^ y).count_ones()
        })
        .sum()
}

fn nibble(byte: Option<u8>) -> u32 {
    byte.and_then(|c| char::from(c).to_digit(16)).unwrap_or(0)
}

/// Compare a live fingerprint against stored references, stopping at the
/// first one that passes.
pub fn match_references(
    live: &FingerprintPair,
    references: &[FingerprintPair],
    policy: &MatchPolicy,
) -> MatchVerdict {
    let mut best_score: Option<u32> = None;

    for reference in references {
        let difference = hamming_distance(&live.difference, &reference.difference);
        let (score, threshold) = match (&live.average, &reference.average) {
            (Some(live_avg), Some(ref_avg)) => (
                difference + hamming_distance(live_avg, ref_avg),
                policy.combined_threshold,
            ),
            _ => (difference, policy.difference_only_threshold),
        };

        best_score = Some(best_score.map_or(score, |best| best.min(score)));

        if score <= threshold {
            return MatchVerdict {
                passed: true,
                best_score,
            };
        }
    }

    MatchVerdict {
        passed: false,
        best_score,
    }
}
