use serde::{Deserialize, Serialize};

/// Machines offered before the user has configured any.
pub const DEFAULT_MACHINES: [&str; 2] = ["Elliptical", "Treadmill"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub name: String,
    pub enrolled: bool,
    /// Number of stored fingerprint pairs.
    pub reference_count: usize,
    pub aspect_ratio: Option<f64>,
}

/// Trim user input into a machine name; `None` for blank input.
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_name("  Stair climber "), Some("Stair climber".into()));
        assert_eq!(normalize_name("   "), None);
        assert_eq!(normalize_name(""), None);
    }
}
