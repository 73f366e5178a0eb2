//! Analyzer configuration.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Default cap on captured stderr/command-line text per action
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Which actions get their command line and stderr captured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Capture nothing
    None,
    /// Capture only for failed actions
    #[default]
    Failed,
    /// Capture for every action
    All,
}

impl DetailLevel {
    /// Check whether an action with this outcome should be captured
    #[must_use]
    pub const fn captures(&self, success: bool) -> bool {
        match self {
            Self::None => false,
            Self::Failed => !success,
            Self::All => true,
        }
    }

    /// Get the policy name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Failed => "failed",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DetailLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "failed" | "failed-only" | "failed_only" => Ok(Self::Failed),
            "all" => Ok(Self::All),
            other => Err(CoreError::InvalidDetailLevel(other.to_string())),
        }
    }
}

/// Configuration for one analysis session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Action detail policy
    pub detail: DetailLevel,
    /// Maximum bytes read from a stderr side file or progress excerpt
    pub max_capture_bytes: usize,
}

impl AnalyzerConfig {
    /// Create a new analyzer config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the detail policy
    #[must_use]
    pub fn with_detail(mut self, detail: DetailLevel) -> Self {
        self.detail = detail;
        self
    }

    /// Set the capture cap
    #[must_use]
    pub fn with_max_capture_bytes(mut self, bytes: usize) -> Self {
        self.max_capture_bytes = bytes;
        self
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            detail: DetailLevel::default(),
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_level_parse() {
        assert_eq!("none".parse::<DetailLevel>().unwrap(), DetailLevel::None);
        assert_eq!("FAILED".parse::<DetailLevel>().unwrap(), DetailLevel::Failed);
        assert_eq!("failed-only".parse::<DetailLevel>().unwrap(), DetailLevel::Failed);
        assert_eq!("all".parse::<DetailLevel>().unwrap(), DetailLevel::All);
        assert!("some".parse::<DetailLevel>().is_err());
    }

    #[test]
    fn test_detail_level_captures() {
        assert!(!DetailLevel::None.captures(false));
        assert!(DetailLevel::Failed.captures(false));
        assert!(!DetailLevel::Failed.captures(true));
        assert!(DetailLevel::All.captures(true));
    }

    #[test]
    fn test_detail_level_serde() {
        let json = serde_json::to_string(&DetailLevel::All).unwrap();
        assert_eq!(json, "\"all\"");
        let back: DetailLevel = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(back, DetailLevel::None);
    }

    #[test]
    fn test_analyzer_config_builder() {
        let config = AnalyzerConfig::new()
            .with_detail(DetailLevel::All)
            .with_max_capture_bytes(128);
        assert_eq!(config.detail, DetailLevel::All);
        assert_eq!(config.max_capture_bytes, 128);
        assert_eq!(AnalyzerConfig::default().detail, DetailLevel::Failed);
    }
}
