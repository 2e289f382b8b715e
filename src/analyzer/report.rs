//! Performance report

use super::issue::PerformanceIssue;
use super::sample::PerformanceSample;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Host identification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// User agent string
    pub user_agent: String,
    /// Whether the host is the legacy engine profile
    pub legacy_engine: bool,
}

impl HostInfo {
    /// Derives the engine profile from a user agent string
    pub fn from_user_agent(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let legacy_engine = user_agent.contains("Trident/") || user_agent.contains("MSIE ");
        Self {
            user_agent,
            legacy_engine,
        }
    }
}

/// Report produced by the analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    /// Generation time (ms since epoch)
    pub timestamp: i64,
    pub user_agent: String,
    pub is_legacy_engine: bool,
    /// Sample the report was derived from
    pub metrics: PerformanceSample,
    pub bottlenecks: Vec<PerformanceIssue>,
    pub recommendations: Vec<String>,
}

impl PerformanceReport {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether any issue was detected
    pub fn has_bottlenecks(&self) -> bool {
        !self.bottlenecks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_detection() {
        assert!(HostInfo::from_user_agent("Mozilla/5.0 (Windows NT 6.1; Trident/7.0; rv:11.0) like Gecko").legacy_engine);
        assert!(HostInfo::from_user_agent("Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.1)").legacy_engine);
        assert!(!HostInfo::from_user_agent("Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/120.0").legacy_engine);
    }

    #[test]
    fn test_to_json() {
        let report = PerformanceReport {
            timestamp: 1,
            user_agent: "test".to_string(),
            is_legacy_engine: false,
            metrics: PerformanceSample::default(),
            bottlenecks: Vec::new(),
            recommendations: vec!["a".to_string()],
        };
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["isLegacyEngine"], false);
        assert_eq!(value["metrics"]["renderTime"], 0.0);
        assert!(!report.has_bottlenecks());
    }
}
