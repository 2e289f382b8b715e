//! Bottleneck analysis
//!
//! Periodic sampling of render, script, DOM, memory and event cost, thresholded into
//! issues and recommendations.

pub mod bottleneck;
pub mod issue;
pub mod probe;
pub mod recommendation;
pub mod report;
pub mod sample;

pub use bottleneck::{AnalyzerConfig, BottleneckAnalyzer};
pub use issue::{detect_issues, IssueSeverity, IssueType, PerformanceIssue, Thresholds};
pub use probe::{HostProbe, MetricsProbe, ESTIMATED_BYTES_PER_NODE};
pub use recommendation::{build_recommendations, recommendations_for, LEGACY_ENGINE_GUIDANCE};
pub use report::{HostInfo, PerformanceReport};
pub use sample::{AverageMetrics, PerformanceSample};
