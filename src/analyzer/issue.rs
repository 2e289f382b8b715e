//! Threshold-based issue detection

use super::sample::PerformanceSample;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-dimension ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Render time (ms)
    pub render_time: f64,
    /// Script execution time (ms)
    pub script_time: f64,
    /// DOM manipulation time (ms)
    pub dom_time: f64,
    /// Memory usage (MB)
    pub memory_usage: f64,
    /// Event processing time (ms)
    pub event_time: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            render_time: 100.0,
            script_time: 50.0,
            dom_time: 20.0,
            memory_usage: 50.0,
            event_time: 16.0,
        }
    }
}

impl Thresholds {
    /// Rejects negative or non-finite ceilings
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("render_time", self.render_time),
            ("script_time", self.script_time),
            ("dom_time", self.dom_time),
            ("memory_usage", self.memory_usage),
            ("event_time", self.event_time),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfiguration(format!(
                    "threshold {} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Issue dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Render,
    Script,
    Dom,
    Memory,
    Event,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueType::Render => "render",
            IssueType::Script => "script",
            IssueType::Dom => "dom",
            IssueType::Memory => "memory",
            IssueType::Event => "event",
        };
        f.write_str(s)
    }
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Medium,
    High,
    Critical,
}

/// Thresholded diagnosis derived from a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceIssue {
    /// Dimension
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// Severity
    pub severity: IssueSeverity,
    /// What was observed
    pub description: String,
    /// What the user experiences
    pub impact: String,
    /// Measured value
    pub measurement: f64,
    /// Ceiling it was compared against
    pub threshold: f64,
}

/// Severity once the threshold is exceeded: `escalated` above `factor × threshold`
fn grade(
    value: f64,
    threshold: f64,
    factor: f64,
    escalated: IssueSeverity,
    base: IssueSeverity,
) -> Option<IssueSeverity> {
    if value <= threshold {
        None
    } else if value > threshold * factor {
        Some(escalated)
    } else {
        Some(base)
    }
}

/// Compares one sample against the thresholds
///
/// Issues come out in dimension order: render, script, dom, memory, event.
pub fn detect_issues(sample: &PerformanceSample, thresholds: &Thresholds) -> Vec<PerformanceIssue> {
    use IssueSeverity::{Critical, High, Medium};

    let checks = [
        (
            IssueType::Render,
            sample.render_time,
            thresholds.render_time,
            grade(sample.render_time, thresholds.render_time, 5.0, Critical, High),
            "Render time",
            "ms",
            "Visible jank and delayed first paint",
        ),
        (
            IssueType::Script,
            sample.script_execution_time,
            thresholds.script_time,
            grade(sample.script_execution_time, thresholds.script_time, 3.0, High, Medium),
            "Script execution time",
            "ms",
            "Main thread blocked, input feels sluggish",
        ),
        (
            IssueType::Dom,
            sample.dom_manipulation_time,
            thresholds.dom_time,
            grade(sample.dom_manipulation_time, thresholds.dom_time, 2.0, High, Medium),
            "DOM manipulation time",
            "ms",
            "Layout thrashing during updates",
        ),
        (
            IssueType::Memory,
            sample.memory_usage,
            thresholds.memory_usage,
            grade(sample.memory_usage, thresholds.memory_usage, 2.0, Critical, High),
            "Memory usage",
            "MB",
            "Increased GC pauses and risk of tab crashes",
        ),
        (
            IssueType::Event,
            sample.event_processing_time,
            thresholds.event_time,
            grade(sample.event_processing_time, thresholds.event_time, 2.0, High, Medium),
            "Event processing time",
            "ms",
            "Delayed response to user input",
        ),
    ];

    checks
        .into_iter()
        .filter_map(
            |(issue_type, measurement, threshold, severity, label, unit, impact)| {
                severity.map(|severity| PerformanceIssue {
                    issue_type,
                    severity,
                    description: format!(
                        "{} of {:.1}{} exceeds the {}{} threshold",
                        label, measurement, unit, threshold, unit
                    ),
                    impact: impact.to_string(),
                    measurement,
                    threshold,
                })
            },
        )
        .collect()
}
