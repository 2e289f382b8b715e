//! Performance samples

use serde::{Deserialize, Serialize};

/// One measurement of the tracked cost dimensions
///
/// Times are in milliseconds, memory in megabytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    /// Measurement timestamp (ms since epoch)
    pub timestamp: i64,
    /// Synthetic render cycle time
    pub render_time: f64,
    /// CPU-bound script time
    pub script_execution_time: f64,
    /// DOM manipulation time
    pub dom_manipulation_time: f64,
    /// Heap usage estimate
    pub memory_usage: f64,
    /// Always 0; no GC-pressure instrument exists on the host
    pub gc_pressure: f64,
    /// Event dispatch time
    pub event_processing_time: f64,
}

impl PerformanceSample {
    /// Creates a sample stamped with the current time
    pub fn now() -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            ..Self::default()
        }
    }
}

/// Arithmetic mean across the sample history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageMetrics {
    /// Number of samples averaged
    pub sample_count: usize,
    pub render_time: f64,
    pub script_execution_time: f64,
    pub dom_manipulation_time: f64,
    pub memory_usage: f64,
    pub event_processing_time: f64,
}

impl AverageMetrics {
    /// Averages the given samples, `None` when empty
    pub fn from_samples<'a, I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a PerformanceSample>,
    {
        let mut avg = AverageMetrics {
            sample_count: 0,
            render_time: 0.0,
            script_execution_time: 0.0,
            dom_manipulation_time: 0.0,
            memory_usage: 0.0,
            event_processing_time: 0.0,
        };

        for s in samples {
            avg.sample_count += 1;
            avg.render_time += s.render_time;
            avg.script_execution_time += s.script_execution_time;
            avg.dom_manipulation_time += s.dom_manipulation_time;
            avg.memory_usage += s.memory_usage;
            avg.event_processing_time += s.event_processing_time;
        }

        if avg.sample_count == 0 {
            return None;
        }

        let n = avg.sample_count as f64;
        avg.render_time /= n;
        avg.script_execution_time /= n;
        avg.dom_manipulation_time /= n;
        avg.memory_usage /= n;
        avg.event_processing_time /= n;
        Some(avg)
    }
}
