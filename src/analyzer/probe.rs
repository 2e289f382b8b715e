//! Synthetic measurement routines

use super::sample::PerformanceSample;
use crate::dom::{Content, DomHost, NodeId};
use crate::error::Result;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Rough per-node footprint used when the host exposes no heap figure
pub const ESTIMATED_BYTES_PER_NODE: u64 = 1024;

/// Measures one sample
pub trait MetricsProbe: Send + Sync {
    /// Runs one measurement cycle synchronously
    fn measure(&self) -> Result<PerformanceSample>;
}

/// Probe that times synthetic cycles against a DOM host
pub struct HostProbe {
    host: Arc<dyn DomHost>,
    cpu_iterations: u64,
    dom_nodes: usize,
    events: usize,
}

impl HostProbe {
    /// Creates a probe with default workload sizes
    pub fn new(host: Arc<dyn DomHost>) -> Self {
        Self {
            host,
            cpu_iterations: 100_000,
            dom_nodes: 100,
            events: 10,
        }
    }

    /// Sets the CPU loop length
    pub fn with_cpu_iterations(mut self, iterations: u64) -> Self {
        self.cpu_iterations = iterations;
        self
    }

    fn elapsed_ms(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }

    /// 計測用ノードを破棄（失敗はログのみ）
    fn discard(&self, node: NodeId) {
        if let Err(e) = self.host.dispose(node) {
            warn!(%node, error = %e, "Failed to dispose probe node");
        }
    }

    /// create → append → layout read → remove
    fn render_cycle(&self) -> Result<f64> {
        let start = Instant::now();
        let probe = self.host.create_element("div");
        let outcome = (|| -> Result<f64> {
            self.host.set_content(
                probe,
                Some(&Content::Text("performance probe".to_string())),
            )?;
            self.host.append_child(self.host.body(), probe)?;
            let layout = self.host.measure_layout(probe);
            self.host.remove(probe)?;
            black_box(layout?);
            Ok(Self::elapsed_ms(start))
        })();
        self.discard(probe);
        outcome
    }

    fn script_cycle(&self) -> f64 {
        let start = Instant::now();
        let mut acc = 0.0f64;
        for i in 0..self.cpu_iterations {
            acc += black_box(i as f64).sqrt();
        }
        black_box(acc);
        Self::elapsed_ms(start)
    }

    /// fragment build → attach → query → detach
    fn dom_cycle(&self) -> Result<f64> {
        let start = Instant::now();
        let container = self.host.create_element("div");
        let fragment = self.host.create_fragment();
        let outcome = (|| -> Result<f64> {
            for i in 0..self.dom_nodes {
                let node = self.host.create_element("span");
                self.host.append_child(fragment, node)?;
                self.host.set_attribute(node, "data-index", &i.to_string())?;
            }
            self.host.append_child(container, fragment)?;
            self.host.append_child(self.host.body(), container)?;
            black_box(self.host.query_selector("span"));
            self.host.remove(container)?;
            Ok(Self::elapsed_ms(start))
        })();
        self.discard(fragment);
        self.discard(container);
        outcome
    }

    fn memory_usage_mb(&self) -> f64 {
        match self.host.used_heap_bytes() {
            Some(bytes) => bytes as f64 / BYTES_PER_MB,
            None => (self.host.node_count() as u64 * ESTIMATED_BYTES_PER_NODE) as f64 / BYTES_PER_MB,
        }
    }

    fn event_cycle(&self) -> Result<f64> {
        let start = Instant::now();
        let target: NodeId = self.host.create_element("button");
        let outcome = (|| -> Result<f64> {
            self.host.append_child(self.host.body(), target)?;
            self.host.add_event_listener(target, "click")?;

            let mut handled = 0;
            for _ in 0..self.events {
                handled += self.host.dispatch_event(target, "click")?;
            }
            black_box(handled);

            self.host.remove_event_listener(target, "click")?;
            self.host.remove(target)?;
            Ok(Self::elapsed_ms(start))
        })();
        self.discard(target);
        outcome
    }
}

impl MetricsProbe for HostProbe {
    fn measure(&self) -> Result<PerformanceSample> {
        Ok(PerformanceSample {
            render_time: self.render_cycle()?,
            script_execution_time: self.script_cycle(),
            dom_manipulation_time: self.dom_cycle()?,
            memory_usage: self.memory_usage_mb(),
            gc_pressure: 0.0,
            event_processing_time: self.event_cycle()?,
            ..PerformanceSample::now()
        })
    }
}
