//! ボトルネック分析器

use super::issue::{detect_issues, Thresholds};
use super::probe::MetricsProbe;
use super::recommendation::build_recommendations;
use super::report::{HostInfo, PerformanceReport};
use super::sample::{AverageMetrics, PerformanceSample};
use crate::error::Result;
use crate::scheduler::{RepeatingCallback, Scheduler, TimerId};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 分析器設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// 監視を有効化（無効なら start_monitoring は何もしない）
    pub enable_profiling: bool,
    /// サンプリング間隔（ミリ秒）
    pub sample_interval_ms: u64,
    /// 保持するサンプル数
    pub max_samples: usize,
    /// コンテキスト初期化時に監視を開始
    pub auto_start: bool,
    /// 閾値
    pub thresholds: Thresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enable_profiling: true,
            sample_interval_ms: 1000,
            max_samples: 100,
            auto_start: false,
            thresholds: Thresholds::default(),
        }
    }
}

impl AnalyzerConfig {
    /// サンプリング間隔
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

struct AnalyzerInner {
    config: AnalyzerConfig,
    host: HostInfo,
    probe: Arc<dyn MetricsProbe>,
    scheduler: Arc<dyn Scheduler>,
    history: Mutex<VecDeque<PerformanceSample>>,
    timer: Mutex<Option<TimerId>>,
}

impl AnalyzerInner {
    fn push_sample(&self, sample: PerformanceSample) {
        let mut history = self.history.lock();
        history.push_back(sample);
        while history.len() > self.config.max_samples {
            history.pop_front();
        }
    }

    fn tick(&self) {
        match self.probe.measure() {
            Ok(sample) => self.push_sample(sample),
            Err(e) => warn!(error = %e, "Performance measurement failed, skipping tick"),
        }
    }
}

impl Drop for AnalyzerInner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            self.scheduler.cancel(timer);
        }
    }
}

/// ボトルネック分析器
///
/// 一定間隔でサンプルを採取して履歴に保持し、閾値と比較したレポートを生成する。
/// クローンは同じ履歴を共有する。
#[derive(Clone)]
pub struct BottleneckAnalyzer {
    inner: Arc<AnalyzerInner>,
}

impl BottleneckAnalyzer {
    /// 新しい分析器を作成
    pub fn new(
        config: AnalyzerConfig,
        host: HostInfo,
        probe: Arc<dyn MetricsProbe>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let capacity = config.max_samples;
        Self {
            inner: Arc::new(AnalyzerInner {
                config,
                host,
                probe,
                scheduler,
                history: Mutex::new(VecDeque::with_capacity(capacity)),
                timer: Mutex::new(None),
            }),
        }
    }

    /// 設定
    pub fn config(&self) -> &AnalyzerConfig {
        &self.inner.config
    }

    /// ホスト情報
    pub fn host_info(&self) -> &HostInfo {
        &self.inner.host
    }

    /// 監視を開始（実行中または無効なら何もしない）
    pub fn start_monitoring(&self) {
        if !self.inner.config.enable_profiling {
            debug!("Profiling disabled, monitoring not started");
            return;
        }

        let mut timer = self.inner.timer.lock();
        if timer.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let callback: RepeatingCallback = Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.tick();
                }
            }
            .boxed()
        });

        *timer = Some(
            self.inner
                .scheduler
                .schedule_repeating(self.inner.config.sample_interval(), callback),
        );
        info!(
            interval_ms = self.inner.config.sample_interval_ms,
            max_samples = self.inner.config.max_samples,
            "Performance monitoring started"
        );
    }

    /// 監視を停止（冪等）
    pub fn stop_monitoring(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            self.inner.scheduler.cancel(timer);
            info!("Performance monitoring stopped");
        }
    }

    /// 監視中か
    pub fn is_monitoring(&self) -> bool {
        self.inner.timer.lock().is_some()
    }

    /// 1回計測して返す（履歴には追加しない）
    pub fn collect_metrics(&self) -> Result<PerformanceSample> {
        self.inner.probe.measure()
    }

    /// 外部で計測したサンプルを履歴に追加
    pub fn record_sample(&self, sample: PerformanceSample) {
        self.inner.push_sample(sample);
    }

    /// レポートを生成
    ///
    /// 最新の履歴サンプルを使い、履歴が空ならその場で計測する。
    pub fn generate_report(&self) -> Result<PerformanceReport> {
        let latest = self.inner.history.lock().back().cloned();
        let metrics = match latest {
            Some(sample) => sample,
            None => self.collect_metrics()?,
        };

        let bottlenecks = detect_issues(&metrics, &self.inner.config.thresholds);
        let recommendations = build_recommendations(&bottlenecks, self.inner.host.legacy_engine);

        if !bottlenecks.is_empty() {
            debug!(count = bottlenecks.len(), "Performance bottlenecks detected");
        }

        Ok(PerformanceReport {
            timestamp: chrono::Utc::now().timestamp_millis(),
            user_agent: self.inner.host.user_agent.clone(),
            is_legacy_engine: self.inner.host.legacy_engine,
            metrics,
            bottlenecks,
            recommendations,
        })
    }

    /// 履歴のコピー（古い順）
    pub fn performance_history(&self) -> Vec<PerformanceSample> {
        self.inner.history.lock().iter().cloned().collect()
    }

    /// 履歴の平均。空なら `None`
    pub fn average_metrics(&self) -> Option<AverageMetrics> {
        AverageMetrics::from_samples(self.inner.history.lock().iter())
    }

    /// 履歴を消去
    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }
}
