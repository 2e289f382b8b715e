//! ボトルネック分析器の統合テスト

use shim_perf::analyzer::{
    AnalyzerConfig, BottleneckAnalyzer, HostInfo, HostProbe, IssueSeverity, IssueType,
    MetricsProbe, PerformanceSample, LEGACY_ENGINE_GUIDANCE,
};
use shim_perf::dom::{DomHost, VirtualDom};
use shim_perf::scheduler::{ManualScheduler, Scheduler};
use shim_perf::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const LEGACY_UA: &str = "Mozilla/5.0 (Windows NT 6.1; Trident/7.0; rv:11.0) like Gecko";

/// 呼び出し順に render_time = 10, 20, 30 ... を返すプローブ
#[derive(Default)]
struct SequenceProbe {
    calls: AtomicUsize,
}

impl MetricsProbe for SequenceProbe {
    fn measure(&self) -> Result<PerformanceSample> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PerformanceSample {
            render_time: n as f64 * 10.0,
            ..PerformanceSample::now()
        })
    }
}

fn analyzer_with(
    config: AnalyzerConfig,
    user_agent: &str,
    probe: Arc<dyn MetricsProbe>,
) -> (BottleneckAnalyzer, Arc<ManualScheduler>) {
    let scheduler = Arc::new(ManualScheduler::new());
    let s: Arc<dyn Scheduler> = scheduler.clone();
    let analyzer = BottleneckAnalyzer::new(config, HostInfo::from_user_agent(user_agent), probe, s);
    (analyzer, scheduler)
}

#[tokio::test]
async fn test_history_evicts_oldest_sample() {
    let config = AnalyzerConfig {
        max_samples: 2,
        sample_interval_ms: 1000,
        ..AnalyzerConfig::default()
    };
    let (analyzer, scheduler) =
        analyzer_with(config, "shim-perf-test", Arc::new(SequenceProbe::default()));

    analyzer.start_monitoring();
    scheduler.advance(Duration::from_millis(3000)).await;

    let renders: Vec<f64> = analyzer
        .performance_history()
        .iter()
        .map(|s| s.render_time)
        .collect();
    assert_eq!(renders, vec![20.0, 30.0]);

    let avg = analyzer.average_metrics().unwrap();
    assert_eq!(avg.sample_count, 2);
    assert_eq!(avg.render_time, 25.0);

    analyzer.stop_monitoring();
    scheduler.advance(Duration::from_millis(5000)).await;
    assert_eq!(analyzer.performance_history().len(), 2);
}

#[tokio::test]
async fn test_report_grades_render_time() {
    let (analyzer, _) = analyzer_with(
        AnalyzerConfig::default(),
        "shim-perf-test",
        Arc::new(SequenceProbe::default()),
    );

    analyzer.record_sample(PerformanceSample {
        render_time: 600.0,
        script_execution_time: 60.0,
        ..PerformanceSample::now()
    });

    let report = analyzer.generate_report().unwrap();
    assert!(report.has_bottlenecks());
    assert_eq!(report.bottlenecks.len(), 2);

    let render = &report.bottlenecks[0];
    assert_eq!(render.issue_type, IssueType::Render);
    assert_eq!(render.severity, IssueSeverity::Critical);
    assert_eq!(render.measurement, 600.0);
    assert_eq!(render.threshold, 100.0);

    let script = &report.bottlenecks[1];
    assert_eq!(script.issue_type, IssueType::Script);
    assert_eq!(script.severity, IssueSeverity::Medium);

    assert!(!report.is_legacy_engine);
    assert!(!report
        .recommendations
        .iter()
        .any(|r| LEGACY_ENGINE_GUIDANCE.contains(&r.as_str())));
}

#[tokio::test]
async fn test_legacy_engine_report_json() {
    let (analyzer, _) = analyzer_with(
        AnalyzerConfig::default(),
        LEGACY_UA,
        Arc::new(SequenceProbe::default()),
    );

    let report = analyzer.generate_report().unwrap();
    assert!(report.is_legacy_engine);
    assert!(!report.has_bottlenecks());
    for guidance in LEGACY_ENGINE_GUIDANCE {
        assert!(report.recommendations.iter().any(|r| r == guidance));
    }

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["isLegacyEngine"], true);
    assert_eq!(json["userAgent"], LEGACY_UA);
    assert_eq!(json["metrics"]["renderTime"], 10.0);
    assert!(json["bottlenecks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_host_probe_against_virtual_dom() {
    let dom = Arc::new(VirtualDom::new().with_heap_bytes(Some(64 * 1024 * 1024)));
    let host: Arc<dyn DomHost> = dom.clone();
    let probe: Arc<dyn MetricsProbe> = Arc::new(HostProbe::new(host).with_cpu_iterations(1_000));
    let (analyzer, _) = analyzer_with(AnalyzerConfig::default(), "shim-perf-test", probe);

    let before = dom.node_count();
    let sample = analyzer.collect_metrics().unwrap();
    assert!(sample.render_time >= 0.0);
    assert!(sample.script_execution_time >= 0.0);
    assert!(sample.dom_manipulation_time >= 0.0);
    assert_eq!(sample.memory_usage, 64.0);
    assert_eq!(sample.gc_pressure, 0.0);

    // 計測用ノードは残らない
    assert_eq!(dom.node_count(), before);
    // collect_metrics は履歴に追加しない
    assert!(analyzer.performance_history().is_empty());

    let report = analyzer.generate_report().unwrap();
    let memory = report
        .bottlenecks
        .iter()
        .find(|issue| issue.issue_type == IssueType::Memory)
        .unwrap();
    assert_eq!(memory.severity, IssueSeverity::High);
}
