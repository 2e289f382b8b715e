//! Data Batcher
//!
//! サイズと時間でフラッシュする汎用キュー。
//!
//! 状態遷移: Idle（空・タイマーなし）→ Pending（タイマー待ち）→ Flushing（プロセッサ実行中）
//! → Idle / Pending。フラッシュは同時に1つまでで、実行中に要求されたフラッシュは何もしない。

use super::item::{BatchItem, Priority};
use crate::error::{Error, Result};
use crate::scheduler::{Scheduler, TimerId};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// バッチプロセッサ
///
/// エラーを返すとバッチ全体がキューの先頭に戻される。
#[async_trait]
pub trait BatchProcessor<T>: Send + Sync {
    /// 優先度順に並んだバッチを処理
    async fn process(&self, items: &[BatchItem<T>]) -> anyhow::Result<()>;
}

/// バッチャー設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// この件数に達したら即時フラッシュ
    pub max_batch_size: usize,
    /// 自動フラッシュまでの待ち時間（ミリ秒）
    pub flush_interval_ms: u64,
    /// タイマーによる自動フラッシュを有効化
    pub auto_flush: bool,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            flush_interval_ms: 100,
            auto_flush: true,
        }
    }
}

impl BatcherConfig {
    /// DOM 変更向けの既定値（1フレーム）
    pub fn for_dom() -> Self {
        Self {
            max_batch_size: 100,
            flush_interval_ms: 16,
            auto_flush: true,
        }
    }

    /// フラッシュ間隔
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

struct BatcherState<T> {
    queue: Vec<BatchItem<T>>,
    timer: Option<TimerId>,
    is_processing: bool,
}

struct BatcherInner<T> {
    name: String,
    config: BatcherConfig,
    processor: Arc<dyn BatchProcessor<T>>,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<BatcherState<T>>,
    sequence: AtomicU64,
}

impl<T: Send + Sync + 'static> BatcherInner<T> {
    fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{:06}-{}", self.name, seq, &suffix[..8])
    }

    fn arm_timer(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.timer.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        // 発火したタイマーが自分の ID を知るためのセル。state のロック中に埋める
        let own_id = Arc::new(OnceLock::new());
        let fired_id = Arc::clone(&own_id);
        let id = self.scheduler.schedule_once(
            self.config.flush_interval(),
            Box::new(move || {
                async move {
                    if let Some(inner) = weak.upgrade() {
                        {
                            let mut state = inner.state.lock();
                            // 後から張られた別タイマーの ID は消さない
                            if state.timer.is_some() && state.timer == fired_id.get().copied() {
                                state.timer = None;
                            }
                        }
                        // 失敗は process_batch でログ済み
                        let _ = inner.flush().await;
                    }
                }
                .boxed()
            }),
        );
        let _ = own_id.set(id);
        state.timer = Some(id);
    }

    /// キューを作業用コピーに差し替える。実行中または空なら `None`
    fn take_batch(&self) -> Option<Vec<BatchItem<T>>> {
        let mut state = self.state.lock();
        if state.is_processing || state.queue.is_empty() {
            return None;
        }

        if let Some(timer) = state.timer.take() {
            self.scheduler.cancel(timer);
        }
        state.is_processing = true;

        let mut batch = std::mem::take(&mut state.queue);
        batch.sort_by_key(|item| item.priority);
        Some(batch)
    }

    async fn flush(self: &Arc<Self>) -> Result<()> {
        match self.take_batch() {
            Some(batch) => self.process_batch(batch).await,
            None => Ok(()),
        }
    }

    async fn process_batch(self: &Arc<Self>, mut batch: Vec<BatchItem<T>>) -> Result<()> {
        let batch_size = batch.len();
        debug!(batcher = %self.name, batch_size, "Flushing batch");

        let result = self.processor.process(&batch).await;

        let mut rearm = false;
        let outcome = {
            let mut state = self.state.lock();
            state.is_processing = false;

            match result {
                Ok(()) => {
                    rearm = self.config.auto_flush
                        && !state.queue.is_empty()
                        && state.timer.is_none();
                    Ok(())
                }
                Err(source) => {
                    // 失敗したバッチを、処理中に追加された分より前に戻す
                    for item in batch.iter_mut() {
                        item.retry_count = item.retry_count.saturating_add(1);
                    }
                    let arrived = std::mem::replace(&mut state.queue, batch);
                    state.queue.extend(arrived);
                    Err(Error::Processor { batch_size, source })
                }
            }
        };

        match &outcome {
            Ok(()) => debug!(batcher = %self.name, batch_size, "Batch processed"),
            Err(e) => warn!(batcher = %self.name, batch_size, error = %e, "Batch processing failed"),
        }

        if rearm {
            self.arm_timer();
        }
        outcome
    }
}

impl<T> Drop for BatcherInner<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            self.scheduler.cancel(timer);
        }
    }
}

/// 汎用バッチャー
///
/// クローンは同じキューを共有するハンドル。
pub struct DataBatcher<T> {
    inner: Arc<BatcherInner<T>>,
}

impl<T> Clone for DataBatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> DataBatcher<T> {
    /// 新しいバッチャーを作成
    pub fn new(
        name: impl Into<String>,
        config: BatcherConfig,
        processor: Arc<dyn BatchProcessor<T>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                name: name.into(),
                config,
                processor,
                scheduler,
                state: Mutex::new(BatcherState {
                    queue: Vec::new(),
                    timer: None,
                    is_processing: false,
                }),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    /// バッチャー名
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 設定
    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    /// 通常優先度で追加し、アイテムIDを返す
    pub fn add(&self, data: T) -> String {
        self.add_with_priority(data, Priority::Normal)
    }

    /// 優先度を指定して追加し、アイテムIDを返す
    ///
    /// 件数が `max_batch_size` に達した場合はその場でキューを差し替えてフラッシュを開始し、
    /// プロセッサの完了はスケジューラ上で待つ。
    pub fn add_with_priority(&self, data: T, priority: Priority) -> String {
        let id = self.inner.next_id();
        let item = BatchItem::new(id.clone(), data, priority);

        let reached = {
            let mut state = self.inner.state.lock();
            state.queue.push(item);
            state.queue.len() >= self.inner.config.max_batch_size
        };

        if reached {
            if let Some(batch) = self.inner.take_batch() {
                let inner = Arc::clone(&self.inner);
                self.inner.scheduler.spawn(
                    async move {
                        let _ = inner.process_batch(batch).await;
                    }
                    .boxed(),
                );
            }
        } else if self.inner.config.auto_flush {
            self.inner.arm_timer();
        }

        id
    }

    /// キューをプロセッサに流す
    ///
    /// 実行中または空の場合は何もせず `Ok`。プロセッサが失敗した場合、
    /// バッチはキューの先頭に戻され `Error::Processor` を返す。自動再試行はしない。
    pub async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    /// タイマーを止め、未処理アイテムを破棄
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timer.take() {
            self.inner.scheduler.cancel(timer);
        }
        let dropped = state.queue.len();
        state.queue.clear();
        if dropped > 0 {
            debug!(batcher = %self.inner.name, dropped, "Batcher cleared");
        }
    }

    /// キュー内の件数（処理中のバッチは含まない）
    pub fn size(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// キューが空か
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().queue.is_empty()
    }

    /// プロセッサ実行中か
    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().is_processing
    }

    /// フラッシュタイマーが設定されているか
    pub fn has_scheduled_flush(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// キュー内のアイテムID（キュー順）
    pub fn queued_ids(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .queue
            .iter()
            .map(|item| item.id.clone())
            .collect()
    }

    /// キュー内の各アイテムの再試行回数（キュー順）
    pub fn retry_counts(&self) -> Vec<u32> {
        self.inner
            .state
            .lock()
            .queue
            .iter()
            .map(|item| item.retry_count)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{ManualScheduler, OnceCallback, RepeatingCallback};
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<u32>>>,
        fail_next: AtomicBool,
        gate: Option<Arc<Semaphore>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Vec<u32>> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl BatchProcessor<u32> for Recorder {
        async fn process(&self, items: &[BatchItem<u32>]) -> anyhow::Result<()> {
            self.calls
                .lock()
                .push(items.iter().map(|item| item.data).collect());

            if let Some(gate) = &self.gate {
                gate.acquire().await?.forget();
            }

            if self.fail_next.swap(false, Ordering::SeqCst) {
                anyhow::bail!("processor unavailable");
            }
            Ok(())
        }
    }

    fn batcher(
        config: BatcherConfig,
        recorder: &Arc<Recorder>,
        scheduler: &Arc<ManualScheduler>,
    ) -> DataBatcher<u32> {
        let processor: Arc<dyn BatchProcessor<u32>> = recorder.clone();
        let scheduler: Arc<dyn Scheduler> = scheduler.clone();
        DataBatcher::new("test", config, processor, scheduler)
    }

    fn config(max_batch_size: usize) -> BatcherConfig {
        BatcherConfig {
            max_batch_size,
            flush_interval_ms: 1000,
            auto_flush: true,
        }
    }

    #[tokio::test]
    async fn test_size_trigger_flushes_before_interval() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(3), &recorder, &scheduler);

        batcher.add_with_priority(1, Priority::Low);
        batcher.add_with_priority(2, Priority::Normal);
        batcher.add_with_priority(3, Priority::High);

        // キューは add の中で差し替え済み
        assert_eq!(batcher.size(), 0);
        assert!(!batcher.has_scheduled_flush());

        scheduler.run_pending().await;
        assert_eq!(recorder.calls(), vec![vec![3, 2, 1]]);
        assert_eq!(scheduler.now(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_priority_order_is_stable() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(10), &recorder, &scheduler);

        batcher.add_with_priority(1, Priority::Low);
        batcher.add_with_priority(2, Priority::High);
        batcher.add_with_priority(3, Priority::Normal);
        batcher.add_with_priority(4, Priority::High);
        batcher.add(5);

        batcher.flush().await.unwrap();
        assert_eq!(recorder.calls(), vec![vec![2, 4, 3, 5, 1]]);
    }

    #[tokio::test]
    async fn test_timer_flush() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(10), &recorder, &scheduler);

        batcher.add(7);
        assert!(batcher.has_scheduled_flush());
        assert_eq!(scheduler.pending_timers(), 1);

        // 2件目でタイマーは再設定されない
        batcher.add(8);
        assert_eq!(scheduler.pending_timers(), 1);

        scheduler.advance(Duration::from_millis(999)).await;
        assert!(recorder.calls().is_empty());

        scheduler.advance(Duration::from_millis(1)).await;
        assert_eq!(recorder.calls(), vec![vec![7, 8]]);
        assert!(batcher.is_empty());
        assert!(!batcher.has_scheduled_flush());
    }

    #[tokio::test]
    async fn test_auto_flush_disabled() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(
            BatcherConfig {
                auto_flush: false,
                ..config(10)
            },
            &recorder,
            &scheduler,
        );

        batcher.add(1);
        scheduler.advance(Duration::from_secs(10)).await;
        assert!(recorder.calls().is_empty());
        assert_eq!(batcher.size(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_is_requeued_ahead_of_new_items() {
        let recorder = Arc::new(Recorder::default());
        recorder.fail_next.store(true, Ordering::SeqCst);
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(10), &recorder, &scheduler);

        batcher.add(1);
        batcher.add_with_priority(2, Priority::High);

        let err = batcher.flush().await.unwrap_err();
        assert!(matches!(err, Error::Processor { batch_size: 2, .. }));
        assert_eq!(batcher.size(), 2);
        assert_eq!(batcher.retry_counts(), vec![1, 1]);

        batcher.add(3);
        batcher.flush().await.unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec![2, 1]);
        assert_eq!(calls[1], vec![2, 1, 3]);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_no_automatic_retry_after_failure() {
        let recorder = Arc::new(Recorder::default());
        recorder.fail_next.store(true, Ordering::SeqCst);
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(10), &recorder, &scheduler);

        batcher.add(1);
        scheduler.advance(Duration::from_millis(1000)).await;
        assert_eq!(recorder.calls().len(), 1);

        scheduler.advance(Duration::from_secs(60)).await;
        assert_eq!(recorder.calls().len(), 1);
        assert_eq!(batcher.size(), 1);
    }

    #[tokio::test]
    async fn test_flush_while_processing_is_noop() {
        let gate = Arc::new(Semaphore::new(0));
        let recorder = Arc::new(Recorder {
            gate: Some(Arc::clone(&gate)),
            ..Recorder::default()
        });
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(10), &recorder, &scheduler);

        batcher.add(1);
        let running = {
            let batcher = batcher.clone();
            tokio::spawn(async move { batcher.flush().await })
        };
        while !batcher.is_processing() {
            tokio::task::yield_now().await;
        }

        batcher.add(2);
        batcher.flush().await.unwrap();
        assert_eq!(recorder.calls(), vec![vec![1]]);
        assert_eq!(batcher.size(), 1);

        gate.add_permits(1);
        running.await.unwrap().unwrap();
        assert!(!batcher.is_processing());
        assert_eq!(batcher.queued_ids().len(), 1);

        gate.add_permits(1);
        batcher.flush().await.unwrap();
        assert_eq!(recorder.calls(), vec![vec![1], vec![2]]);
    }

    /// 仮想時計で発火した一回限りのコールバックを、実行せずに溜めておくスケジューラ
    #[derive(Default)]
    struct DeferredScheduler {
        clock: ManualScheduler,
        fired: Arc<Mutex<Vec<OnceCallback>>>,
    }

    impl Scheduler for DeferredScheduler {
        fn schedule_once(&self, delay: Duration, callback: OnceCallback) -> TimerId {
            let fired = Arc::clone(&self.fired);
            self.clock.schedule_once(
                delay,
                Box::new(move || {
                    fired.lock().push(callback);
                    futures::future::ready(()).boxed()
                }),
            )
        }

        fn schedule_repeating(&self, interval: Duration, callback: RepeatingCallback) -> TimerId {
            self.clock.schedule_repeating(interval, callback)
        }

        fn cancel(&self, id: TimerId) {
            self.clock.cancel(id)
        }

        fn spawn(&self, task: crate::scheduler::TaskFuture) {
            self.clock.spawn(task)
        }
    }

    #[tokio::test]
    async fn test_late_timer_callback_keeps_newer_timer() {
        let gate = Arc::new(Semaphore::new(0));
        let recorder = Arc::new(Recorder {
            gate: Some(Arc::clone(&gate)),
            ..Recorder::default()
        });
        let scheduler = Arc::new(DeferredScheduler::default());
        let processor: Arc<dyn BatchProcessor<u32>> = recorder.clone();
        let sched: Arc<dyn Scheduler> = scheduler.clone();
        let batcher = DataBatcher::new("late", config(10), processor, sched);

        // タイマーAが期限を迎えてスケジューラから外れたが、コールバックはまだ走っていない
        batcher.add(1);
        scheduler.clock.advance(Duration::from_millis(1000)).await;
        assert_eq!(scheduler.clock.pending_timers(), 0);

        // その間に flush と add が入り、タイマーBが張られる
        let running = {
            let batcher = batcher.clone();
            tokio::spawn(async move { batcher.flush().await })
        };
        while !batcher.is_processing() {
            tokio::task::yield_now().await;
        }
        batcher.add(2);
        assert_eq!(scheduler.clock.pending_timers(), 1);

        let stale = scheduler.fired.lock().pop().unwrap();
        stale().await;

        // タイマーBのハンドルは残っているので clear で取り消せる
        assert!(batcher.has_scheduled_flush());
        batcher.clear();
        assert_eq!(scheduler.clock.pending_timers(), 0);

        gate.add_permits(1);
        running.await.unwrap().unwrap();
        assert_eq!(recorder.calls(), vec![vec![1]]);
    }

    #[tokio::test]
    async fn test_retry_count_saturates() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(10), &recorder, &scheduler);

        batcher.add(7);
        batcher.inner.state.lock().queue[0].retry_count = u32::MAX;
        recorder.fail_next.store(true, Ordering::SeqCst);

        assert!(batcher.flush().await.is_err());
        assert_eq!(batcher.retry_counts(), vec![u32::MAX]);
    }

    #[tokio::test]
    async fn test_clear_discards_and_cancels_timer() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(10), &recorder, &scheduler);

        batcher.add(1);
        batcher.add(2);
        batcher.clear();

        assert!(batcher.is_empty());
        assert_eq!(scheduler.pending_timers(), 0);

        scheduler.advance(Duration::from_secs(5)).await;
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_flush_empty_queue() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(10), &recorder, &scheduler);

        batcher.flush().await.unwrap();
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_item_ids_are_unique() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = batcher(config(100), &recorder, &scheduler);

        let mut ids: Vec<_> = (0..20).map(|n| batcher.add(n)).collect();
        assert!(ids.iter().all(|id| id.starts_with("test-")));
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }
}
