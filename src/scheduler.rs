//! Timer scheduling
//!
//! バッチャーのフラッシュタイマーとアナライザーのサンプリングタイマーを
//! 差し替え可能にするスケジューラ抽象。本番は tokio、テストは仮想時間。

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// スケジュールされたタスクのフューチャー
pub type TaskFuture = BoxFuture<'static, ()>;

/// 一度だけ実行されるタイマーコールバック
pub type OnceCallback = Box<dyn FnOnce() -> TaskFuture + Send>;

/// 繰り返し実行されるタイマーコールバック
pub type RepeatingCallback = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// タイマー識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// 数値表現
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// タイマースケジューラ
///
/// ホストのイベントループと同じ協調的なモデルを前提とする。
/// `cancel` は以後の発火を止めるだけで、実行中のコールバックは中断しない。
pub trait Scheduler: Send + Sync {
    /// `delay` 後に一度だけコールバックを実行
    fn schedule_once(&self, delay: Duration, callback: OnceCallback) -> TimerId;

    /// `interval` ごとにコールバックを実行
    fn schedule_repeating(&self, interval: Duration, callback: RepeatingCallback) -> TimerId;

    /// タイマーを取り消す（未知のIDは無視）
    fn cancel(&self, id: TimerId);

    /// 即時開始・後で完了するタスクを投入
    fn spawn(&self, task: TaskFuture);
}

/// tokio ランタイム上のスケジューラ
pub struct TokioScheduler {
    handle: Handle,
    next_id: AtomicU64,
    timers: Arc<Mutex<HashMap<TimerId, JoinHandle<()>>>>,
}

impl TokioScheduler {
    /// 指定ランタイムハンドルでスケジューラを作成
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 現在のランタイムからスケジューラを作成
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Scheduler(format!("no tokio runtime available: {}", e)))?;
        Ok(Self::new(handle))
    }

    /// 登録中のタイマー数
    pub fn active_timers(&self) -> usize {
        self.timers.lock().len()
    }

    fn next_timer_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, callback: OnceCallback) -> TimerId {
        let id = self.next_timer_id();
        let timers = Arc::clone(&self.timers);

        // ロックを保持したまま登録し、タスク側の削除と競合しないようにする
        let mut guard = self.timers.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            // 発火後は登録解除してから実行する。自分自身への cancel で中断されないように
            if timers.lock().remove(&id).is_none() {
                return;
            }
            callback().await;
        });
        guard.insert(id, task);
        id
    }

    fn schedule_repeating(&self, interval: Duration, callback: RepeatingCallback) -> TimerId {
        let id = self.next_timer_id();
        let period = interval.max(Duration::from_millis(1));

        let task = self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                callback().await;
            }
        });
        self.timers.lock().insert(id, task);
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(task) = self.timers.lock().remove(&id) {
            task.abort();
        }
    }

    fn spawn(&self, task: TaskFuture) {
        self.handle.spawn(task);
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.lock().drain() {
            task.abort();
        }
    }
}

enum ManualTimerKind {
    Once(OnceCallback),
    Repeating {
        interval: Duration,
        callback: RepeatingCallback,
    },
}

enum Fired {
    Once(OnceCallback),
    Repeating(RepeatingCallback),
}

struct ManualTimer {
    due: Duration,
    kind: ManualTimerKind,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, ManualTimer>,
    ready: VecDeque<TaskFuture>,
}

/// 仮想時間スケジューラ
///
/// `advance` で時計を進めるまでタイマーは発火しない。テスト用。
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    /// 新しい仮想時間スケジューラを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在の仮想時刻
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// 登録中のタイマー数
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// 投入済みで未実行のタスク数
    pub fn pending_tasks(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// 投入済みタスクをすべて実行
    pub async fn run_pending(&self) {
        loop {
            let task = self.state.lock().ready.pop_front();
            match task {
                Some(task) => task.await,
                None => break,
            }
        }
    }

    /// 仮想時計を進め、期限の来たタイマーを順番に発火
    pub async fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        loop {
            self.run_pending().await;

            let fired = {
                let mut state = self.state.lock();
                let next = state
                    .timers
                    .iter()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(id, timer)| (timer.due, **id))
                    .map(|(id, _)| *id);

                match next.and_then(|id| state.timers.remove(&id).map(|t| (id, t))) {
                    Some((id, timer)) => {
                        state.now = state.now.max(timer.due);
                        match timer.kind {
                            ManualTimerKind::Once(callback) => Some(Fired::Once(callback)),
                            ManualTimerKind::Repeating { interval, callback } => {
                                let period = interval.max(Duration::from_millis(1));
                                state.timers.insert(
                                    id,
                                    ManualTimer {
                                        due: timer.due + period,
                                        kind: ManualTimerKind::Repeating {
                                            interval,
                                            callback: Arc::clone(&callback),
                                        },
                                    },
                                );
                                Some(Fired::Repeating(callback))
                            }
                        }
                    }
                    None => None,
                }
            };

            // コールバックはロック外で呼ぶ（内部で cancel/schedule されるため）
            let task = match fired {
                Some(Fired::Once(callback)) => callback(),
                Some(Fired::Repeating(callback)) => callback(),
                None => break,
            };
            task.await;
        }

        self.state.lock().now = target;
        self.run_pending().await;
    }

    fn register(&self, delay: Duration, kind: ManualTimerKind) -> TimerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let due = state.now + delay;
        state.timers.insert(id, ManualTimer { due, kind });
        id
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, callback: OnceCallback) -> TimerId {
        self.register(delay, ManualTimerKind::Once(callback))
    }

    fn schedule_repeating(&self, interval: Duration, callback: RepeatingCallback) -> TimerId {
        let first = interval.max(Duration::from_millis(1));
        self.register(first, ManualTimerKind::Repeating { interval, callback })
    }

    fn cancel(&self, id: TimerId) {
        self.state.lock().timers.remove(&id);
    }

    fn spawn(&self, task: TaskFuture) {
        self.state.lock().ready.push_back(task);
    }
}
