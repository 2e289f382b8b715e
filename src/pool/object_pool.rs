//! Object Pool Implementation

use serde::{Deserialize, Serialize};
use tracing::debug;

/// プールのファクトリ
///
/// `reset` と `validate` は任意。既定実装はそれぞれ「何もしない」「常に受け入れる」で、
/// 未指定の場合はその手順を省略するのと同じ振る舞いになる。
pub trait PoolFactory<T>: Send + Sync {
    /// 新しいオブジェクトを作成
    fn create(&self) -> T;

    /// オブジェクトを初期状態に戻す
    fn reset(&self, _obj: &mut T) {}

    /// 返却されたオブジェクトをプールに戻してよいか
    fn validate(&self, _obj: &T) -> bool {
        true
    }
}

type CreateFn<T> = Box<dyn Fn() -> T + Send + Sync>;
type ResetFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;
type ValidateFn<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// クロージャベースのファクトリ
pub struct FnFactory<T> {
    create: CreateFn<T>,
    reset: Option<ResetFn<T>>,
    validate: Option<ValidateFn<T>>,
}

impl<T> FnFactory<T> {
    /// 生成関数だけを持つファクトリを作成
    pub fn new<F>(create: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            create: Box::new(create),
            reset: None,
            validate: None,
        }
    }

    /// リセット関数を設定
    pub fn with_reset<R>(mut self, reset: R) -> Self
    where
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        self.reset = Some(Box::new(reset));
        self
    }

    /// 検証関数を設定
    pub fn with_validate<V>(mut self, validate: V) -> Self
    where
        V: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Box::new(validate));
        self
    }
}

impl<T> PoolFactory<T> for FnFactory<T> {
    fn create(&self) -> T {
        (self.create)()
    }

    fn reset(&self, obj: &mut T) {
        if let Some(reset) = &self.reset {
            reset(obj);
        }
    }

    fn validate(&self, obj: &T) -> bool {
        self.validate.as_ref().map(|v| v(obj)).unwrap_or(true)
    }
}

/// プール設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 起動時に確保する数（`max_size` が上限）
    pub initial_size: usize,
    /// フリーリストの上限、かつ追跡する生成数の上限
    pub max_size: usize,
    /// 空のときに追跡対象として新規生成するか
    pub allow_growth: bool,
    /// 返却時にリセットを実行するか
    pub reset_on_release: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 10,
            max_size: 100,
            allow_growth: true,
            reset_on_release: true,
        }
    }
}

impl PoolConfig {
    /// 上限を指定して作成
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }
}

/// プール統計
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// 追跡対象として生成した総数
    pub size: usize,
    /// フリーリスト長
    pub available: usize,
    /// 取得回数
    pub total_acquired: u64,
    /// プールに戻った回数
    pub total_released: u64,
    /// 上限
    pub max_size: usize,
}

impl PoolStats {
    /// 取得に対する返却の割合
    pub fn reuse_rate(&self) -> f64 {
        if self.total_acquired == 0 {
            0.0
        } else {
            self.total_released as f64 / self.total_acquired as f64
        }
    }
}

/// オブジェクトプール
///
/// 取得はブロックしない。枯渇時は追跡しない一時オブジェクトを返す。
/// 取得したオブジェクトの所有権は呼び出し側に移り、`release` でのみプールに戻る。
pub struct ObjectPool<T> {
    stack: Vec<T>,
    factory: Box<dyn PoolFactory<T>>,
    config: PoolConfig,
    total_created: usize,
    total_acquired: u64,
    total_released: u64,
}

impl<T> ObjectPool<T> {
    /// 新しいプールを作成し、`initial_size` 分を事前確保
    pub fn new<F>(factory: F, config: PoolConfig) -> Self
    where
        F: PoolFactory<T> + 'static,
    {
        Self::from_boxed(Box::new(factory), config)
    }

    /// ボックス化されたファクトリからプールを作成
    pub fn from_boxed(factory: Box<dyn PoolFactory<T>>, config: PoolConfig) -> Self {
        let mut pool = Self {
            stack: Vec::with_capacity(config.max_size.min(config.initial_size.max(1))),
            factory,
            config,
            total_created: 0,
            total_acquired: 0,
            total_released: 0,
        };
        let initial = pool.config.initial_size;
        pool.pre_allocate(initial);
        pool
    }

    /// オブジェクトを取得
    pub fn acquire(&mut self) -> T {
        self.total_acquired += 1;

        if let Some(obj) = self.stack.pop() {
            return obj;
        }

        if self.config.allow_growth && self.total_created < self.config.max_size {
            self.total_created += 1;
            return self.factory.create();
        }

        // 枯渇時は追跡しない一時オブジェクト
        debug!(
            created = self.total_created,
            max_size = self.config.max_size,
            "Pool exhausted, handing out temporary object"
        );
        self.factory.create()
    }

    /// オブジェクトを返却
    ///
    /// 検証に失敗したもの、フリーリストが満杯のときのものは破棄される。
    pub fn release(&mut self, mut obj: T) {
        if !self.factory.validate(&obj) {
            debug!("Released object failed validation, dropping");
            return;
        }

        if self.config.reset_on_release {
            self.factory.reset(&mut obj);
        }

        if self.stack.len() < self.config.max_size {
            self.stack.push(obj);
            self.total_released += 1;
        }
    }

    /// 最大 `count` 個を事前生成し、実際に生成した数を返す
    pub fn pre_allocate(&mut self, count: usize) -> usize {
        let room = self
            .config
            .max_size
            .saturating_sub(self.total_created)
            .min(self.config.max_size.saturating_sub(self.stack.len()));
        let count = count.min(room);

        for _ in 0..count {
            let mut obj = self.factory.create();
            self.factory.reset(&mut obj);
            self.stack.push(obj);
        }
        self.total_created += count;
        count
    }

    /// 追跡対象として生成した総数
    pub fn size(&self) -> usize {
        self.total_created
    }

    /// フリーリスト長
    pub fn available(&self) -> usize {
        self.stack.len()
    }

    /// 空にしてカウンタを初期化
    pub fn clear(&mut self) {
        self.stack.clear();
        self.total_created = 0;
        self.total_acquired = 0;
        self.total_released = 0;
    }

    /// 設定
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// 統計情報
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.total_created,
            available: self.stack.len(),
            total_acquired: self.total_acquired,
            total_released: self.total_released,
            max_size: self.config.max_size,
        }
    }
}
