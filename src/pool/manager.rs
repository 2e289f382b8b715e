//! Pool Manager
//!
//! 名前付きプールのレジストリ

use super::factories::{
    EventFactory, EventRecord, MapFactory, SpanFactory, SpanRecord, ValueMap, VecFactory,
};
use super::object_pool::{ObjectPool, PoolConfig, PoolFactory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// スパンプール名
pub const SPAN_POOL: &str = "spans";
/// イベントプール名
pub const EVENT_POOL: &str = "events";
/// 配列プール名
pub const ARRAY_POOL: &str = "arrays";
/// マッププール名
pub const OBJECT_POOL: &str = "objects";

/// 型を隠蔽したプール操作
pub trait ManagedPool: Send {
    /// 追跡対象として生成した総数
    fn size(&self) -> usize;
    /// フリーリスト長
    fn available(&self) -> usize;
    /// 空にする
    fn clear(&mut self);
    /// ダウンキャスト用
    fn as_any(&self) -> &dyn Any;
    /// ダウンキャスト用
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + 'static> ManagedPool for ObjectPool<T> {
    fn size(&self) -> usize {
        ObjectPool::size(self)
    }

    fn available(&self) -> usize {
        ObjectPool::available(self)
    }

    fn clear(&mut self) {
        ObjectPool::clear(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// プールごとのサイズ情報
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSizeStats {
    /// 追跡対象として生成した総数
    pub size: usize,
    /// フリーリスト長
    pub available: usize,
}

/// デフォルトプールの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// 要素プールを用意するタグ
    pub element_tags: Vec<String>,
    /// スパンプール
    pub spans: PoolConfig,
    /// イベントプール
    pub events: PoolConfig,
    /// 配列プール
    pub arrays: PoolConfig,
    /// マッププール
    pub objects: PoolConfig,
    /// 要素プール
    pub elements: PoolConfig,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            element_tags: vec!["div".to_string(), "span".to_string()],
            spans: PoolConfig::default(),
            events: PoolConfig::default(),
            arrays: PoolConfig::default(),
            objects: PoolConfig::default(),
            elements: PoolConfig {
                initial_size: 0,
                max_size: 50,
                ..PoolConfig::default()
            },
        }
    }
}

/// 要素プールの登録名
pub fn element_pool_name(tag: &str) -> String {
    format!("element:{}", tag.to_ascii_lowercase())
}

/// プールマネージャー
#[derive(Default)]
pub struct PoolManager {
    pools: HashMap<String, Box<dyn ManagedPool>>,
}

impl PoolManager {
    /// 空のマネージャーを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// スパン・イベント・配列・マップのプールを登録したマネージャーを作成
    pub fn with_default_pools(settings: &PoolSettings) -> Self {
        let mut manager = Self::new();
        manager.create_pool::<SpanRecord, _>(SPAN_POOL, SpanFactory, settings.spans.clone());
        manager.create_pool::<EventRecord, _>(EVENT_POOL, EventFactory, settings.events.clone());
        manager.create_pool::<Vec<Value>, _>(
            ARRAY_POOL,
            VecFactory::<Value>::default(),
            settings.arrays.clone(),
        );
        manager.create_pool::<ValueMap, _>(OBJECT_POOL, MapFactory, settings.objects.clone());
        manager
    }

    /// プールを作成して登録
    ///
    /// 同名のプールがあれば置き換え、`true` を返す（旧プールの内容は破棄され、統合されない）。
    pub fn create_pool<T, F>(&mut self, name: impl Into<String>, factory: F, config: PoolConfig) -> bool
    where
        T: Send + 'static,
        F: PoolFactory<T> + 'static,
    {
        let name = name.into();
        let pool: ObjectPool<T> = ObjectPool::new(factory, config);
        debug!(pool = %name, size = pool.size(), "Pool created");

        let replaced = self.pools.insert(name.clone(), Box::new(pool)).is_some();
        if replaced {
            debug!(pool = %name, "Replaced existing pool");
        }
        replaced
    }

    /// 型付きでプールを取得。名前が無い、または型が違う場合は `None`
    pub fn get_pool<T: Send + 'static>(&mut self, name: &str) -> Option<&mut ObjectPool<T>> {
        self.pools
            .get_mut(name)
            .and_then(|p| p.as_any_mut().downcast_mut::<ObjectPool<T>>())
    }

    /// 型付きでプールを参照
    pub fn pool<T: Send + 'static>(&self, name: &str) -> Option<&ObjectPool<T>> {
        self.pools
            .get(name)
            .and_then(|p| p.as_any().downcast_ref::<ObjectPool<T>>())
    }

    /// 名前が登録されているか
    pub fn contains(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// プールを空にしてから削除。存在したかを返す
    pub fn remove_pool(&mut self, name: &str) -> bool {
        match self.pools.remove(name) {
            Some(mut pool) => {
                pool.clear();
                debug!(pool = %name, "Pool removed");
                true
            }
            None => false,
        }
    }

    /// 全プールを空にして登録を解除
    pub fn clear_all(&mut self) {
        for pool in self.pools.values_mut() {
            pool.clear();
        }
        self.pools.clear();
    }

    /// 登録名一覧（ソート済み）
    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 登録数
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// 登録が無いか
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// プール名ごとのサイズ情報（外部レポート用）
    pub fn stats(&self) -> BTreeMap<String, PoolSizeStats> {
        self.pools
            .iter()
            .map(|(name, pool)| {
                (
                    name.clone(),
                    PoolSizeStats {
                        size: pool.size(),
                        available: pool.available(),
                    },
                )
            })
            .collect()
    }
}
