//! Specialized pool factories
//!
//! テレメトリのスパン／イベントレコード、DOM 要素、配列、マップ用のファクトリ。
//! リセットは確保済みの容量を残したままゼロ値の形に戻す。

use super::object_pool::PoolFactory;
use crate::dom::{DomHost, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// スパンの終了ステータス
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    /// 未設定
    #[default]
    Unset,
    /// 正常
    Ok,
    /// エラー
    Error,
}

/// テレメトリイベントレコード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// イベント名
    pub name: String,
    /// タイムスタンプ（ミリ秒）
    pub timestamp: i64,
    /// 属性
    pub attributes: HashMap<String, Value>,
}

impl EventRecord {
    /// ゼロ値に戻す
    pub fn reset(&mut self) {
        self.name.clear();
        self.timestamp = 0;
        self.attributes.clear();
    }
}

/// テレメトリスパンレコード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// トレースID
    pub trace_id: String,
    /// スパンID
    pub span_id: String,
    /// 親スパンID
    pub parent_span_id: Option<String>,
    /// スパン名
    pub name: String,
    /// 開始時刻（ミリ秒）
    pub start_time: i64,
    /// 終了時刻（ミリ秒）
    pub end_time: Option<i64>,
    /// 属性
    pub attributes: HashMap<String, Value>,
    /// スパン内イベント
    pub events: Vec<EventRecord>,
    /// ステータス
    pub status: SpanStatus,
}

impl SpanRecord {
    /// ゼロ値に戻す
    pub fn reset(&mut self) {
        self.trace_id.clear();
        self.span_id.clear();
        self.parent_span_id = None;
        self.name.clear();
        self.start_time = 0;
        self.end_time = None;
        self.attributes.clear();
        self.events.clear();
        self.status = SpanStatus::Unset;
    }

    /// 経過時間（ミリ秒）。未終了なら `None`
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// スパンレコード用ファクトリ
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanFactory;

impl PoolFactory<SpanRecord> for SpanFactory {
    fn create(&self) -> SpanRecord {
        SpanRecord::default()
    }

    fn reset(&self, obj: &mut SpanRecord) {
        obj.reset();
    }
}

/// イベントレコード用ファクトリ
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFactory;

impl PoolFactory<EventRecord> for EventFactory {
    fn create(&self) -> EventRecord {
        EventRecord::default()
    }

    fn reset(&self, obj: &mut EventRecord) {
        obj.reset();
    }
}

/// 配列用ファクトリ
pub struct VecFactory<T> {
    capacity: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> VecFactory<T> {
    /// 初期容量を指定して作成
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for VecFactory<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T> PoolFactory<Vec<T>> for VecFactory<T> {
    fn create(&self) -> Vec<T> {
        Vec::with_capacity(self.capacity)
    }

    fn reset(&self, obj: &mut Vec<T>) {
        obj.clear();
    }
}

/// キー／値マップ
pub type ValueMap = HashMap<String, Value>;

/// マップ用ファクトリ
#[derive(Debug, Clone, Copy, Default)]
pub struct MapFactory;

impl PoolFactory<ValueMap> for MapFactory {
    fn create(&self) -> ValueMap {
        HashMap::new()
    }

    fn reset(&self, obj: &mut ValueMap) {
        obj.clear();
    }
}

/// DOM 要素用ファクトリ
///
/// 返却時に属性・内容・インラインスタイルを消去し、親から切り離す。
/// 検証ではタグ名が設定と一致することを確認する。
pub struct ElementFactory {
    host: Arc<dyn DomHost>,
    tag: String,
}

impl ElementFactory {
    /// タグを指定して作成
    pub fn new(host: Arc<dyn DomHost>, tag: impl Into<String>) -> Self {
        Self {
            host,
            tag: tag.into().to_ascii_lowercase(),
        }
    }

    /// 対象タグ
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl PoolFactory<NodeId> for ElementFactory {
    fn create(&self) -> NodeId {
        self.host.create_element(&self.tag)
    }

    fn reset(&self, obj: &mut NodeId) {
        let node = *obj;
        for name in self.host.attribute_names(node) {
            if let Err(e) = self.host.remove_attribute(node, &name) {
                warn!(%node, attribute = %name, error = %e, "Failed to strip attribute");
            }
        }

        let cleared = self
            .host
            .set_content(node, None)
            .and_then(|_| self.host.clear_style(node))
            .and_then(|_| self.host.remove(node));
        if let Err(e) = cleared {
            warn!(%node, error = %e, "Failed to reset pooled element");
        }
    }

    fn validate(&self, obj: &NodeId) -> bool {
        self.host
            .tag_name(*obj)
            .map(|tag| tag.eq_ignore_ascii_case(&self.tag))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Content, VirtualDom};
    use crate::pool::{ObjectPool, PoolConfig};

    fn empty_config() -> PoolConfig {
        PoolConfig {
            initial_size: 0,
            ..PoolConfig::default()
        }
    }

    #[test]
    fn test_span_reset_restores_zero_shape() {
        let mut pool = ObjectPool::new(SpanFactory, empty_config());

        let mut span = pool.acquire();
        span.trace_id.push_str("4bf92f3577b34da6");
        span.name.push_str("GET /api");
        span.start_time = 100;
        span.end_time = Some(150);
        span.status = SpanStatus::Error;
        span.events.push(EventRecord {
            name: "exception".to_string(),
            timestamp: 120,
            attributes: HashMap::new(),
        });
        assert_eq!(span.duration_ms(), Some(50));
        pool.release(span);

        let reused = pool.acquire();
        assert_eq!(reused, SpanRecord::default());
    }

    #[test]
    fn test_event_and_map_pools() {
        let mut events = ObjectPool::new(EventFactory, empty_config());
        let mut event = events.acquire();
        event.name.push_str("click");
        event
            .attributes
            .insert("target".to_string(), Value::from("button"));
        events.release(event);
        assert_eq!(events.acquire(), EventRecord::default());

        let mut maps = ObjectPool::new(MapFactory, empty_config());
        let mut map = maps.acquire();
        map.insert("k".to_string(), Value::from(1));
        maps.release(map);
        assert!(maps.acquire().is_empty());
    }

    #[test]
    fn test_vec_factory_capacity() {
        let mut pool = ObjectPool::new(VecFactory::<u32>::with_capacity(16), empty_config());
        let v = pool.acquire();
        assert!(v.capacity() >= 16);
    }

    #[test]
    fn test_element_reset_detaches_and_strips() {
        let dom = Arc::new(VirtualDom::new());
        let host: Arc<dyn DomHost> = dom.clone();
        let mut pool = ObjectPool::new(ElementFactory::new(host, "DIV"), empty_config());

        let el = pool.acquire();
        dom.set_attribute(el, "class", "card").unwrap();
        dom.set_style(el, "color", "red").unwrap();
        dom.set_content(el, Some(&Content::Text("hello".to_string())))
            .unwrap();
        dom.append_child(dom.body(), el).unwrap();

        pool.release(el);

        assert_eq!(pool.available(), 1);
        assert!(dom.attribute_names(el).is_empty());
        assert_eq!(dom.style_count(el), 0);
        assert_eq!(dom.content(el), None);
        assert_eq!(dom.parent(el), None);
    }

    #[test]
    fn test_element_pool_rejects_wrong_tag() {
        let dom = Arc::new(VirtualDom::new());
        let host: Arc<dyn DomHost> = dom.clone();
        let mut pool = ObjectPool::new(ElementFactory::new(host, "div"), empty_config());

        let span = dom.create_element("span");
        pool.release(span);

        assert_eq!(pool.available(), 0);
    }
}
