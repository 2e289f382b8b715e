//! プールの統合テスト

use shim_perf::dom::{DomHost, NodeId, VirtualDom};
use shim_perf::pool::{
    element_pool_name, ElementFactory, EventRecord, FnFactory, ObjectPool, PoolConfig,
    PoolManager, PoolSettings, PoolSizeStats, SpanRecord, ValueMap, ARRAY_POOL, EVENT_POOL,
    OBJECT_POOL, SPAN_POOL,
};
use serde_json::Value;
use std::sync::Arc;

#[test]
fn test_overflow_returns_untracked_objects() {
    let mut pool = ObjectPool::new(
        FnFactory::new(|| String::from("fresh")),
        PoolConfig {
            initial_size: 0,
            max_size: 1,
            allow_growth: false,
            reset_on_release: true,
        },
    );

    // 成長無効・上限1でも取得は失敗しない
    let first = pool.acquire();
    let second = pool.acquire();
    assert_eq!(first, "fresh");
    assert_eq!(second, "fresh");
    assert_eq!(pool.size(), 0);

    pool.release(first);
    pool.release(second);
    assert_eq!(pool.available(), 1);
}

#[test]
fn test_bound_holds_under_mixed_workload() {
    let mut pool = ObjectPool::new(
        FnFactory::new(Vec::<u8>::new).with_reset(|v| v.clear()),
        PoolConfig {
            initial_size: 3,
            max_size: 5,
            ..PoolConfig::default()
        },
    );

    let mut held = Vec::new();
    let mut last_size = pool.size();
    for round in 0..200u32 {
        if round % 7 < 4 {
            held.push(pool.acquire());
        } else if let Some(obj) = held.pop() {
            pool.release(obj);
        }
        assert!(pool.available() <= 5);
        assert!(pool.size() >= last_size);
        last_size = pool.size();
    }

    for obj in held {
        pool.release(obj);
    }
    assert!(pool.available() <= 5);
    assert!(pool.stats().reuse_rate() <= 1.0);
}

#[test]
fn test_validator_gate_leaves_available_unchanged() {
    let mut pool = ObjectPool::new(
        FnFactory::new(|| 0i64).with_validate(|n| *n >= 0),
        PoolConfig {
            initial_size: 2,
            ..PoolConfig::default()
        },
    );

    let before = pool.available();
    pool.release(-1);
    assert_eq!(pool.available(), before);
}

#[test]
fn test_manager_default_pools_are_typed() {
    let mut manager = PoolManager::with_default_pools(&PoolSettings::default());

    let span = {
        let spans = manager.get_pool::<SpanRecord>(SPAN_POOL).unwrap();
        let mut span = spans.acquire();
        span.name.push_str("render");
        span
    };
    manager.get_pool::<SpanRecord>(SPAN_POOL).unwrap().release(span);

    let events = manager.get_pool::<EventRecord>(EVENT_POOL).unwrap();
    let event = events.acquire();
    events.release(event);

    let arrays = manager.get_pool::<Vec<Value>>(ARRAY_POOL).unwrap();
    let mut array = arrays.acquire();
    array.push(Value::from(1));
    arrays.release(array);
    assert!(manager.get_pool::<Vec<Value>>(ARRAY_POOL).unwrap().acquire().is_empty());

    assert!(manager.get_pool::<ValueMap>(OBJECT_POOL).is_some());
    assert!(manager.get_pool::<ValueMap>(SPAN_POOL).is_none());

    let stats = manager.stats();
    assert_eq!(stats.len(), 4);
    assert_eq!(
        stats[SPAN_POOL],
        PoolSizeStats {
            size: 10,
            available: 10
        }
    );
}

#[test]
fn test_element_pool_through_manager() {
    let dom = Arc::new(VirtualDom::new());
    let host: Arc<dyn DomHost> = dom.clone();
    let mut manager = PoolManager::new();
    manager.create_pool::<NodeId, _>(
        element_pool_name("li"),
        ElementFactory::new(host, "li"),
        PoolConfig {
            initial_size: 2,
            max_size: 4,
            ..PoolConfig::default()
        },
    );

    let pool = manager.get_pool::<NodeId>(&element_pool_name("li")).unwrap();
    let li = pool.acquire();
    assert_eq!(dom.tag_name(li).as_deref(), Some("li"));

    dom.append_child(dom.body(), li).unwrap();
    dom.set_attribute(li, "data-id", "7").unwrap();
    pool.release(li);

    assert!(!dom.is_connected(li));
    assert_eq!(dom.attribute(li, "data-id"), None);

    // 別タグの要素は受け付けない
    let div = dom.create_element("div");
    let before = pool.available();
    pool.release(div);
    assert_eq!(pool.available(), before);

    assert!(manager.remove_pool(&element_pool_name("li")));
    assert!(manager.is_empty());
}
