//! Object Pooling Module
//!
//! 頻繁な小さい割り当てを再利用オブジェクトで置き換えるプール群

mod factories;
mod manager;
mod object_pool;

pub use factories::{
    ElementFactory, EventFactory, EventRecord, MapFactory, SpanFactory, SpanRecord, SpanStatus,
    ValueMap, VecFactory,
};
pub use manager::{
    element_pool_name, ManagedPool, PoolManager, PoolSettings, PoolSizeStats, ARRAY_POOL,
    EVENT_POOL, OBJECT_POOL, SPAN_POOL,
};
pub use object_pool::{FnFactory, ObjectPool, PoolConfig, PoolFactory, PoolStats};
