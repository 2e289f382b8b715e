//! Batching
//!
//! 汎用データバッチャーと、その上に構築した DOM 変更バッチャー。

mod batcher;
mod dom_batcher;
mod item;

pub use batcher::{BatchProcessor, BatcherConfig, DataBatcher};
pub use dom_batcher::{DomBatcher, DomMutation, DomMutationProcessor, MutationKind};
pub use item::{BatchItem, Priority};
