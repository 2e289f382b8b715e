//! Batch item types

use serde::{Deserialize, Serialize};
use std::fmt;

/// 処理優先度
///
/// 並び順は `High < Normal < Low`。フラッシュ直前にこの順で安定ソートする。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// 高
    High,
    /// 通常
    #[default]
    Normal,
    /// 低
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        f.write_str(s)
    }
}

/// キューに積まれた1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem<T> {
    /// アイテムID
    pub id: String,
    /// ペイロード
    pub data: T,
    /// 追加時刻（ミリ秒）
    pub timestamp: i64,
    /// 優先度
    pub priority: Priority,
    /// 失敗したバッチに含まれていた回数
    pub retry_count: u32,
}

impl<T> BatchItem<T> {
    /// 新しいアイテムを作成
    pub fn new(id: impl Into<String>, data: T, priority: Priority) -> Self {
        Self {
            id: id.into(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
            priority,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Normal];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::High, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn test_priority_serde() {
        let json = serde_json::to_string(&Priority::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, Priority::Low);
    }

    #[test]
    fn test_new_item() {
        let item = BatchItem::new("a-1", 42, Priority::default());
        assert_eq!(item.priority, Priority::Normal);
        assert_eq!(item.retry_count, 0);
        assert!(item.timestamp > 0);
    }
}
