//! DOM host capability
//!
//! バッチャーとアナライザーが利用するホスト側 DOM プリミティブの抽象。
//! ブラウザ環境ではホストバインディングが、テストでは [`VirtualDom`] が実装する。

mod virtual_dom;

pub use virtual_dom::{DomOperation, VirtualDom};

use crate::error::DomError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// DOM ノード識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// 変更対象の指定方法
///
/// セレクタはフラッシュ時に一度だけ解決される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomTarget {
    /// 生きているノード参照
    Node(NodeId),
    /// `query_selector` で解決するセレクタ
    Selector(String),
}

impl From<NodeId> for DomTarget {
    fn from(node: NodeId) -> Self {
        DomTarget::Node(node)
    }
}

impl From<&str> for DomTarget {
    fn from(selector: &str) -> Self {
        DomTarget::Selector(selector.to_string())
    }
}

impl From<String> for DomTarget {
    fn from(selector: String) -> Self {
        DomTarget::Selector(selector)
    }
}

impl fmt::Display for DomTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomTarget::Node(node) => write!(f, "{}", node),
            DomTarget::Selector(selector) => write!(f, "'{}'", selector),
        }
    }
}

/// 要素の内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    /// テキスト（textContent 相当）
    Text(String),
    /// マークアップ（innerHTML 相当）
    Html(String),
}

impl Content {
    /// 内容の文字列
    pub fn as_str(&self) -> &str {
        match self {
            Content::Text(s) | Content::Html(s) => s,
        }
    }
}

/// ホスト DOM プリミティブ
///
/// すべての操作は同期的。ホストは単一のイベントループから呼ばれる前提。
pub trait DomHost: Send + Sync {
    /// 要素を作成（未接続）
    fn create_element(&self, tag: &str) -> NodeId;

    /// ドキュメントフラグメントを作成
    fn create_fragment(&self) -> NodeId;

    /// ドキュメントのルート要素（body）
    fn body(&self) -> NodeId;

    /// タグ名（小文字）。フラグメントや未知のノードは `None`
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// 親ノード
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// 属性値
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// 属性名の一覧
    fn attribute_names(&self, node: NodeId) -> Vec<String>;

    /// 属性を設定
    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError>;

    /// 属性を削除
    fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DomError>;

    /// インラインスタイルを設定
    fn set_style(&self, node: NodeId, property: &str, value: &str) -> Result<(), DomError>;

    /// インラインスタイルを全削除
    fn clear_style(&self, node: NodeId) -> Result<(), DomError>;

    /// 内容を置き換える（`None` で空にする）
    fn set_content(&self, node: NodeId, content: Option<&Content>) -> Result<(), DomError>;

    /// 子を末尾に追加。フラグメントの場合はその子が移動する
    fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError>;

    /// 親から切り離す（未接続なら何もしない）
    fn remove(&self, node: NodeId) -> Result<(), DomError>;

    /// ノードとその子孫を破棄する。以後その ID は無効になる（未知の ID は無視）
    fn dispose(&self, node: NodeId) -> Result<(), DomError>;

    /// ドキュメント順で最初に一致する接続済み要素
    fn query_selector(&self, selector: &str) -> Option<NodeId>;

    /// ドキュメント内のノード数
    fn node_count(&self) -> usize;

    /// レイアウト値を読み取る（offsetHeight 相当）。読み取り自体がレイアウトを強制する
    fn measure_layout(&self, node: NodeId) -> Result<f64, DomError>;

    /// イベントリスナーを登録
    fn add_event_listener(&self, node: NodeId, event: &str) -> Result<(), DomError>;

    /// イベントリスナーを解除
    fn remove_event_listener(&self, node: NodeId, event: &str) -> Result<(), DomError>;

    /// イベントを発行し、処理したリスナー数を返す
    fn dispatch_event(&self, node: NodeId, event: &str) -> Result<usize, DomError>;

    /// ヒープ使用量（バイト）。ホストが公開しない場合は `None`
    fn used_heap_bytes(&self) -> Option<u64> {
        None
    }

    /// セレクタまたはノード参照を解決
    fn resolve(&self, target: &DomTarget) -> Option<NodeId> {
        match target {
            DomTarget::Node(node) => Some(*node),
            DomTarget::Selector(selector) => self.query_selector(selector),
        }
    }
}
