//! In-memory DOM host

use super::{Content, DomHost, NodeId};
use crate::error::DomError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 1行あたりの仮想レイアウト高さ（px）
const LINE_HEIGHT: f64 = 18.0;

/// 適用された DOM 操作の記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomOperation {
    /// ノードを切り離した
    Remove(NodeId),
    /// 内容を置き換えた
    SetContent(NodeId),
    /// スタイルを設定した
    SetStyle(NodeId, String),
    /// 属性を設定した
    SetAttribute(NodeId, String),
    /// 属性を削除した
    RemoveAttribute(NodeId, String),
    /// 子を追加した（フラグメントの場合は移動した子の数）
    Append {
        /// 追加先
        parent: NodeId,
        /// 追加されたノード数
        count: usize,
    },
    /// レイアウトを読み取った
    Layout(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element(String),
    Fragment,
}

#[derive(Debug, Clone)]
struct VirtualNode {
    kind: NodeKind,
    attributes: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    content: Option<Content>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    listeners: HashMap<String, usize>,
}

impl VirtualNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
            styles: BTreeMap::new(),
            content: None,
            children: Vec::new(),
            parent: None,
            listeners: HashMap::new(),
        }
    }

    fn matches(&self, selector: &str) -> bool {
        let NodeKind::Element(tag) = &self.kind else {
            return false;
        };

        if let Some(id) = selector.strip_prefix('#') {
            self.attributes.get("id").map(|v| v == id).unwrap_or(false)
        } else if let Some(class) = selector.strip_prefix('.') {
            self.attributes
                .get("class")
                .map(|v| v.split_whitespace().any(|c| c == class))
                .unwrap_or(false)
        } else {
            tag.eq_ignore_ascii_case(selector)
        }
    }
}

struct DomState {
    next_id: u64,
    body: NodeId,
    nodes: HashMap<NodeId, VirtualNode>,
    journal: Vec<DomOperation>,
    heap_bytes: Option<u64>,
}

impl DomState {
    fn node(&self, id: NodeId) -> Result<&VirtualNode, DomError> {
        self.nodes.get(&id).ok_or(DomError::NodeNotFound(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut VirtualNode, DomError> {
        self.nodes.get_mut(&id).ok_or(DomError::NodeNotFound(id.0))
    }

    fn insert(&mut self, node: VirtualNode) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, node);
        id
    }

    fn detach(&mut self, id: NodeId) -> Result<bool, DomError> {
        let parent = self.node(id)?.parent;
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.retain(|c| *c != id);
                }
                self.node_mut(id)?.parent = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn connected(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.body];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                order.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    fn text_len(&self, id: NodeId) -> usize {
        self.nodes
            .get(&id)
            .map(|n| {
                n.content.as_ref().map(|c| c.as_str().len()).unwrap_or(0)
                    + n.children.iter().map(|c| self.text_len(*c)).sum::<usize>()
            })
            .unwrap_or(0)
    }
}

/// メモリ上の DOM 実装
///
/// 適用した変更をジャーナルに記録するので、バッチ適用順序の検証に使える。
pub struct VirtualDom {
    state: Mutex<DomState>,
}

impl VirtualDom {
    /// body だけを持つ空のドキュメントを作成
    pub fn new() -> Self {
        let body_id = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(body_id, VirtualNode::new(NodeKind::Element("body".to_string())));

        Self {
            state: Mutex::new(DomState {
                next_id: 1,
                body: body_id,
                nodes,
                journal: Vec::new(),
                heap_bytes: None,
            }),
        }
    }

    /// ヒープ使用量の報告値を設定（`None` で非公開）
    pub fn with_heap_bytes(self, bytes: Option<u64>) -> Self {
        self.state.lock().heap_bytes = bytes;
        self
    }

    /// 記録された操作
    pub fn operations(&self) -> Vec<DomOperation> {
        self.state.lock().journal.clone()
    }

    /// 操作記録を消去
    pub fn clear_operations(&self) {
        self.state.lock().journal.clear();
    }

    /// 子ノード一覧
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// 内容
    pub fn content(&self, node: NodeId) -> Option<Content> {
        self.state.lock().nodes.get(&node).and_then(|n| n.content.clone())
    }

    /// インラインスタイル値
    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .and_then(|n| n.styles.get(property).cloned())
    }

    /// インラインスタイル数
    pub fn style_count(&self, node: NodeId) -> usize {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.styles.len())
            .unwrap_or(0)
    }

    /// 破棄されていないノード数（未接続ノードを含む）
    pub fn arena_len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// ドキュメントに接続されているか
    pub fn is_connected(&self, node: NodeId) -> bool {
        let state = self.state.lock();
        state.is_ancestor(state.body, node)
    }
}

impl Default for VirtualDom {
    fn default() -> Self {
        Self::new()
    }
}

impl DomHost for VirtualDom {
    fn create_element(&self, tag: &str) -> NodeId {
        self.state
            .lock()
            .insert(VirtualNode::new(NodeKind::Element(tag.to_ascii_lowercase())))
    }

    fn create_fragment(&self) -> NodeId {
        self.state.lock().insert(VirtualNode::new(NodeKind::Fragment))
    }

    fn body(&self) -> NodeId {
        self.state.lock().body
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        match &self.state.lock().nodes.get(&node)?.kind {
            NodeKind::Element(tag) => Some(tag.clone()),
            NodeKind::Fragment => None,
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.lock().nodes.get(&node)?.parent
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state.lock().nodes.get(&node)?.attributes.get(name).cloned()
    }

    fn attribute_names(&self, node: NodeId) -> Vec<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut state = self.state.lock();
        state
            .node_mut(node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        state
            .journal
            .push(DomOperation::SetAttribute(node, name.to_string()));
        Ok(())
    }

    fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DomError> {
        let mut state = self.state.lock();
        state.node_mut(node)?.attributes.remove(name);
        state
            .journal
            .push(DomOperation::RemoveAttribute(node, name.to_string()));
        Ok(())
    }

    fn set_style(&self, node: NodeId, property: &str, value: &str) -> Result<(), DomError> {
        let mut state = self.state.lock();
        state
            .node_mut(node)?
            .styles
            .insert(property.to_string(), value.to_string());
        state
            .journal
            .push(DomOperation::SetStyle(node, property.to_string()));
        Ok(())
    }

    fn clear_style(&self, node: NodeId) -> Result<(), DomError> {
        self.state.lock().node_mut(node)?.styles.clear();
        Ok(())
    }

    fn set_content(&self, node: NodeId, content: Option<&Content>) -> Result<(), DomError> {
        let mut state = self.state.lock();

        // 内容の置き換えは既存の子を破棄する
        let children = std::mem::take(&mut state.node_mut(node)?.children);
        for child in children {
            if let Some(c) = state.nodes.get_mut(&child) {
                c.parent = None;
            }
        }

        state.node_mut(node)?.content = content.cloned();
        state.journal.push(DomOperation::SetContent(node));
        Ok(())
    }

    fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let mut state = self.state.lock();
        state.node(parent)?;

        if state.is_ancestor(child, parent) {
            return Err(DomError::InvalidHierarchy(format!(
                "{} is an ancestor of {}",
                child, parent
            )));
        }

        let moved = if state.node(child)?.kind == NodeKind::Fragment {
            std::mem::take(&mut state.node_mut(child)?.children)
        } else {
            state.detach(child)?;
            vec![child]
        };

        for node in &moved {
            state.node_mut(*node)?.parent = Some(parent);
        }
        let count = moved.len();
        state.node_mut(parent)?.children.extend(moved);
        state.journal.push(DomOperation::Append { parent, count });
        Ok(())
    }

    fn remove(&self, node: NodeId) -> Result<(), DomError> {
        let mut state = self.state.lock();
        if state.detach(node)? {
            state.journal.push(DomOperation::Remove(node));
        }
        Ok(())
    }

    fn dispose(&self, node: NodeId) -> Result<(), DomError> {
        let mut state = self.state.lock();
        if node == state.body {
            return Err(DomError::InvalidHierarchy("body cannot be disposed".to_string()));
        }
        if !state.nodes.contains_key(&node) {
            return Ok(());
        }
        state.detach(node)?;
        state.drop_subtree(node);
        Ok(())
    }

    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        let state = self.state.lock();
        let selector = selector.trim();
        state
            .connected()
            .into_iter()
            .find(|id| state.nodes.get(id).map(|n| n.matches(selector)).unwrap_or(false))
    }

    fn node_count(&self) -> usize {
        self.state.lock().connected().len()
    }

    fn measure_layout(&self, node: NodeId) -> Result<f64, DomError> {
        let mut state = self.state.lock();
        state.node(node)?;
        let lines = state.text_len(node).div_ceil(80).max(1);
        state.journal.push(DomOperation::Layout(node));
        Ok(lines as f64 * LINE_HEIGHT)
    }

    fn add_event_listener(&self, node: NodeId, event: &str) -> Result<(), DomError> {
        *self
            .state
            .lock()
            .node_mut(node)?
            .listeners
            .entry(event.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    fn remove_event_listener(&self, node: NodeId, event: &str) -> Result<(), DomError> {
        let mut state = self.state.lock();
        let listeners = &mut state.node_mut(node)?.listeners;
        if let Some(count) = listeners.get_mut(event) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                listeners.remove(event);
            }
        }
        Ok(())
    }

    fn dispatch_event(&self, node: NodeId, event: &str) -> Result<usize, DomError> {
        let state = self.state.lock();
        state.node(node)?;

        // 親方向へバブリング
        let mut handled = 0;
        let mut current = Some(node);
        while let Some(id) = current {
            let n = state.node(id)?;
            handled += n.listeners.get(event).copied().unwrap_or(0);
            current = n.parent;
        }
        Ok(handled)
    }

    fn used_heap_bytes(&self) -> Option<u64> {
        self.state.lock().heap_bytes
    }
}
