//! DOM Batcher
//!
//! DOM 変更をまとめて適用する。適用順序は常に
//! 削除 → 内容更新 → スタイル → 属性 → 挿入 で、レイアウトの再計算を抑える。
//! 挿入は親ごとにフラグメントへまとめ、親1つにつき append は1回だけ行う。

use super::batcher::{BatchProcessor, BatcherConfig, DataBatcher};
use super::item::{BatchItem, Priority};
use crate::dom::{Content, DomHost, DomTarget, NodeId};
use crate::error::{DomError, Result};
use crate::scheduler::Scheduler;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// DOM 変更の種類（宣言順が適用順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Remove,
    Update,
    Style,
    Attribute,
    Insert,
}

/// DOM 変更要求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DomMutation {
    /// `element` を `parent` の末尾に挿入
    Insert { element: NodeId, parent: DomTarget },
    /// 内容を置き換え
    Update { target: DomTarget, content: Content },
    /// 親から切り離す
    Remove { target: DomTarget },
    /// インラインスタイルを設定
    Style {
        target: DomTarget,
        styles: Vec<(String, String)>,
    },
    /// 属性を設定（値が `None` なら削除）
    Attribute {
        target: DomTarget,
        attributes: Vec<(String, Option<String>)>,
    },
}

impl DomMutation {
    /// 変更の種類
    pub fn kind(&self) -> MutationKind {
        match self {
            DomMutation::Insert { .. } => MutationKind::Insert,
            DomMutation::Update { .. } => MutationKind::Update,
            DomMutation::Remove { .. } => MutationKind::Remove,
            DomMutation::Style { .. } => MutationKind::Style,
            DomMutation::Attribute { .. } => MutationKind::Attribute,
        }
    }
}

/// DOM 変更を適用するプロセッサ
///
/// 解決できないセレクタやホスト側のエラーはその変更だけをスキップし、
/// バッチ全体は失敗させない。
pub struct DomMutationProcessor {
    host: Arc<dyn DomHost>,
}

impl DomMutationProcessor {
    /// 新しいプロセッサを作成
    pub fn new(host: Arc<dyn DomHost>) -> Self {
        Self { host }
    }

    fn resolve(&self, target: &DomTarget) -> Option<NodeId> {
        let node = self.host.resolve(target);
        if node.is_none() {
            warn!(dom_target = %target, "DOM target not found, skipping mutation");
        }
        node
    }

    fn apply(&self, mutation: &DomMutation) -> std::result::Result<(), DomError> {
        match mutation {
            DomMutation::Remove { target } => {
                if let Some(node) = self.resolve(target) {
                    self.host.remove(node)?;
                }
            }
            DomMutation::Update { target, content } => {
                if let Some(node) = self.resolve(target) {
                    self.host.set_content(node, Some(content))?;
                }
            }
            DomMutation::Style { target, styles } => {
                if let Some(node) = self.resolve(target) {
                    for (property, value) in styles {
                        self.host.set_style(node, property, value)?;
                    }
                }
            }
            DomMutation::Attribute { target, attributes } => {
                if let Some(node) = self.resolve(target) {
                    for (name, value) in attributes {
                        match value {
                            Some(value) => self.host.set_attribute(node, name, value)?,
                            None => self.host.remove_attribute(node, name)?,
                        }
                    }
                }
            }
            // 挿入は apply_insertions でまとめて処理
            DomMutation::Insert { .. } => {}
        }
        Ok(())
    }

    fn apply_insertions(&self, inserts: &[(NodeId, &DomTarget)]) -> usize {
        // 親ごとにグループ化（初出順）
        let mut groups: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        for (element, parent) in inserts {
            let Some(parent) = self.resolve(parent) else {
                continue;
            };
            match groups.iter_mut().find(|(p, _)| *p == parent) {
                Some((_, elements)) => elements.push(*element),
                None => groups.push((parent, vec![*element])),
            }
        }

        let mut applied = 0;
        for (parent, elements) in groups {
            let fragment = self.host.create_fragment();
            let mut staged = Vec::with_capacity(elements.len());
            for element in elements {
                match self.host.append_child(fragment, element) {
                    Ok(()) => staged.push(element),
                    Err(e) => warn!(%element, %parent, error = %e, "Failed to stage insertion"),
                }
            }
            if !staged.is_empty() {
                match self.host.append_child(parent, fragment) {
                    Ok(()) => applied += staged.len(),
                    Err(e) => {
                        warn!(%parent, count = staged.len(), error = %e, "Failed to append fragment");
                        // 呼び出し側の要素はフラグメントと一緒に破棄しない
                        for element in &staged {
                            let _ = self.host.remove(*element);
                        }
                    }
                }
            }
            if let Err(e) = self.host.dispose(fragment) {
                warn!(%fragment, error = %e, "Failed to dispose fragment");
            }
        }
        applied
    }
}

#[async_trait]
impl BatchProcessor<DomMutation> for DomMutationProcessor {
    async fn process(&self, items: &[BatchItem<DomMutation>]) -> anyhow::Result<()> {
        // 優先度順を保ったまま種類ごとに並べ替える
        let mut ordered: Vec<&DomMutation> = items.iter().map(|item| &item.data).collect();
        ordered.sort_by_key(|mutation| mutation.kind());

        let mut inserts = Vec::new();
        for mutation in ordered {
            if let DomMutation::Insert { element, parent } = mutation {
                inserts.push((*element, parent));
                continue;
            }
            if let Err(e) = self.apply(mutation) {
                warn!(kind = ?mutation.kind(), error = %e, "DOM mutation failed, skipping");
            }
        }

        let inserted = self.apply_insertions(&inserts);
        debug!(
            mutations = items.len(),
            inserted,
            "DOM batch applied"
        );
        Ok(())
    }
}

/// DOM 変更用バッチャー
#[derive(Clone)]
pub struct DomBatcher {
    batcher: DataBatcher<DomMutation>,
    host: Arc<dyn DomHost>,
}

impl DomBatcher {
    /// 新しい DOM バッチャーを作成
    pub fn new(host: Arc<dyn DomHost>, config: BatcherConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let processor: Arc<dyn BatchProcessor<DomMutation>> =
            Arc::new(DomMutationProcessor::new(Arc::clone(&host)));
        Self {
            batcher: DataBatcher::new("dom", config, processor, scheduler),
            host,
        }
    }

    /// 変更を追加
    pub fn add(&self, mutation: DomMutation, priority: Priority) -> String {
        self.batcher.add_with_priority(mutation, priority)
    }

    /// 挿入を追加
    pub fn add_insertion(
        &self,
        element: NodeId,
        parent: impl Into<DomTarget>,
        priority: Priority,
    ) -> String {
        self.add(
            DomMutation::Insert {
                element,
                parent: parent.into(),
            },
            priority,
        )
    }

    /// 内容更新を追加
    pub fn add_update(
        &self,
        target: impl Into<DomTarget>,
        content: Content,
        priority: Priority,
    ) -> String {
        self.add(
            DomMutation::Update {
                target: target.into(),
                content,
            },
            priority,
        )
    }

    /// 削除を追加
    pub fn add_removal(&self, target: impl Into<DomTarget>, priority: Priority) -> String {
        self.add(
            DomMutation::Remove {
                target: target.into(),
            },
            priority,
        )
    }

    /// スタイル更新を追加
    pub fn add_style_update<I, K, V>(
        &self,
        target: impl Into<DomTarget>,
        styles: I,
        priority: Priority,
    ) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let styles = styles
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.add(
            DomMutation::Style {
                target: target.into(),
                styles,
            },
            priority,
        )
    }

    /// 属性更新を追加（値 `None` は削除）
    pub fn add_attribute_update<I, K, V>(
        &self,
        target: impl Into<DomTarget>,
        attributes: I,
        priority: Priority,
    ) -> String
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.map(Into::into)))
            .collect();
        self.add(
            DomMutation::Attribute {
                target: target.into(),
                attributes,
            },
            priority,
        )
    }

    /// 保留中の変更を適用
    pub async fn flush(&self) -> Result<()> {
        self.batcher.flush().await
    }

    /// 保留中の変更を破棄
    pub fn clear(&self) {
        self.batcher.clear()
    }

    /// 保留中の件数
    pub fn size(&self) -> usize {
        self.batcher.size()
    }

    /// 保留中の変更が無いか
    pub fn is_empty(&self) -> bool {
        self.batcher.is_empty()
    }

    /// 適用中か
    pub fn is_processing(&self) -> bool {
        self.batcher.is_processing()
    }

    /// 内部のバッチャー
    pub fn batcher(&self) -> &DataBatcher<DomMutation> {
        &self.batcher
    }

    /// DOM ホスト
    pub fn host(&self) -> &Arc<dyn DomHost> {
        &self.host
    }
}
