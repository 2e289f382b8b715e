//! Optimization context
//!
//! プール、DOM バッチャー、分析器をまとめて所有し、`initialize()` / `cleanup()` で
//! ライフサイクルを管理する。埋め込み側アプリケーションが明示的に生成して保持する。

use crate::analyzer::{BottleneckAnalyzer, HostInfo, HostProbe, MetricsProbe};
use crate::batch::DomBatcher;
use crate::config::OptimizerConfig;
use crate::dom::{DomHost, NodeId};
use crate::error::{Error, Result};
use crate::pool::{element_pool_name, ElementFactory, PoolManager};
use crate::scheduler::Scheduler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Context lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextState {
    /// Constructed, not yet initialized
    Created,
    /// Initialized and usable
    Running,
    /// cleanup() in progress
    Stopping,
    /// Cleaned up; may be initialized again
    Stopped,
}

struct Components {
    pools: PoolManager,
    dom_batcher: DomBatcher,
    analyzer: BottleneckAnalyzer,
}

/// 最適化コンテキスト
pub struct OptimizationContext {
    config: OptimizerConfig,
    scheduler: Arc<dyn Scheduler>,
    host: Arc<dyn DomHost>,
    state: ContextState,
    components: Option<Components>,
}

impl OptimizationContext {
    /// 新しいコンテキストを作成（未初期化）
    pub fn new(config: OptimizerConfig, scheduler: Arc<dyn Scheduler>, host: Arc<dyn DomHost>) -> Self {
        Self {
            config,
            scheduler,
            host,
            state: ContextState::Created,
            components: None,
        }
    }

    /// プール・バッチャー・分析器を構築
    pub fn initialize(&mut self) -> Result<()> {
        if self.components.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        self.config.validate()?;

        info!("Initializing optimization context...");

        let mut pools = PoolManager::with_default_pools(&self.config.pools);
        for tag in &self.config.pools.element_tags {
            pools.create_pool::<NodeId, _>(
                element_pool_name(tag),
                ElementFactory::new(Arc::clone(&self.host), tag.as_str()),
                self.config.pools.elements.clone(),
            );
        }
        debug!(pools = ?pools.pool_names(), "Pools registered");

        let dom_batcher = DomBatcher::new(
            Arc::clone(&self.host),
            self.config.dom_batcher.clone(),
            Arc::clone(&self.scheduler),
        );

        let probe: Arc<dyn MetricsProbe> = Arc::new(
            HostProbe::new(Arc::clone(&self.host))
                .with_cpu_iterations(self.config.host.cpu_iterations),
        );
        let host_info = HostInfo::from_user_agent(self.config.host.user_agent.clone());
        if host_info.legacy_engine {
            info!(user_agent = %host_info.user_agent, "Legacy engine profile detected");
        }
        let analyzer = BottleneckAnalyzer::new(
            self.config.analyzer.clone(),
            host_info,
            probe,
            Arc::clone(&self.scheduler),
        );
        if self.config.analyzer.auto_start {
            analyzer.start_monitoring();
        }

        self.components = Some(Components {
            pools,
            dom_batcher,
            analyzer,
        });
        self.state = ContextState::Running;

        info!("Optimization context initialized");
        Ok(())
    }

    /// 保留中の DOM 変更を適用し、監視を止め、全プールを空にする
    ///
    /// 未初期化・解放済みなら何もしない。DOM 変更の適用失敗はログのみ。
    pub async fn cleanup(&mut self) -> Result<()> {
        let Some(components) = self.components.take() else {
            return Ok(());
        };

        info!("Cleaning up optimization context...");
        self.state = ContextState::Stopping;

        if let Err(e) = components.dom_batcher.flush().await {
            warn!(error = %e, "Failed to apply pending DOM mutations during cleanup");
        }
        components.dom_batcher.clear();
        components.analyzer.stop_monitoring();

        let mut pools = components.pools;
        pools.clear_all();

        self.state = ContextState::Stopped;
        info!("Optimization context cleanup complete");
        Ok(())
    }

    /// 現在の状態
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// 初期化済みか
    pub fn is_initialized(&self) -> bool {
        self.components.is_some()
    }

    /// 設定
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// DOM ホスト
    pub fn host(&self) -> &Arc<dyn DomHost> {
        &self.host
    }

    fn components(&self) -> Result<&Components> {
        self.components.as_ref().ok_or(Error::NotInitialized)
    }

    /// プールマネージャー
    pub fn pools(&self) -> Result<&PoolManager> {
        Ok(&self.components()?.pools)
    }

    /// プールマネージャー（可変）
    pub fn pools_mut(&mut self) -> Result<&mut PoolManager> {
        self.components
            .as_mut()
            .map(|c| &mut c.pools)
            .ok_or(Error::NotInitialized)
    }

    /// DOM バッチャー
    pub fn dom_batcher(&self) -> Result<&DomBatcher> {
        Ok(&self.components()?.dom_batcher)
    }

    /// 分析器
    pub fn analyzer(&self) -> Result<&BottleneckAnalyzer> {
        Ok(&self.components()?.analyzer)
    }

    /// 要素をプールから取得。プールが無いタグは新規作成
    pub fn acquire_element(&mut self, tag: &str) -> Result<NodeId> {
        let host = Arc::clone(&self.host);
        let pools = self.pools_mut()?;
        Ok(match pools.get_pool::<NodeId>(&element_pool_name(tag)) {
            Some(pool) => pool.acquire(),
            None => host.create_element(tag),
        })
    }

    /// 要素をプールへ返却。プールが無いタグは切り離すだけ
    pub fn release_element(&mut self, tag: &str, element: NodeId) -> Result<()> {
        let host = Arc::clone(&self.host);
        let pools = self.pools_mut()?;
        match pools.get_pool::<NodeId>(&element_pool_name(tag)) {
            Some(pool) => pool.release(element),
            None => host.remove(element)?,
        }
        Ok(())
    }
}
