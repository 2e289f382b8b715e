use crate::analyzer::AnalyzerConfig;
use crate::batch::BatcherConfig;
use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::pool::{PoolConfig, PoolSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 環境変数のプレフィックス（例: `SHIM_PERF_ANALYZER__MAX_SAMPLES=50`）
pub const ENV_PREFIX: &str = "SHIM_PERF";

/// ホスト設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// レポートに載せる User-Agent。旧エンジン判定にも使う
    pub user_agent: String,
    /// スクリプト計測ループの反復回数
    pub cpu_iterations: u64,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("shim-perf/{}", env!("CARGO_PKG_VERSION")),
            cpu_iterations: 100_000,
        }
    }
}

/// 最適化サブシステム全体の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// プール設定
    pub pools: PoolSettings,
    /// DOM バッチャー設定
    pub dom_batcher: BatcherConfig,
    /// 分析器設定
    pub analyzer: AnalyzerConfig,
    /// ホスト設定
    pub host: HostSettings,
    /// ログ設定
    pub logging: LogConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            pools: PoolSettings::default(),
            dom_batcher: BatcherConfig::for_dom(),
            analyzer: AnalyzerConfig::default(),
            host: HostSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl OptimizerConfig {
    /// デフォルト値 → 設定ファイル → 環境変数の順に重ねて読み込む
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::defaults_builder()?;

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::InvalidConfiguration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "Loading configuration file");
            settings = settings.add_source(
                config::File::from(path).format(config::FileFormat::Toml),
            );
        }

        // 環境変数で上書き
        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: OptimizerConfig = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 文字列から読み込む（省略した項目はデフォルト値）
    ///
    /// `load()` と同じくデフォルト値の上に重ねるので、部分的なセクションでも
    /// セクション固有の既定値（DOM バッチャーの 16ms など）が残る。
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: OptimizerConfig = Self::defaults_builder()?
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    // デフォルト値を最下層に置いたビルダー
    fn defaults_builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .add_source(config::Config::try_from(&OptimizerConfig::default())?))
    }

    /// 値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        let pools = [
            ("pools.spans", &self.pools.spans),
            ("pools.events", &self.pools.events),
            ("pools.arrays", &self.pools.arrays),
            ("pools.objects", &self.pools.objects),
            ("pools.elements", &self.pools.elements),
        ];
        for (name, pool) in pools {
            validate_pool(name, pool)?;
        }

        if self.dom_batcher.max_batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "dom_batcher.max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.analyzer.sample_interval_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "analyzer.sample_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.analyzer.max_samples == 0 {
            return Err(Error::InvalidConfiguration(
                "analyzer.max_samples must be greater than 0".to_string(),
            ));
        }
        self.analyzer.thresholds.validate()
    }

    /// サンプル設定（TOML）
    pub fn sample_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&OptimizerConfig::default())?)
    }
}

fn validate_pool(name: &str, pool: &PoolConfig) -> Result<()> {
    if pool.max_size == 0 {
        return Err(Error::InvalidConfiguration(format!(
            "{}.max_size must be greater than 0",
            name
        )));
    }
    Ok(())
}
