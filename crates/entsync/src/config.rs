//! 引擎配置 - 路径与导出批大小等
//!
//! 所有运行期参数集中在 [`SyncConfig`]，通过 builder 构造。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 默认导出批大小（单次 export_changed 的上限）
pub const DEFAULT_EXPORT_BATCH: u32 = 100;

/// 同步引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 租户数据存储的基础路径（每租户一个 sync.db）
    pub base_path: PathBuf,
    /// export_changed_default 使用的批大小
    pub default_export_batch: u32,
    /// SQLite page cache 大小（KiB，负值语义交给 pragma）
    pub sqlite_cache_kib: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./entsync_data"),
            default_export_batch: DEFAULT_EXPORT_BATCH,
            sqlite_cache_kib: 16 * 1024,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }
}

/// 配置构建器
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn base_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.base_path = path.as_ref().to_path_buf();
        self
    }

    pub fn default_export_batch(mut self, batch: u32) -> Self {
        self.config.default_export_batch = batch;
        self
    }

    pub fn sqlite_cache_kib(mut self, kib: i64) -> Self {
        self.config.sqlite_cache_kib = kib;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
