//! EntSync - 实体同步引擎
//!
//! 追踪领域记录的每次变更（创建 / 更新 / 删除），把变更增量地
//! 暴露给互相独立的外部消费方（"伙伴"：移动设备、下游集成等），
//! 不需要每次重传全量数据。核心能力：
//! - 🔢 提交序列：并发写者下可持久、严格递增的全序
//! - 📍 持久游标：每个伙伴按自己的进度独立消费
//! - 🪦 墓碑日志：把普通查询看不到的删除暴露给消费方
//! - 🔁 at-least-once：导出无副作用，崩溃重试原样重发
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use entsync::{SyncConfig, SyncCoordinator, SyncStorage, FilterSet};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::builder()
//!         .base_path("/path/to/data")
//!         .build();
//!     let storage = Arc::new(SyncStorage::new(config).await?);
//!     let coordinator = SyncCoordinator::new(storage.clone());
//!
//!     // 写路径：保存即盖提交号
//!     storage.save_entity("tenant1", "issue", "e1", serde_json::json!({"status": "open"})).await?;
//!
//!     // 读路径：注册伙伴、观察类型、增量导出
//!     let partner = coordinator.register_partner("tenant1", "owner1", "device-42").await?;
//!     let mut collection = coordinator.watch("tenant1", &partner, "issue", FilterSet::new()).await?;
//!     loop {
//!         let batch = collection.export_changed(100).await?;
//!         if batch.is_empty() {
//!             break;
//!         }
//!         // ... 持久处理这一批 ...
//!         let high = batch.last().unwrap().commit_id();
//!         collection.advance_cursor(high).await?;
//!     }
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod config;
pub mod error;
pub mod storage;
pub mod sync;

// 重新导出核心类型，方便使用
pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{EntSyncError, Result};
pub use storage::entities::{
    CollectionRecord, CommitId, EntityRecord, FilterSet, HeadPointer, Partner, TombstoneEntry,
};
pub use storage::{EntityStore, SyncStorage};
pub use sync::{
    apply_import, filters_hash, ChangeRecord, Collection, ImportChange, ImportFailure,
    ImportOperation, ImportReport, SyncCoordinator,
};
