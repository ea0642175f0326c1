//! 存储模块 - 同步引擎的数据持久化层
//!
//! 采用分层架构设计：
//! - SyncStorage: 统一的存储管理器，提供高级 API
//! - DAO Layer: 数据访问层，每张表一个专门的操作模块
//! - Entities: 数据实体定义，类型安全的数据传输
//! - 每租户一个独立数据库，提交号在租户内唯一
//!
//! 写路径不变量：每次实体变更都在同一事务内取号、落盘、
//! 更新头指针：变更对任何导出查询可见之前必然已盖上提交号。

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::{EntSyncError, Result};

pub mod dao;
pub mod entities;
pub mod sqlite;

pub use dao::{CollectionDao, CommitSeqDao, DaoFactory, EntityDao, HeadDao, PartnerDao, TombstoneDao};
pub use entities::*;
pub use sqlite::SqliteStore;

/// 实体存储协作契约
///
/// 引擎对实体存储只要求三件事：保存时原子盖提交号、
/// 按「提交号大于 X」窗口查询、以及记录删除墓碑。
/// [`SyncStorage`] 自带参考实现；外部系统可以替换。
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// 保存实体，与写入原子地盖上新提交号并返回
    async fn save(
        &self,
        tenant: &str,
        object_type: &str,
        entity_id: &str,
        attributes: serde_json::Value,
    ) -> Result<CommitId>;

    /// 按提交号窗口查询存活实体（升序，带上限）
    async fn query_changed_since(
        &self,
        tenant: &str,
        object_type: &str,
        filters: &FilterSet,
        after: CommitId,
        limit: u32,
    ) -> Result<Vec<EntityRecord>>;

    /// 软删除实体并以新提交号写入墓碑
    async fn mark_deleted(
        &self,
        tenant: &str,
        object_type: &str,
        entity_id: &str,
    ) -> Result<CommitId>;
}

/// 存储管理器 - 统一的数据访问接口
///
/// 功能特性：
/// - 完全控制所有数据库操作，外部无法直接访问 SQLite
/// - 提供领域 API，而非裸 SQL 操作
/// - 多租户数据隔离
/// - 事务安全：取号 + 写入 + 头指针一个事务完成
#[derive(Debug)]
pub struct SyncStorage {
    config: SyncConfig,
    sqlite: SqliteStore,
}

impl SyncStorage {
    pub async fn new(config: SyncConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.base_path)
            .await
            .map_err(|e| EntSyncError::IO(format!("创建基础目录失败: {}", e)))?;
        let sqlite = SqliteStore::new(&config.base_path, config.sqlite_cache_kib);
        info!("存储管理器初始化完成: {}", config.base_path.display());
        Ok(Self { config, sqlite })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ============================================================
    // 实体写路径（参考实现，对应 EntityStore 契约）
    // ============================================================

    /// 保存实体：同一事务内取号、upsert、更新头指针
    pub async fn save_entity(
        &self,
        tenant: &str,
        object_type: &str,
        entity_id: &str,
        attributes: serde_json::Value,
    ) -> Result<CommitId> {
        if !attributes.is_object() {
            return Err(EntSyncError::InvalidInput(format!(
                "attributes 必须是 JSON object: {}/{}",
                object_type, entity_id
            )));
        }
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let mut guard = conn.lock().await;
        let tx = guard.transaction()?;

        let commit_id = DaoFactory::commit_seq_dao(&tx).next_commit_id(object_type)?;
        let now = chrono::Utc::now().timestamp_millis();
        DaoFactory::entity_dao(&tx).upsert(&EntityRecord {
            entity_id: entity_id.to_string(),
            object_type: object_type.to_string(),
            attributes,
            commit_id,
            is_deleted: 0,
            created_at: now,
            updated_at: now,
        })?;
        DaoFactory::head_dao(&tx).save_head(object_type, commit_id)?;
        tx.commit()?;

        debug!(
            "实体已保存: tenant={}, type={}, id={}, commit_id={}",
            tenant, object_type, entity_id, commit_id
        );
        Ok(commit_id)
    }

    pub async fn get_entity(
        &self,
        tenant: &str,
        object_type: &str,
        entity_id: &str,
    ) -> Result<Option<EntityRecord>> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::entity_dao(&guard).get(object_type, entity_id)
    }

    pub async fn query_changed_entities(
        &self,
        tenant: &str,
        object_type: &str,
        filters: &FilterSet,
        after: CommitId,
        limit: u32,
    ) -> Result<Vec<EntityRecord>> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::entity_dao(&guard).list_changed_since(object_type, filters, after, limit)
    }

    /// 软删除（归档）：标记删除、写墓碑、更新头指针，一个事务
    pub async fn archive_entity(
        &self,
        tenant: &str,
        object_type: &str,
        entity_id: &str,
    ) -> Result<CommitId> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let mut guard = conn.lock().await;
        let tx = guard.transaction()?;

        let existing = DaoFactory::entity_dao(&tx).get(object_type, entity_id)?;
        match existing {
            None => {
                return Err(EntSyncError::NotFound(format!(
                    "实体不存在: {}/{}",
                    object_type, entity_id
                )))
            }
            Some(record) if record.is_deleted != 0 => {
                return Err(EntSyncError::NotFound(format!(
                    "实体已删除: {}/{}",
                    object_type, entity_id
                )))
            }
            Some(_) => {}
        }

        let commit_id = DaoFactory::commit_seq_dao(&tx).next_commit_id(object_type)?;
        let now = chrono::Utc::now().timestamp_millis();
        DaoFactory::entity_dao(&tx).mark_deleted(object_type, entity_id, commit_id, now)?;
        DaoFactory::tombstone_dao(&tx).append(&TombstoneEntry {
            id: None,
            object_type: object_type.to_string(),
            entity_id: entity_id.to_string(),
            commit_id,
            deleted_at: now,
        })?;
        DaoFactory::head_dao(&tx).save_head(object_type, commit_id)?;
        tx.commit()?;

        debug!(
            "实体已归档: tenant={}, type={}, id={}, commit_id={}",
            tenant, object_type, entity_id, commit_id
        );
        Ok(commit_id)
    }

    /// 硬清除：直接删行，不产生墓碑也不取号。
    /// 被清除的实体对尚未同步到它的伙伴来说就像从未存在过。
    pub async fn purge_entity(
        &self,
        tenant: &str,
        object_type: &str,
        entity_id: &str,
    ) -> Result<bool> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::entity_dao(&guard).purge(object_type, entity_id)
    }

    // ============================================================
    // 提交序列与头指针
    // ============================================================

    pub async fn next_commit_id(&self, tenant: &str, type_key: &str) -> Result<CommitId> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::commit_seq_dao(&guard).next_commit_id(type_key)
    }

    pub async fn get_head(&self, tenant: &str, type_key: &str) -> Result<CommitId> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::head_dao(&guard).get_head(type_key)
    }

    pub async fn save_head(&self, tenant: &str, type_key: &str, commit_id: CommitId) -> Result<()> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::head_dao(&guard).save_head(type_key, commit_id)
    }

    pub async fn has_changed_since(
        &self,
        tenant: &str,
        type_key: &str,
        commit_id: CommitId,
    ) -> Result<bool> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::head_dao(&guard).has_changed_since(type_key, commit_id)
    }

    /// 租户下全部头指针快照（诊断用）
    pub async fn list_heads(&self, tenant: &str) -> Result<Vec<HeadPointer>> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::head_dao(&guard).list_heads()
    }

    // ============================================================
    // 墓碑日志
    // ============================================================

    pub async fn tombstones_since(
        &self,
        tenant: &str,
        object_type: &str,
        after: CommitId,
        limit: u32,
    ) -> Result<Vec<TombstoneEntry>> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::tombstone_dao(&guard).list_since(object_type, after, limit)
    }

    /// 回收提交号不大于 up_to 的墓碑（上界由调用方决定，
    /// 安全上界见 `SyncCoordinator::safe_tombstone_prune_bound`）
    pub async fn prune_tombstones(
        &self,
        tenant: &str,
        object_type: &str,
        up_to: CommitId,
    ) -> Result<usize> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        let removed = DaoFactory::tombstone_dao(&guard).prune_up_to(object_type, up_to)?;
        if removed > 0 {
            info!(
                "墓碑已回收: tenant={}, type={}, up_to={}, removed={}",
                tenant, object_type, up_to, removed
            );
        }
        Ok(removed)
    }

    // ============================================================
    // 伙伴与集合
    // ============================================================

    pub async fn register_partner(
        &self,
        tenant: &str,
        owner_id: &str,
        remote_partner_id: &str,
    ) -> Result<Partner> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::partner_dao(&guard).register(owner_id, remote_partner_id)
    }

    pub async fn get_partner(&self, tenant: &str, partner_id: &str) -> Result<Option<Partner>> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::partner_dao(&guard).get_by_id(partner_id)
    }

    /// 注销伙伴并级联删除其集合（同一事务）；纯管理操作，不产生墓碑
    pub async fn unregister_partner(&self, tenant: &str, partner_id: &str) -> Result<()> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let mut guard = conn.lock().await;
        let tx = guard.transaction()?;

        if DaoFactory::partner_dao(&tx).get_by_id(partner_id)?.is_none() {
            return Err(EntSyncError::NotFound(format!("伙伴不存在: {}", partner_id)));
        }
        let removed = DaoFactory::collection_dao(&tx).delete_by_partner(partner_id)?;
        DaoFactory::partner_dao(&tx).delete(partner_id)?;
        tx.commit()?;

        info!(
            "伙伴已注销: tenant={}, partner={}, collections_removed={}",
            tenant, partner_id, removed
        );
        Ok(())
    }

    pub async fn get_or_create_collection(
        &self,
        tenant: &str,
        partner_id: &str,
        object_type: &str,
        filters: &FilterSet,
    ) -> Result<CollectionRecord> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::collection_dao(&guard).get_or_create(partner_id, object_type, filters)
    }

    pub async fn get_collection(
        &self,
        tenant: &str,
        collection_id: &str,
    ) -> Result<Option<CollectionRecord>> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::collection_dao(&guard).get_by_id(collection_id)
    }

    pub async fn advance_collection_cursor(
        &self,
        tenant: &str,
        collection_id: &str,
        expected: CommitId,
        new_commit_id: CommitId,
    ) -> Result<()> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::collection_dao(&guard).advance_cursor(collection_id, expected, new_commit_id)
    }

    pub async fn min_collection_cursor(
        &self,
        tenant: &str,
        object_type: &str,
    ) -> Result<Option<CommitId>> {
        let conn = self.sqlite.tenant_connection(tenant).await?;
        let guard = conn.lock().await;
        DaoFactory::collection_dao(&guard).min_cursor_for_type(object_type)
    }
}

#[async_trait]
impl EntityStore for SyncStorage {
    async fn save(
        &self,
        tenant: &str,
        object_type: &str,
        entity_id: &str,
        attributes: serde_json::Value,
    ) -> Result<CommitId> {
        self.save_entity(tenant, object_type, entity_id, attributes).await
    }

    async fn query_changed_since(
        &self,
        tenant: &str,
        object_type: &str,
        filters: &FilterSet,
        after: CommitId,
        limit: u32,
    ) -> Result<Vec<EntityRecord>> {
        self.query_changed_entities(tenant, object_type, filters, after, limit)
            .await
    }

    async fn mark_deleted(
        &self,
        tenant: &str,
        object_type: &str,
        entity_id: &str,
    ) -> Result<CommitId> {
        self.archive_entity(tenant, object_type, entity_id).await
    }
}
