//! 同步协调器 - 伙伴/集合生命周期与导入应用
//!
//! 协调器负责注册与查找，导出委托给 [`Collection`]。导入路径直接
//! 走实体存储的 save / mark_deleted（提交号在那里铸造），不做冲突
//! 解决，底层存储的 last-writer-wins 语义照常生效。
//!
//! ## NOTE: 协调器不做重试
//!
//! 重试 / 退避 / 调度策略全部属于外部驱动方（周期同步 worker 或
//! 伙伴的在线请求）。导入的单条失败会被如实上报，由调用方决定
//! 重试还是跳过；引擎绝不代为越过失败记录。

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{EntSyncError, Result};
use crate::storage::entities::{CommitId, FilterSet, Partner};
use crate::storage::{EntityStore, SyncStorage};
use crate::sync::collection::Collection;

/// 伙伴侧产生的一条待导入变更
#[derive(Debug, Clone)]
pub struct ImportChange {
    pub object_type: String,
    pub entity_id: String,
    pub operation: ImportOperation,
}

/// 导入操作类型
#[derive(Debug, Clone)]
pub enum ImportOperation {
    /// 覆盖保存（attributes 必须是 JSON object）
    Upsert(serde_json::Value),
    /// 软删除
    Delete,
}

/// 导入结果：成功条数 + 逐条失败明细
///
/// 一批中有失败时绝不视为整批已应用；失败记录报回调用方，
/// 静默越过失败记录会丢数据，明确禁止。
#[derive(Debug, Default)]
pub struct ImportReport {
    pub applied: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn is_fully_applied(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 单条导入失败明细
#[derive(Debug)]
pub struct ImportFailure {
    pub object_type: String,
    pub entity_id: String,
    pub reason: String,
}

/// 把一批伙伴变更逐条应用到实体存储，收集失败而不中断
pub async fn apply_import<S: EntityStore + ?Sized>(
    store: &S,
    tenant: &str,
    changes: &[ImportChange],
) -> ImportReport {
    let mut report = ImportReport::default();
    for change in changes {
        let outcome = match &change.operation {
            ImportOperation::Upsert(attributes) => store
                .save(tenant, &change.object_type, &change.entity_id, attributes.clone())
                .await
                .map(|_| ()),
            ImportOperation::Delete => store
                .mark_deleted(tenant, &change.object_type, &change.entity_id)
                .await
                .map(|_| ()),
        };
        match outcome {
            Ok(()) => report.applied += 1,
            Err(e) => {
                warn!(
                    "导入单条失败: tenant={}, type={}, id={}, error={}",
                    tenant, change.object_type, change.entity_id, e
                );
                report.failures.push(ImportFailure {
                    object_type: change.object_type.clone(),
                    entity_id: change.entity_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

/// 同步协调器
pub struct SyncCoordinator {
    storage: Arc<SyncStorage>,
}

impl SyncCoordinator {
    /// 显式注入存储引用（不走全局服务注册表）
    pub fn new(storage: Arc<SyncStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<SyncStorage> {
        &self.storage
    }

    /// 按 remote id 幂等注册伙伴
    pub async fn register_partner(
        &self,
        tenant: &str,
        owner_id: &str,
        remote_partner_id: &str,
    ) -> Result<Partner> {
        let partner = self
            .storage
            .register_partner(tenant, owner_id, remote_partner_id)
            .await?;
        info!(
            "伙伴已注册: tenant={}, owner={}, remote={}, id={}",
            tenant, owner_id, remote_partner_id, partner.id
        );
        Ok(partner)
    }

    /// 开始观察 (object_type, filters)：返回既有集合或新建（游标 = 0）
    pub async fn watch(
        &self,
        tenant: &str,
        partner: &Partner,
        object_type: &str,
        filters: FilterSet,
    ) -> Result<Collection> {
        let record = self
            .storage
            .get_or_create_collection(tenant, &partner.id, object_type, &filters)
            .await?;
        Ok(Collection::new(self.storage.clone(), tenant, record))
    }

    /// 按 id 取回集合句柄；不存在报 NotFound，不改动任何状态
    pub async fn collection(&self, tenant: &str, collection_id: &str) -> Result<Collection> {
        match self.storage.get_collection(tenant, collection_id).await? {
            Some(record) => Ok(Collection::new(self.storage.clone(), tenant, record)),
            None => Err(EntSyncError::NotFound(format!(
                "集合不存在: {}",
                collection_id
            ))),
        }
    }

    /// 注销伙伴，级联删除其全部集合；纯管理操作，不写墓碑
    pub async fn unregister_partner(&self, tenant: &str, partner: &Partner) -> Result<()> {
        self.storage.unregister_partner(tenant, &partner.id).await
    }

    /// 应用一批伙伴侧变更；伙伴未知时整批拒绝、不动任何状态
    pub async fn import_changes(
        &self,
        tenant: &str,
        partner: &Partner,
        changes: &[ImportChange],
    ) -> Result<ImportReport> {
        if self.storage.get_partner(tenant, &partner.id).await?.is_none() {
            return Err(EntSyncError::NotFound(format!("伙伴不存在: {}", partner.id)));
        }
        let report = apply_import(self.storage.as_ref(), tenant, changes).await;
        info!(
            "导入完成: tenant={}, partner={}, applied={}, failed={}",
            tenant,
            partner.id,
            report.applied,
            report.failures.len()
        );
        Ok(report)
    }

    /// 墓碑安全回收上界：object_type 下所有活跃集合游标的最小值。
    /// 没有任何集合观察该类型时返回 None（此时回收与否由调用方定夺）。
    pub async fn safe_tombstone_prune_bound(
        &self,
        tenant: &str,
        object_type: &str,
    ) -> Result<Option<CommitId>> {
        self.storage.min_collection_cursor(tenant, object_type).await
    }
}
