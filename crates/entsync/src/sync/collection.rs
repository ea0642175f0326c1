//! 集合句柄 - 导出算法与游标纪律的统一入口
//!
//! ## NOTE: 游标由调用方推进
//!
//! `export_changed` 是纯读操作，本身绝不移动游标。调用方必须在
//! 自己持久处理完一批之后才调用 `advance_cursor`，且只能推进到
//! 实际处理过的最大提交号。这就是 at-least-once 语义的全部来源：
//! 处理途中崩溃后重试会原样重发同一批。
//!
//! 分页靠重复调用：结果被 max_batch 截断时继续调（每次推进游标），
//! 直到返回空。游标从不回退，持续写入下也能收敛。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::storage::entities::{CollectionRecord, CommitId, EntityRecord, FilterSet, TombstoneEntry};
use crate::storage::SyncStorage;
use crate::sync::change::ChangeRecord;

/// 集合句柄 - 绑定存储引用与一条集合记录
///
/// 句柄里的 last_commit_id 是「上次读到的值」，推进游标时作为
/// 乐观检查的期望值带入存储层。
pub struct Collection {
    storage: Arc<SyncStorage>,
    tenant: String,
    record: CollectionRecord,
}

impl Collection {
    pub(crate) fn new(storage: Arc<SyncStorage>, tenant: &str, record: CollectionRecord) -> Self {
        Self {
            storage,
            tenant: tenant.to_string(),
            record,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn partner_id(&self) -> &str {
        &self.record.partner_id
    }

    pub fn object_type(&self) -> &str {
        &self.record.object_type
    }

    pub fn filters(&self) -> &FilterSet {
        &self.record.filters
    }

    pub fn last_commit_id(&self) -> CommitId {
        self.record.last_commit_id
    }

    /// 导出游标之后未见的本地变更（实体变更 + 墓碑合并，升序）
    ///
    /// 两路查询各自以 max_batch 截断，合并排序后再截断到 max_batch：
    /// 任一路被截断时，另一路更靠后的提交号不得混进本批，否则调用方
    /// 按「推进到本批最大提交号」的纪律推进游标会跳过未交付的变更。
    /// 同一实体在窗口内既有变更又有更晚的墓碑时只发墓碑。
    /// 无副作用，原样重调返回同一结果集。
    pub async fn export_changed(&self, max_batch: u32) -> Result<Vec<ChangeRecord>> {
        let cursor = self.record.last_commit_id;
        let entities = self
            .storage
            .query_changed_entities(
                &self.tenant,
                &self.record.object_type,
                &self.record.filters,
                cursor,
                max_batch,
            )
            .await?;
        let tombstones = self
            .storage
            .tombstones_since(&self.tenant, &self.record.object_type, cursor, max_batch)
            .await?;

        let changes = merge_changes(entities, tombstones, max_batch);
        debug!(
            "导出变更: collection={}, cursor={}, changes={}",
            self.record.id,
            cursor,
            changes.len()
        );
        Ok(changes)
    }

    /// 以配置里的默认批大小导出（`SyncConfig::default_export_batch`）
    pub async fn export_changed_default(&self) -> Result<Vec<ChangeRecord>> {
        let max_batch = self.storage.config().default_export_batch;
        self.export_changed(max_batch).await
    }

    /// 推进游标到 new_commit_id（调用方已持久处理到该提交号）
    pub async fn advance_cursor(&mut self, new_commit_id: CommitId) -> Result<()> {
        self.storage
            .advance_collection_cursor(
                &self.tenant,
                &self.record.id,
                self.record.last_commit_id,
                new_commit_id,
            )
            .await?;
        self.record.last_commit_id = new_commit_id;
        Ok(())
    }

    /// 快进到当前头指针，不返回任何变更记录。
    /// 新建集合只想观察未来变更、不回放历史时使用。
    pub async fn fast_forward_to_head(&mut self) -> Result<CommitId> {
        let head = self
            .storage
            .get_head(&self.tenant, &self.record.object_type)
            .await?;
        // 头指针允许偏旧，绝不据此回退游标
        if head > self.record.last_commit_id {
            self.advance_cursor(head).await?;
        }
        Ok(self.record.last_commit_id)
    }

    /// 从存储重新加载集合记录（游标被别处推进后刷新本地快照）
    pub async fn refresh(&mut self) -> Result<()> {
        if let Some(record) = self
            .storage
            .get_collection(&self.tenant, &self.record.id)
            .await?
        {
            self.record = record;
        }
        Ok(())
    }
}

/// 合并实体变更与墓碑：按提交号升序，先截断到 max_batch 再做压制。
///
/// 截断必须在压制之前：两路查询各有自己的覆盖窗口，排序后
/// 前 max_batch 条必然落在两个窗口之内；先压制会让后面的墓碑
/// 顶进本批，其提交号可能超出被截断的实体窗口。
///
/// 压制只用本批内的墓碑：批内同一实体的变更被更晚的墓碑压制
/// （删除压制更早的未见变更；墓碑之后又复活的实体两条都保留，
/// 顺序本身就是正确语义）。被截掉的墓碑留给下一批发 Deleted。
fn merge_changes(
    entities: Vec<EntityRecord>,
    tombstones: Vec<TombstoneEntry>,
    max_batch: u32,
) -> Vec<ChangeRecord> {
    let mut changes: Vec<ChangeRecord> = entities
        .into_iter()
        .map(|entity| ChangeRecord::Changed {
            entity_id: entity.entity_id,
            commit_id: entity.commit_id,
        })
        .collect();
    changes.extend(tombstones.into_iter().map(|tombstone| ChangeRecord::Deleted {
        entity_id: tombstone.entity_id,
        commit_id: tombstone.commit_id,
    }));
    changes.sort_by_key(|change| change.commit_id());
    changes.truncate(max_batch as usize);

    let mut latest_tombstone: HashMap<String, CommitId> = HashMap::new();
    for change in &changes {
        if let ChangeRecord::Deleted { entity_id, commit_id } = change {
            let slot = latest_tombstone
                .entry(entity_id.clone())
                .or_insert(*commit_id);
            if *commit_id > *slot {
                *slot = *commit_id;
            }
        }
    }
    changes.retain(|change| match change {
        ChangeRecord::Deleted { .. } => true,
        ChangeRecord::Changed { entity_id, commit_id } => {
            match latest_tombstone.get(entity_id) {
                Some(&tombstone_commit) => *commit_id > tombstone_commit,
                None => true,
            }
        }
    });
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::sync::coordinator::SyncCoordinator;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<SyncStorage>, SyncCoordinator) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::builder().base_path(dir.path()).build();
        let storage = Arc::new(SyncStorage::new(config).await.unwrap());
        let coordinator = SyncCoordinator::new(storage.clone());
        (dir, storage, coordinator)
    }

    async fn watch_all(coordinator: &SyncCoordinator, object_type: &str) -> Collection {
        let partner = coordinator
            .register_partner("t1", "owner", "device-1")
            .await
            .unwrap();
        coordinator
            .watch("t1", &partner, object_type, FilterSet::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn scenario_a_fresh_collection_sees_change_once() {
        let (_dir, storage, coordinator) = setup().await;
        let mut collection = watch_all(&coordinator, "issue").await;

        let commit_id = storage
            .save_entity("t1", "issue", "E1", json!({"title": "hello"}))
            .await
            .unwrap();

        let changes = collection.export_changed(10).await.unwrap();
        assert_eq!(
            changes,
            vec![ChangeRecord::Changed {
                entity_id: "E1".to_string(),
                commit_id,
            }]
        );

        collection.advance_cursor(commit_id).await.unwrap();
        assert!(collection.export_changed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scenario_b_create_then_delete_yields_only_deletion() {
        let (_dir, storage, coordinator) = setup().await;
        let collection = watch_all(&coordinator, "issue").await;

        storage.save_entity("t1", "issue", "E2", json!({})).await.unwrap();
        let delete_commit = storage.archive_entity("t1", "issue", "E2").await.unwrap();

        let changes = collection.export_changed(10).await.unwrap();
        assert_eq!(
            changes,
            vec![ChangeRecord::Deleted {
                entity_id: "E2".to_string(),
                commit_id: delete_commit,
            }]
        );
    }

    #[tokio::test]
    async fn scenario_d_pagination_converges_in_three_calls() {
        let (_dir, storage, coordinator) = setup().await;
        let mut collection = watch_all(&coordinator, "issue").await;

        for i in 0..5 {
            storage
                .save_entity("t1", "issue", &format!("e{}", i), json!({"n": i}))
                .await
                .unwrap();
        }

        let mut sizes = Vec::new();
        let mut last_cursor = collection.last_commit_id();
        loop {
            let batch = collection.export_changed(2).await.unwrap();
            if batch.is_empty() {
                break;
            }
            sizes.push(batch.len());
            let high = batch.last().unwrap().commit_id();
            collection.advance_cursor(high).await.unwrap();
            assert!(collection.last_commit_id() > last_cursor, "游标每次严格推进");
            last_cursor = collection.last_commit_id();
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn export_without_advancing_is_idempotent() {
        let (_dir, storage, coordinator) = setup().await;
        let collection = watch_all(&coordinator, "issue").await;

        storage.save_entity("t1", "issue", "e1", json!({})).await.unwrap();
        storage.save_entity("t1", "issue", "e2", json!({})).await.unwrap();

        let first = collection.export_changed(10).await.unwrap();
        let second = collection.export_changed(10).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn fast_forward_skips_backlog() {
        let (_dir, storage, coordinator) = setup().await;
        let mut collection = watch_all(&coordinator, "issue").await;

        storage.save_entity("t1", "issue", "old1", json!({})).await.unwrap();
        storage.save_entity("t1", "issue", "old2", json!({})).await.unwrap();

        collection.fast_forward_to_head().await.unwrap();
        assert!(collection.export_changed(10).await.unwrap().is_empty());

        // 之后的新变更照常可见
        let commit_id = storage.save_entity("t1", "issue", "new1", json!({})).await.unwrap();
        let changes = collection.export_changed(10).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].commit_id(), commit_id);
    }

    #[tokio::test]
    async fn export_results_are_ordered_by_commit_id() {
        let (_dir, storage, coordinator) = setup().await;
        let collection = watch_all(&coordinator, "issue").await;

        storage.save_entity("t1", "issue", "a", json!({})).await.unwrap();
        storage.save_entity("t1", "issue", "b", json!({})).await.unwrap();
        storage.archive_entity("t1", "issue", "a").await.unwrap();
        storage.save_entity("t1", "issue", "c", json!({})).await.unwrap();

        let changes = collection.export_changed(10).await.unwrap();
        let commit_ids: Vec<i64> = changes.iter().map(|c| c.commit_id()).collect();
        let mut sorted = commit_ids.clone();
        sorted.sort();
        assert_eq!(commit_ids, sorted);
        // a 的早期变更被墓碑压制
        assert!(changes
            .iter()
            .all(|c| c.entity_id() != "a" || c.is_deleted()));
    }

    #[test]
    fn merge_keeps_revival_after_tombstone() {
        // 删除(commit 2) 之后又复活(commit 3)：两条都保留，按序输出
        let entities = vec![EntityRecord {
            entity_id: "e1".to_string(),
            object_type: "issue".to_string(),
            attributes: json!({}),
            commit_id: 3,
            is_deleted: 0,
            created_at: 0,
            updated_at: 0,
        }];
        let tombstones = vec![TombstoneEntry {
            id: None,
            object_type: "issue".to_string(),
            entity_id: "e1".to_string(),
            commit_id: 2,
            deleted_at: 0,
        }];
        let merged = merge_changes(entities, tombstones, 10);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].is_deleted());
        assert!(!merged[1].is_deleted());
    }

    #[test]
    fn merge_never_emits_past_a_truncated_entity_page() {
        // 实体页被截断在 commit 3，窗口更远处有一条 commit 4 的墓碑：
        // 本批不得混进 commit 4，否则调用方按批尾推进会跳过 commit 3
        let entities = vec![
            EntityRecord {
                entity_id: "e1".to_string(),
                object_type: "issue".to_string(),
                attributes: json!({}),
                commit_id: 1,
                is_deleted: 0,
                created_at: 0,
                updated_at: 0,
            },
            EntityRecord {
                entity_id: "e2".to_string(),
                object_type: "issue".to_string(),
                attributes: json!({}),
                commit_id: 2,
                is_deleted: 0,
                created_at: 0,
                updated_at: 0,
            },
        ];
        let tombstones = vec![TombstoneEntry {
            id: None,
            object_type: "issue".to_string(),
            entity_id: "e9".to_string(),
            commit_id: 4,
            deleted_at: 0,
        }];
        let merged = merge_changes(entities, tombstones, 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.last().unwrap().commit_id(), 2);
    }

    #[test]
    fn merge_suppression_only_uses_in_batch_tombstones() {
        // 墓碑(commit 4)被截断在批外时不压制批内的变更，
        // 该实体这一批先发 Changed，下一批再发 Deleted
        let entities = vec![
            EntityRecord {
                entity_id: "e1".to_string(),
                object_type: "issue".to_string(),
                attributes: json!({}),
                commit_id: 1,
                is_deleted: 0,
                created_at: 0,
                updated_at: 0,
            },
        ];
        let tombstones = vec![TombstoneEntry {
            id: None,
            object_type: "issue".to_string(),
            entity_id: "e1".to_string(),
            commit_id: 4,
            deleted_at: 0,
        }];
        // 批内同时装得下：压制生效，只发墓碑
        let merged = merge_changes(entities.clone(), tombstones.clone(), 10);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_deleted());
        // 墓碑被截掉：变更照发，批不为空
        let merged = merge_changes(entities, tombstones, 1);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_deleted());
        assert_eq!(merged[0].commit_id(), 1);
    }

    #[tokio::test]
    async fn truncated_pagination_delivers_every_change() {
        let (_dir, storage, coordinator) = setup().await;
        let mut collection = watch_all(&coordinator, "issue").await;

        // 提交 1..3 为存活变更，提交 4 保存 e4，提交 5 为 e4 的墓碑
        for i in 1..=3 {
            storage
                .save_entity("t1", "issue", &format!("e{}", i), json!({"n": i}))
                .await
                .unwrap();
        }
        storage.save_entity("t1", "issue", "e4", json!({})).await.unwrap();
        storage.archive_entity("t1", "issue", "e4").await.unwrap();

        let mut delivered: Vec<ChangeRecord> = Vec::new();
        loop {
            let batch = collection.export_changed(2).await.unwrap();
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= 2, "单批不得超过 max_batch");
            let high = batch.last().unwrap().commit_id();
            delivered.extend(batch);
            collection.advance_cursor(high).await.unwrap();
        }

        let mut entity_ids: Vec<&str> =
            delivered.iter().map(|c| c.entity_id()).collect();
        entity_ids.sort();
        assert_eq!(entity_ids, vec!["e1", "e2", "e3", "e4"]);
        assert!(delivered
            .iter()
            .all(|c| c.entity_id() != "e4" || c.is_deleted()));
        let commit_ids: Vec<i64> = delivered.iter().map(|c| c.commit_id()).collect();
        let mut sorted = commit_ids.clone();
        sorted.sort();
        assert_eq!(commit_ids, sorted);
    }

    #[tokio::test]
    async fn default_batch_comes_from_config() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::builder()
            .base_path(dir.path())
            .default_export_batch(2)
            .build();
        let storage = Arc::new(SyncStorage::new(config).await.unwrap());
        let coordinator = SyncCoordinator::new(storage.clone());
        let collection = watch_all(&coordinator, "issue").await;

        for i in 0..5 {
            storage
                .save_entity("t1", "issue", &format!("e{}", i), json!({}))
                .await
                .unwrap();
        }

        let batch = collection.export_changed_default().await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn refresh_picks_up_cursor_advanced_elsewhere() {
        let (_dir, storage, coordinator) = setup().await;
        let mut collection = watch_all(&coordinator, "issue").await;

        let commit_id = storage.save_entity("t1", "issue", "e1", json!({})).await.unwrap();
        storage
            .advance_collection_cursor("t1", collection.id(), 0, commit_id)
            .await
            .unwrap();

        assert_eq!(collection.last_commit_id(), 0);
        collection.refresh().await.unwrap();
        assert_eq!(collection.last_commit_id(), commit_id);
        assert!(collection.export_changed(10).await.unwrap().is_empty());
    }
}
