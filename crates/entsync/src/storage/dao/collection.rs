//! 集合数据访问层 - 每 (partner, object_type, filters) 一个持久游标
//!
//! filters_hash 由规范化过滤串决定（见 `sync::filters`），两个语义
//! 相同的过滤集合解析到同一条集合记录而不是重复建档。
//! last_commit_id 初始为 0，表示「历史起点」。

use crate::error::{EntSyncError, Result};
use crate::storage::entities::{CollectionRecord, CommitId, FilterSet};
use crate::sync::filters::filters_hash;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// 集合数据访问对象
pub struct CollectionDao<'a> {
    conn: &'a Connection,
}

impl<'a> CollectionDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 查到既有集合就返回，否则以 last_commit_id = 0 新建
    pub fn get_or_create(
        &self,
        partner_id: &str,
        object_type: &str,
        filters: &FilterSet,
    ) -> Result<CollectionRecord> {
        let hash = filters_hash(filters);
        if let Some(existing) = self.get_by_hash(partner_id, object_type, &hash)? {
            return Ok(existing);
        }
        let record = CollectionRecord {
            id: Uuid::new_v4().to_string(),
            partner_id: partner_id.to_string(),
            object_type: object_type.to_string(),
            filters: filters.clone(),
            filters_hash: hash,
            last_commit_id: 0,
        };
        self.conn.execute(
            "INSERT INTO collections (id, partner_id, object_type, filters, filters_hash, last_commit_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.partner_id,
                record.object_type,
                serde_json::to_string(&record.filters)?,
                record.filters_hash,
                record.last_commit_id,
            ],
        )?;
        Ok(record)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<CollectionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, partner_id, object_type, filters, filters_hash, last_commit_id
             FROM collections WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_record(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_hash(
        &self,
        partner_id: &str,
        object_type: &str,
        hash: &str,
    ) -> Result<Option<CollectionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, partner_id, object_type, filters, filters_hash, last_commit_id
             FROM collections
             WHERE partner_id = ?1 AND object_type = ?2 AND filters_hash = ?3",
        )?;
        let mut rows = stmt.query(params![partner_id, object_type, hash])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_record(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_by_partner(&self, partner_id: &str) -> Result<Vec<CollectionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, partner_id, object_type, filters, filters_hash, last_commit_id
             FROM collections WHERE partner_id = ?1",
        )?;
        let rows = stmt.query_map(params![partner_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (id, partner_id, object_type, filters_json, hash, cursor) = row?;
            records.push(CollectionRecord {
                id,
                partner_id,
                object_type,
                filters: serde_json::from_str(&filters_json)?,
                filters_hash: hash,
                last_commit_id: cursor,
            });
        }
        Ok(records)
    }

    /// 级联删除一个伙伴的全部集合，返回删除条数
    pub fn delete_by_partner(&self, partner_id: &str) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM collections WHERE partner_id = ?1",
            params![partner_id],
        )?;
        Ok(removed)
    }

    /// 乐观推进游标：WHERE 带上调用方读到的旧值，
    /// 两个并发处理方竞跑同一集合时只有一个能赢。
    pub fn advance_cursor(
        &self,
        id: &str,
        expected: CommitId,
        new_commit_id: CommitId,
    ) -> Result<()> {
        if new_commit_id < expected {
            return Err(EntSyncError::InvalidInput(format!(
                "游标不允许回退: collection={}, {} -> {}",
                id, expected, new_commit_id
            )));
        }
        let updated = self.conn.execute(
            "UPDATE collections SET last_commit_id = ?1
             WHERE id = ?2 AND last_commit_id = ?3",
            params![new_commit_id, id, expected],
        )?;
        if updated == 0 {
            // 区分「集合不存在」与「乐观检查失败」
            return match self.get_by_id(id)? {
                None => Err(EntSyncError::NotFound(format!("集合不存在: {}", id))),
                Some(current) => Err(EntSyncError::CursorConflict(format!(
                    "collection={}, expected={}, actual={}",
                    id, expected, current.last_commit_id
                ))),
            };
        }
        Ok(())
    }

    /// object_type 下所有活跃集合的最小游标（墓碑安全回收上界）
    pub fn min_cursor_for_type(&self, object_type: &str) -> Result<Option<CommitId>> {
        let min: Option<i64> = self.conn.query_row(
            "SELECT MIN(last_commit_id) FROM collections WHERE object_type = ?1",
            params![object_type],
            |row| row.get(0),
        )?;
        Ok(min)
    }

    fn row_to_record(row: &Row<'_>) -> Result<CollectionRecord> {
        let filters_json: String = row.get(3)?;
        Ok(CollectionRecord {
            id: row.get(0)?,
            partner_id: row.get(1)?,
            object_type: row.get(2)?,
            filters: serde_json::from_str(&filters_json)?,
            filters_hash: row.get(4)?,
            last_commit_id: row.get(5)?,
        })
    }
}
