//! 实体表数据访问层 - 参考实现的实体存储
//!
//! 引擎对实体内容不做解释，只依赖 commit_id 与 is_deleted。
//! 过滤条件用 json_extract 在 attributes 上匹配，
//! 值按文本比较（过滤值本身就是字符串）。

use crate::error::{EntSyncError, Result};
use crate::storage::entities::{CommitId, EntityRecord, FilterSet};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

/// 实体数据访问对象
pub struct EntityDao<'a> {
    conn: &'a Connection,
}

impl<'a> EntityDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 插入或更新实体；已软删除的实体被重新保存时复活
    pub fn upsert(&self, record: &EntityRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO entities (entity_id, object_type, attributes, commit_id, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
             ON CONFLICT(object_type, entity_id) DO UPDATE SET
                 attributes = excluded.attributes,
                 commit_id = excluded.commit_id,
                 is_deleted = 0,
                 updated_at = excluded.updated_at",
            params![
                record.entity_id,
                record.object_type,
                serde_json::to_string(&record.attributes)?,
                record.commit_id,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, object_type: &str, entity_id: &str) -> Result<Option<EntityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, object_type, attributes, commit_id, is_deleted, created_at, updated_at
             FROM entities WHERE object_type = ?1 AND entity_id = ?2",
        )?;
        let mut rows = stmt.query(params![object_type, entity_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_record(row)?)),
            None => Ok(None),
        }
    }

    /// 取 object_type 下 commit_id 大于 after、匹配 filters 的存活实体，
    /// 按提交号升序，上限 limit。
    pub fn list_changed_since(
        &self,
        object_type: &str,
        filters: &FilterSet,
        after: CommitId,
        limit: u32,
    ) -> Result<Vec<EntityRecord>> {
        let mut sql = String::from(
            "SELECT entity_id, object_type, attributes, commit_id, is_deleted, created_at, updated_at
             FROM entities
             WHERE object_type = ?1 AND is_deleted = 0 AND commit_id > ?2",
        );
        let mut values: Vec<Value> = vec![
            Value::Text(object_type.to_string()),
            Value::Integer(after),
        ];
        for (key, value) in filters {
            // 键以绑定参数拼进 json path，键名不进 SQL 文本
            sql.push_str(" AND json_extract(attributes, '$.' || ?) = ?");
            values.push(Value::Text(key.clone()));
            values.push(Value::Text(value.clone()));
        }
        sql.push_str(" ORDER BY commit_id ASC LIMIT ?");
        values.push(Value::Integer(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i32>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (entity_id, object_type, attributes, commit_id, is_deleted, created_at, updated_at) =
                row?;
            records.push(EntityRecord {
                entity_id,
                object_type,
                attributes: serde_json::from_str(&attributes)?,
                commit_id,
                is_deleted,
                created_at,
                updated_at,
            });
        }
        Ok(records)
    }

    /// 软删除：标记 is_deleted 并盖上新提交号；实体不存在返回 NotFound
    pub fn mark_deleted(
        &self,
        object_type: &str,
        entity_id: &str,
        commit_id: CommitId,
        updated_at: i64,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE entities SET is_deleted = 1, commit_id = ?1, updated_at = ?2
             WHERE object_type = ?3 AND entity_id = ?4",
            params![commit_id, updated_at, object_type, entity_id],
        )?;
        if updated == 0 {
            return Err(EntSyncError::NotFound(format!(
                "实体不存在: {}/{}",
                object_type, entity_id
            )));
        }
        Ok(())
    }

    /// 硬清除：直接删行，不留墓碑（与 archive 的有意不对称）
    pub fn purge(&self, object_type: &str, entity_id: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM entities WHERE object_type = ?1 AND entity_id = ?2",
            params![object_type, entity_id],
        )?;
        Ok(removed > 0)
    }

    fn row_to_record(row: &Row<'_>) -> Result<EntityRecord> {
        let attributes: String = row.get(2)?;
        Ok(EntityRecord {
            entity_id: row.get(0)?,
            object_type: row.get(1)?,
            attributes: serde_json::from_str(&attributes)?,
            commit_id: row.get(3)?,
            is_deleted: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}
