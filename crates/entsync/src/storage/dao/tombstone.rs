//! 墓碑日志数据访问层 - 只追加的删除记录
//!
//! 已删除实体不再出现在普通查询里，导出必须靠墓碑把删除事件
//! 暴露给尚未观察到它的消费方。每个逻辑删除事件一条记录。
//!
//! 保留策略：引擎不自动清理（开放问题），调用方通过
//! `prune_up_to` 显式回收已被所有活跃集合越过的墓碑。

use crate::error::Result;
use crate::storage::entities::{CommitId, TombstoneEntry};
use rusqlite::{params, Connection, Row};

/// 墓碑日志数据访问对象
pub struct TombstoneDao<'a> {
    conn: &'a Connection,
}

impl<'a> TombstoneDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 追加一条墓碑
    pub fn append(&self, entry: &TombstoneEntry) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO tombstones (object_type, entity_id, commit_id, deleted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.object_type,
                entry.entity_id,
                entry.commit_id,
                entry.deleted_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 取 object_type 下 commit_id 大于 after 的墓碑，按提交号升序，上限 limit
    pub fn list_since(
        &self,
        object_type: &str,
        after: CommitId,
        limit: u32,
    ) -> Result<Vec<TombstoneEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, object_type, entity_id, commit_id, deleted_at
             FROM tombstones
             WHERE object_type = ?1 AND commit_id > ?2
             ORDER BY commit_id ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![object_type, after, limit], Self::row_to_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// 删除 object_type 下提交号不大于 up_to 的墓碑，返回删除条数
    pub fn prune_up_to(&self, object_type: &str, up_to: CommitId) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM tombstones WHERE object_type = ?1 AND commit_id <= ?2",
            params![object_type, up_to],
        )?;
        Ok(removed)
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<TombstoneEntry> {
        Ok(TombstoneEntry {
            id: Some(row.get(0)?),
            object_type: row.get(1)?,
            entity_id: row.get(2)?,
            commit_id: row.get(3)?,
            deleted_at: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::create_tables;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn entry(object_type: &str, entity_id: &str, commit_id: i64) -> TombstoneEntry {
        TombstoneEntry {
            id: None,
            object_type: object_type.to_string(),
            entity_id: entity_id.to_string(),
            commit_id,
            deleted_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn list_since_is_windowed_and_ordered() {
        let conn = test_conn();
        let dao = TombstoneDao::new(&conn);

        dao.append(&entry("issue", "e3", 7)).unwrap();
        dao.append(&entry("issue", "e1", 3)).unwrap();
        dao.append(&entry("issue", "e2", 5)).unwrap();
        dao.append(&entry("contact", "c1", 4)).unwrap();

        let entries = dao.list_since("issue", 3, 10).unwrap();
        let commit_ids: Vec<i64> = entries.iter().map(|e| e.commit_id).collect();
        assert_eq!(commit_ids, vec![5, 7]);

        // limit 截断
        let entries = dao.list_since("issue", 0, 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].commit_id, 3);
    }

    #[test]
    fn prune_removes_only_passed_window() {
        let conn = test_conn();
        let dao = TombstoneDao::new(&conn);

        dao.append(&entry("issue", "e1", 3)).unwrap();
        dao.append(&entry("issue", "e2", 5)).unwrap();
        dao.append(&entry("contact", "c1", 4)).unwrap();

        let removed = dao.prune_up_to("issue", 4).unwrap();
        assert_eq!(removed, 1);

        let remaining = dao.list_since("issue", 0, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_id, "e2");
        // 其他类型不受影响
        assert_eq!(dao.list_since("contact", 0, 10).unwrap().len(), 1);
    }
}
