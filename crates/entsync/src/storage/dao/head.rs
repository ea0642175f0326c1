//! 头指针数据访问层 - 每个 type_key 观察到的最大提交号
//!
//! 每次变更后写入，使「X 自提交 C 之后是否变过」可以用点查回答，
//! 不需要扫表。相对底层提交序列允许最终一致：头指针偏旧只会让
//! 消费方多做一次空轮询，不会丢数据。

use crate::error::Result;
use crate::storage::entities::{CommitId, HeadPointer};
use rusqlite::{params, Connection};

/// 头指针数据访问对象
pub struct HeadDao<'a> {
    conn: &'a Connection,
}

impl<'a> HeadDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 读取头指针，未记录过返回 0
    pub fn get_head(&self, type_key: &str) -> Result<CommitId> {
        let mut stmt = self
            .conn
            .prepare("SELECT head_commit_id FROM head_pointers WHERE type_key = ?1")?;
        let mut rows = stmt.query(params![type_key])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    /// 幂等 upsert：有则更新，无则插入
    pub fn save_head(&self, type_key: &str, commit_id: CommitId) -> Result<()> {
        self.conn.execute(
            "INSERT INTO head_pointers (type_key, head_commit_id) VALUES (?1, ?2)
             ON CONFLICT(type_key) DO UPDATE SET head_commit_id = excluded.head_commit_id",
            params![type_key, commit_id],
        )?;
        Ok(())
    }

    /// 点查：type_key 在 commit_id 之后是否有过变更
    pub fn has_changed_since(&self, type_key: &str, commit_id: CommitId) -> Result<bool> {
        Ok(self.get_head(type_key)? > commit_id)
    }

    /// 列出全部头指针（诊断用）
    pub fn list_heads(&self) -> Result<Vec<HeadPointer>> {
        let mut stmt = self
            .conn
            .prepare("SELECT type_key, head_commit_id FROM head_pointers ORDER BY type_key")?;
        let rows = stmt.query_map([], |row| {
            Ok(HeadPointer {
                type_key: row.get(0)?,
                head_commit_id: row.get(1)?,
            })
        })?;
        let mut heads = Vec::new();
        for row in rows {
            heads.push(row?);
        }
        Ok(heads)
    }
}
