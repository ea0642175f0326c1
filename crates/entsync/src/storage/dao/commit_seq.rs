//! 提交序列器数据访问层 - 按 type_key 分区的持久计数器
//!
//! 提交号是唯一的排序权威：同一 type_key 下严格递增、永不复用，
//! 即使进程重启。计数器按 object-type key 分区而不是整租户一个，
//! 避免不相关实体类型之间的写竞争。

use crate::error::{EntSyncError, Result};
use crate::storage::entities::CommitId;
use rusqlite::{params, Connection};

/// 提交序列器数据访问对象
pub struct CommitSeqDao<'a> {
    conn: &'a Connection,
}

impl<'a> CommitSeqDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 原子取号：fetch-and-increment，返回新值。
    ///
    /// 计数器行不存在（首次使用）时创建一次并重试递增；
    /// 再失败即致命：没有排序源就不能继续持久化变更。
    pub fn next_commit_id(&self, type_key: &str) -> Result<CommitId> {
        if let Some(id) = self.increment(type_key)? {
            return Ok(id);
        }
        self.create_counter(type_key)?;
        match self.increment(type_key)? {
            Some(id) => Ok(id),
            None => Err(EntSyncError::CommitSequence(format!(
                "提交计数器创建后仍不可用: type_key={}",
                type_key
            ))),
        }
    }

    /// 当前已发出的最大提交号（无计数器时为 0）
    pub fn current(&self, type_key: &str) -> Result<CommitId> {
        let mut stmt = self
            .conn
            .prepare("SELECT next_id FROM commit_seq WHERE type_key = ?1")?;
        let mut rows = stmt.query(params![type_key])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    /// 单条 UPDATE..RETURNING 保证同一连接内不会取到重复值
    fn increment(&self, type_key: &str) -> Result<Option<CommitId>> {
        let mut stmt = self.conn.prepare(
            "UPDATE commit_seq SET next_id = next_id + 1 WHERE type_key = ?1 RETURNING next_id",
        )?;
        let mut rows = stmt.query(params![type_key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn create_counter(&self, type_key: &str) -> Result<()> {
        // 并发首用时两个写者都可能走到这里，OR IGNORE 保证只建一次
        self.conn
            .execute(
                "INSERT OR IGNORE INTO commit_seq (type_key, next_id) VALUES (?1, 0)",
                params![type_key],
            )
            .map_err(|e| {
                EntSyncError::CommitSequence(format!(
                    "创建提交计数器失败: type_key={}, error={}",
                    type_key, e
                ))
            })?;
        Ok(())
    }
}
