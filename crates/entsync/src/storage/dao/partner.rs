//! 伙伴注册表数据访问层 - 外部消费方的持久记录
//!
//! 伙伴按 (remote_partner_id, owner_id) 在租户内唯一，
//! 注册幂等：已存在直接返回，不重复建档。

use crate::error::{EntSyncError, Result};
use crate::storage::entities::Partner;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// 伙伴数据访问对象
pub struct PartnerDao<'a> {
    conn: &'a Connection,
}

impl<'a> PartnerDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 幂等注册：存在则返回现有记录，否则插入新记录
    pub fn register(&self, owner_id: &str, remote_partner_id: &str) -> Result<Partner> {
        if let Some(existing) = self.get_by_remote(owner_id, remote_partner_id)? {
            return Ok(existing);
        }
        let partner = Partner {
            id: Uuid::new_v4().to_string(),
            remote_partner_id: remote_partner_id.to_string(),
            owner_id: owner_id.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.conn.execute(
            "INSERT INTO partners (id, remote_partner_id, owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                partner.id,
                partner.remote_partner_id,
                partner.owner_id,
                partner.created_at,
            ],
        )?;
        Ok(partner)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Partner>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, remote_partner_id, owner_id, created_at FROM partners WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_partner(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_remote(
        &self,
        owner_id: &str,
        remote_partner_id: &str,
    ) -> Result<Option<Partner>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, remote_partner_id, owner_id, created_at
             FROM partners WHERE owner_id = ?1 AND remote_partner_id = ?2",
        )?;
        let mut rows = stmt.query(params![owner_id, remote_partner_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_partner(row)?)),
            None => Ok(None),
        }
    }

    /// 删除伙伴记录（集合级联由上层在同一事务内完成）
    pub fn delete(&self, id: &str) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM partners WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(EntSyncError::NotFound(format!("伙伴不存在: {}", id)));
        }
        Ok(())
    }

    fn row_to_partner(row: &Row<'_>) -> rusqlite::Result<Partner> {
        Ok(Partner {
            id: row.get(0)?,
            remote_partner_id: row.get(1)?,
            owner_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
