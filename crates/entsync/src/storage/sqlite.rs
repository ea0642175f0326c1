//! SQLite 存储模块 - 每租户一个独立数据库
//!
//! 本模块提供：
//! - 租户隔离的数据库文件（tenants/{tenant}/sync.db）
//! - WAL 模式与缓存优化
//! - 建表（提交序列、头指针、伙伴、集合、墓碑、实体）

use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::{EntSyncError, Result};

/// SQLite 存储组件
#[derive(Debug)]
pub struct SqliteStore {
    base_path: PathBuf,
    sqlite_cache_kib: i64,
    /// 租户数据库连接池
    tenant_connections: Arc<RwLock<HashMap<String, Arc<Mutex<Connection>>>>>,
}

impl SqliteStore {
    pub fn new(base_path: &Path, sqlite_cache_kib: i64) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            sqlite_cache_kib,
            tenant_connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 初始化租户数据库（不存在则建库建表），并放入连接池
    pub async fn init_tenant_database(&self, tenant: &str) -> Result<()> {
        if tenant.is_empty() {
            return Err(EntSyncError::InvalidInput("tenant 不能为空".to_string()));
        }
        let tenant_dir = self.base_path.join("tenants").join(tenant);
        tokio::fs::create_dir_all(&tenant_dir)
            .await
            .map_err(|e| EntSyncError::IO(format!("创建租户数据库目录失败: {}", e)))?;

        let db_path = tenant_dir.join("sync.db");
        let conn = Connection::open(&db_path)
            .map_err(|e| EntSyncError::Database(format!("打开数据库失败: {}", e)))?;

        // 启用 WAL 模式和其他优化
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| EntSyncError::Database(format!("设置 WAL 模式失败: {}", e)))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| EntSyncError::Database(format!("设置同步模式失败: {}", e)))?;
        conn.pragma_update(None, "cache_size", format!("-{}", self.sqlite_cache_kib))
            .map_err(|e| EntSyncError::Database(format!("设置缓存大小失败: {}", e)))?;

        create_tables(&conn)?;

        let mut connections = self.tenant_connections.write().await;
        connections.insert(tenant.to_string(), Arc::new(Mutex::new(conn)));

        tracing::info!("租户数据库初始化完成: {}", tenant);
        Ok(())
    }

    /// 获取租户连接（未初始化则先初始化）
    pub async fn tenant_connection(&self, tenant: &str) -> Result<Arc<Mutex<Connection>>> {
        {
            let connections = self.tenant_connections.read().await;
            if let Some(conn) = connections.get(tenant) {
                return Ok(conn.clone());
            }
        }
        self.init_tenant_database(tenant).await?;
        let connections = self.tenant_connections.read().await;
        connections
            .get(tenant)
            .cloned()
            .ok_or_else(|| EntSyncError::Database(format!("租户连接丢失: {}", tenant)))
    }

    /// 从连接池移除租户连接（数据文件保留）
    pub async fn close_tenant(&self, tenant: &str) {
        let mut connections = self.tenant_connections.write().await;
        connections.remove(tenant);
    }
}

/// 创建引擎全部数据表（幂等）
pub(crate) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS commit_seq (
            type_key TEXT PRIMARY KEY,
            next_id INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS head_pointers (
            type_key TEXT PRIMARY KEY,
            head_commit_id INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS partners (
            id TEXT PRIMARY KEY,
            remote_partner_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (remote_partner_id, owner_id)
        );

        CREATE TABLE IF NOT EXISTS collections (
            id TEXT PRIMARY KEY,
            partner_id TEXT NOT NULL,
            object_type TEXT NOT NULL,
            filters TEXT NOT NULL DEFAULT '{}',
            filters_hash TEXT NOT NULL,
            last_commit_id INTEGER NOT NULL DEFAULT 0,
            UNIQUE (partner_id, object_type, filters_hash)
        );

        CREATE TABLE IF NOT EXISTS tombstones (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            commit_id INTEGER NOT NULL,
            deleted_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tombstones_type_commit
            ON tombstones (object_type, commit_id);

        CREATE TABLE IF NOT EXISTS entities (
            entity_id TEXT NOT NULL,
            object_type TEXT NOT NULL,
            attributes TEXT NOT NULL DEFAULT '{}',
            commit_id INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (object_type, entity_id)
        );
        CREATE INDEX IF NOT EXISTS idx_entities_type_commit
            ON entities (object_type, commit_id);",
    )
    .map_err(|e| EntSyncError::Database(format!("创建数据表失败: {}", e)))?;
    Ok(())
}
