//! 数据访问层 (DAO) - 每张表一个专门的操作模块
//!
//! 这里封装了所有数据库操作，确保：
//! - 数据操作的一致性和封装性
//! - 排序、游标等核心不变量集中在一处
//! - 未来 schema 升级的兼容性

pub mod collection;
pub mod commit_seq;
pub mod entity;
pub mod head;
pub mod partner;
pub mod tombstone;

// 重新导出核心 DAO 类型
pub use collection::CollectionDao;
pub use commit_seq::CommitSeqDao;
pub use entity::EntityDao;
pub use head::HeadDao;
pub use partner::PartnerDao;
pub use tombstone::TombstoneDao;

use rusqlite::Connection;

/// DAO 工厂 - 统一创建各种 DAO 实例
pub struct DaoFactory;

impl DaoFactory {
    pub fn commit_seq_dao(conn: &Connection) -> CommitSeqDao<'_> {
        CommitSeqDao::new(conn)
    }

    pub fn head_dao(conn: &Connection) -> HeadDao<'_> {
        HeadDao::new(conn)
    }

    pub fn tombstone_dao(conn: &Connection) -> TombstoneDao<'_> {
        TombstoneDao::new(conn)
    }

    pub fn partner_dao(conn: &Connection) -> PartnerDao<'_> {
        PartnerDao::new(conn)
    }

    pub fn collection_dao(conn: &Connection) -> CollectionDao<'_> {
        CollectionDao::new(conn)
    }

    pub fn entity_dao(conn: &Connection) -> EntityDao<'_> {
        EntityDao::new(conn)
    }
}
