//! 数据实体定义 - 对应数据库表结构
//!
//! 这里定义了所有数据库表对应的 Rust 结构体，用于：
//! - 类型安全的数据传输
//! - 统一的数据表示
//! - 序列化/反序列化支持

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 提交号 - 租户内单调递增的 64 位整数，唯一的排序依据。
/// 墙上时钟只作展示用途，绝不参与变更排序或比较。
pub type CommitId = i64;

/// 过滤条件集合（key -> value）。BTreeMap 保证键有序，
/// 规范化哈希见 `sync::filters`。
pub type FilterSet = BTreeMap<String, String>;

/// 实体记录 - 对应 entities 表（参考实现的实体存储）
///
/// 引擎本身只读取 commit_id 与 is_deleted（存在性），
/// attributes 内容对引擎不透明。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: String,
    pub object_type: String,
    /// 实体字段内容（JSON object），引擎不解释
    pub attributes: serde_json::Value,
    /// 最近一次变更的提交号
    pub commit_id: CommitId,
    pub is_deleted: i32,
    pub created_at: i64, // 毫秒时间戳，仅展示用
    pub updated_at: i64, // 毫秒时间戳，仅展示用
}

/// 伙伴实体 - 对应 partners 表
///
/// 外部消费方（移动设备、下游集成等）的持久注册记录，
/// remote_partner_id 在 (租户, owner) 内唯一。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: String,
    pub remote_partner_id: String,
    pub owner_id: String,
    pub created_at: i64,
}

/// 集合实体 - 对应 collections 表
///
/// 每个 (partner, object_type, filters) 三元组一条，
/// last_commit_id 即该伙伴已消费到的持久游标。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: String,
    pub partner_id: String,
    pub object_type: String,
    pub filters: FilterSet,
    /// 规范化过滤串（排序后的 key=value 拼接），用于去重
    pub filters_hash: String,
    /// 已消费到的提交号，0 表示「历史起点」
    pub last_commit_id: CommitId,
}

/// 删除墓碑 - 对应 tombstones 表
///
/// 已删除实体查询不到，必须靠墓碑把删除事件暴露给
/// 尚未观察到它的消费方。仅软删除（archive）产生墓碑，
/// 硬清除（purge）不留任何痕迹，这是有意的不对称。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TombstoneEntry {
    pub id: Option<i64>, // 本地主键（SQLite 自增）
    pub object_type: String,
    pub entity_id: String,
    pub commit_id: CommitId,
    pub deleted_at: i64,
}

/// 头指针 - 对应 head_pointers 表
///
/// 每个 type_key 观察到的最大提交号，
/// 用点查回答「X 自提交 C 之后是否变过」。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadPointer {
    pub type_key: String,
    pub head_commit_id: CommitId,
}
