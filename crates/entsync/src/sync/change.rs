//! 变更记录 - 导出结果的受控枚举
//!
//! 以显式的 tagged variant 表达「变更 / 删除」，让 4.3 的合并
//! 优先级规则成为编译期可检查的穷尽匹配，而不是字符串键约定。

use crate::storage::entities::CommitId;
use serde::{Deserialize, Serialize};

/// 一条待同步的变更（导出返回，瞬态，不落盘）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeRecord {
    /// 实体被创建或修改
    Changed { entity_id: String, commit_id: CommitId },
    /// 实体被删除（来自墓碑日志）
    Deleted { entity_id: String, commit_id: CommitId },
}

impl ChangeRecord {
    pub fn commit_id(&self) -> CommitId {
        match self {
            Self::Changed { commit_id, .. } | Self::Deleted { commit_id, .. } => *commit_id,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Self::Changed { entity_id, .. } | Self::Deleted { entity_id, .. } => entity_id,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}
