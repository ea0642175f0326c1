//! 实体同步核心 - 导出 / 导入 / 游标
//!
//! 导出读实体存储与墓碑日志、按提交号合并；导入直接走实体存储的
//! save / delete（在那里铸造新提交号）。游标推进永远是调用方在
//! 持久处理完一批之后的显式动作。

pub mod change;
pub mod collection;
pub mod coordinator;
pub mod filters;

pub use change::ChangeRecord;
pub use collection::Collection;
pub use coordinator::{
    apply_import, ImportChange, ImportFailure, ImportOperation, ImportReport, SyncCoordinator,
};
pub use filters::{filters_hash, FilterSet};
