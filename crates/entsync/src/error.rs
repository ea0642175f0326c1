use std::fmt;
use rusqlite;

#[derive(Debug)]
pub enum EntSyncError {
    SqliteError(rusqlite::Error),
    JsonError(String),
    IO(String),
    Database(String),
    NotFound(String),
    InvalidInput(String),
    // 提交序列器错误：无法安全排序后续变更，属致命错误
    CommitSequence(String),
    // 游标推进失败：乐观检查不通过（并发写同一 collection）
    CursorConflict(String),
}

impl fmt::Display for EntSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntSyncError::SqliteError(e) => write!(f, "SQLite error: {}", e),
            EntSyncError::JsonError(e) => write!(f, "JSON error: {}", e),
            EntSyncError::IO(e) => write!(f, "IO error: {}", e),
            EntSyncError::Database(e) => write!(f, "Database error: {}", e),
            EntSyncError::NotFound(e) => write!(f, "Not found: {}", e),
            EntSyncError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            EntSyncError::CommitSequence(e) => write!(f, "Commit sequence error: {}", e),
            EntSyncError::CursorConflict(e) => write!(f, "Cursor conflict: {}", e),
        }
    }
}

impl std::error::Error for EntSyncError {}

impl From<rusqlite::Error> for EntSyncError {
    fn from(error: rusqlite::Error) -> Self {
        EntSyncError::SqliteError(error)
    }
}

impl From<serde_json::Error> for EntSyncError {
    fn from(error: serde_json::Error) -> Self {
        EntSyncError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for EntSyncError {
    fn from(error: std::io::Error) -> Self {
        EntSyncError::IO(error.to_string())
    }
}

impl EntSyncError {
    /// 判断该错误是否可以安全重试（导出等只读操作总是可以）
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EntSyncError::CommitSequence(_) | EntSyncError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, EntSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(EntSyncError::CursorConflict("c1".to_string()).is_retryable());
        assert!(EntSyncError::NotFound("p1".to_string()).is_retryable());
        assert!(!EntSyncError::CommitSequence("issue".to_string()).is_retryable());
        assert!(!EntSyncError::InvalidInput("attributes".to_string()).is_retryable());
    }
}
