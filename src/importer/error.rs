// ==========================================
// 批量导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类:
// - 启动错误: 调用 start 时同步返回（格式不符/类型未注册/协作方缺失）
// - 行级错误: 单行失败，记入任务 errors 后继续
// - 致命错误: 任务记录无法加载/保存，worker 不得静默继续
// ==========================================

use crate::repository::error::RepositoryError;
use crate::storage::StagingError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 启动错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: 期望 {expected}，实际 {actual}")]
    UnsupportedFormat { expected: String, actual: String },

    #[error("实体类型未注册: {0}")]
    UnknownEntityType(String),

    #[error("协作方类型缺失: {0}")]
    MissingCollaborator(String),

    #[error("运行参数无效: {0}")]
    InvalidRunParams(String),

    #[error("暂存失败: {0}")]
    Staging(#[from] StagingError),

    // ===== 文件解析错误 =====
    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    // ===== 存储错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 致命错误 =====
    #[error("致命错误 (job_id={job_id}): {message}")]
    Fatal { job_id: String, message: String },

    // ===== Worker 错误 =====
    #[error("worker 启动失败: {0}")]
    WorkerSpawn(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 构造致命错误
    pub fn fatal(job_id: &str, message: impl Into<String>) -> Self {
        ImportError::Fatal {
            job_id: job_id.to_string(),
            message: message.into(),
        }
    }

    /// 是否为致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImportError::Fatal { .. })
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::InvalidRunParams(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
