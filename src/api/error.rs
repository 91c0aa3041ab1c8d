// ==========================================
// 批量导入引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将导入/仓储错误转换为面向调用方的错误消息
// ==========================================

use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use crate::storage::StagingError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 启动错误（同步返回给调用方）
    // ==========================================
    #[error("文件格式不支持: 期望 {expected}，实际 {actual}")]
    UnsupportedFormat { expected: String, actual: String },

    #[error("实体类型未注册: {0}")]
    UnknownEntityType(String),

    #[error("协作方类型缺失: {0}")]
    MissingCollaborator(String),

    #[error("暂存失败: {0}")]
    StagingError(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::DatabaseError(format!("外键约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::SerializationError(msg) => {
                ApiError::InternalError(format!("序列化失败: {}", msg))
            }

            // 通用错误
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::UnsupportedFormat { expected, actual } => {
                ApiError::UnsupportedFormat { expected, actual }
            }
            ImportError::UnknownEntityType(name) => ApiError::UnknownEntityType(name),
            ImportError::MissingCollaborator(name) => ApiError::MissingCollaborator(name),
            ImportError::Staging(e) => e.into(),
            ImportError::Repository(e) => e.into(),
            ImportError::InvalidRunParams(msg) => ApiError::InvalidInput(msg),
            ImportError::Other(e) => ApiError::Other(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

// ==========================================
// 从 StagingError 转换
// ==========================================
impl From<StagingError> for ApiError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::InvalidName(name) => {
                ApiError::InvalidInput(format!("非法文件名或容器名: {}", name))
            }
            other => ApiError::StagingError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_error_mapping() {
        let err: ApiError = ImportError::UnsupportedFormat {
            expected: "text/csv".to_string(),
            actual: "application/pdf".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::UnsupportedFormat { .. }));

        let err: ApiError = ImportError::Repository(RepositoryError::NotFound {
            entity: "ImportJob".to_string(),
            id: "j1".to_string(),
        })
        .into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = ImportError::fatal("j1", "boom").into();
        assert!(matches!(err, ApiError::ImportError(_)));
    }

    #[test]
    fn test_staging_error_mapping() {
        let err: ApiError = StagingError::InvalidName("../x".to_string()).into();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err: ApiError = StagingError::ContainerExists("c1".to_string()).into();
        assert!(matches!(err, ApiError::StagingError(_)));
    }
}
