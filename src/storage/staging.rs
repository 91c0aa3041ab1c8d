// ==========================================
// 批量导入引擎 - 上传暂存
// ==========================================
// 职责: 每次导入一个命名容器，接收单个上传文件
// 实现: 本地文件系统（<root>/<container>/<file_name>）
// ==========================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 暂存错误类型
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("非法名称: {0}")]
    InvalidName(String),

    #[error("容器已存在: {0}")]
    ContainerExists(String),

    #[error("容器不存在: {0}")]
    ContainerNotFound(String),

    #[error("文件写入失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 上传请求中的文件
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,    // 上传文件名
    pub content_type: String, // 声明的内容类型
    pub bytes: Vec<u8>,       // 文件内容
}

// ==========================================
// StagedFile - 已暂存文件坐标
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    pub root: String,         // 存储根目录
    pub container: String,    // 容器名
    pub file_name: String,    // 文件名
    pub content_type: String, // 声明的内容类型
    pub size: u64,            // 字节数
}

impl StagedFile {
    /// 文件在本地存储中的完整路径
    pub fn path(&self) -> PathBuf {
        staged_path(&self.root, &self.container, &self.file_name)
    }
}

/// 由存储坐标推导文件路径
pub fn staged_path(root: &str, container: &str, file_name: &str) -> PathBuf {
    Path::new(root).join(container).join(file_name)
}

// ==========================================
// StagingStorage Trait
// ==========================================
// 实现者: LocalStagingStorage
#[async_trait]
pub trait StagingStorage: Send + Sync {
    /// 存储根目录（随运行参数下发给 worker）
    fn root(&self) -> &str;

    /// 创建命名容器
    async fn create_container(&self, container: &str) -> Result<(), StagingError>;

    /// 上传单个文件到容器
    async fn upload(&self, container: &str, file: UploadFile) -> Result<StagedFile, StagingError>;

    /// 删除容器及其中文件
    async fn destroy_container(&self, container: &str) -> Result<(), StagingError>;
}

// ==========================================
// LocalStagingStorage
// ==========================================
pub struct LocalStagingStorage {
    root: String,
}

impl LocalStagingStorage {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    fn container_dir(&self, container: &str) -> PathBuf {
        Path::new(&self.root).join(container)
    }
}

/// 名称只允许单层路径段
fn validate_name(name: &str) -> Result<(), StagingError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return Err(StagingError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl StagingStorage for LocalStagingStorage {
    fn root(&self) -> &str {
        &self.root
    }

    async fn create_container(&self, container: &str) -> Result<(), StagingError> {
        validate_name(container)?;
        let dir = self.container_dir(container);
        if tokio::fs::try_exists(&dir).await? {
            return Err(StagingError::ContainerExists(container.to_string()));
        }
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!(container = %container, dir = %dir.display(), "暂存容器已创建");
        Ok(())
    }

    async fn upload(&self, container: &str, file: UploadFile) -> Result<StagedFile, StagingError> {
        validate_name(container)?;
        validate_name(&file.file_name)?;

        let dir = self.container_dir(container);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(StagingError::ContainerNotFound(container.to_string()));
        }

        let size = file.bytes.len() as u64;
        tokio::fs::write(dir.join(&file.file_name), &file.bytes).await?;

        Ok(StagedFile {
            root: self.root.clone(),
            container: container.to_string(),
            file_name: file.file_name,
            content_type: file.content_type,
            size,
        })
    }

    async fn destroy_container(&self, container: &str) -> Result<(), StagingError> {
        validate_name(container)?;
        let dir = self.container_dir(container);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(StagingError::ContainerNotFound(container.to_string()));
        }
        tokio::fs::remove_dir_all(&dir).await?;
        tracing::debug!(container = %container, "暂存容器已删除");
        Ok(())
    }
}
