// ==========================================
// 批量导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::entity::EntityTypeDef;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入引擎运行参数
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取接受的上传文件内容类型
    ///
    /// # 默认值
    /// - text/csv
    async fn get_accepted_content_type(&self) -> RepositoryResult<String>;

    /// 获取行缓冲大小（CSV 读取任务与行管道之间的有界通道容量）
    ///
    /// # 默认值
    /// - 64
    async fn get_row_buffer_size(&self) -> RepositoryResult<usize>;

    /// 运行结束后是否删除暂存容器
    ///
    /// # 默认值
    /// - false
    async fn get_cleanup_container_after_run(&self) -> RepositoryResult<bool>;

    /// 获取暂存文件根目录
    ///
    /// # 默认值
    /// - <数据目录>/record-import/containers
    async fn get_storage_root(&self) -> RepositoryResult<String>;

    /// 获取任务记录类型名（协作方类型名，随运行参数下发）
    ///
    /// # 默认值
    /// - import_job
    async fn get_job_record_type(&self) -> RepositoryResult<String>;

    /// 获取暂存容器类型名（协作方类型名，随运行参数下发）
    ///
    /// # 默认值
    /// - import_container
    async fn get_container_type(&self) -> RepositoryResult<String>;
}

// ==========================================
// EntityTypeRegistry Trait
// ==========================================
// 用途: 读取实体类型定义（主键、字段映射、关联配置、声明的关联）
// 实现者: ConfigManager（config_kv: entity_type/{name}）
#[async_trait]
pub trait EntityTypeRegistry: Send + Sync {
    /// 按名称读取实体类型定义
    ///
    /// # 返回
    /// - Ok(Some(def)): 已注册
    /// - Ok(None): 未注册
    async fn get_entity_type(&self, name: &str) -> RepositoryResult<Option<EntityTypeDef>>;
}
