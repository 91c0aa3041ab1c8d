// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、实体类型注册、CSV 生成、故障注入等功能
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use record_import::config::ConfigManager;
use record_import::db::{init_schema, open_sqlite_connection};
use record_import::domain::{
    AttributeSet, Entity, EntityTypeDef, ImportJob, JobStatus, RelationDecl, RelationKind,
    RunReport,
};
use record_import::importer::{FieldMapperImpl, ImportResult, RecordImporter};
use record_import::repository::{
    EntityStore, ImportJobRepository, RepositoryError, RepositoryResult, SqliteEntityStore,
    SqliteImportJobRepository,
};
use rusqlite::Connection;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{NamedTempFile, TempDir};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    let conn = open_sqlite_connection(db_path).expect("Failed to open db");
    Arc::new(Mutex::new(conn))
}

// ==========================================
// 实体类型
// ==========================================

/// Pet: 主键 id；owner → Owner(email)（单槽引用）；tags → Tag(label)（多对多）
pub fn pet_type_def() -> EntityTypeDef {
    EntityTypeDef {
        name: "Pet".to_string(),
        primary_key: "id".to_string(),
        field_mapping: [("id", "id"), ("name", "name"), ("age", "age")]
            .into_iter()
            .collect(),
        relation_specs: [
            (
                "owner".to_string(),
                [("email", "ownerEmail")].into_iter().collect(),
            ),
            ("tags".to_string(), [("label", "tag")].into_iter().collect()),
        ]
        .into_iter()
        .collect(),
        relations: vec![
            RelationDecl {
                name: "owner".to_string(),
                target_type: "Owner".to_string(),
                kind: RelationKind::Reference,
            },
            RelationDecl {
                name: "tags".to_string(),
                target_type: "Tag".to_string(),
                kind: RelationKind::ManyToMany,
            },
        ],
    }
}

pub fn owner_type_def() -> EntityTypeDef {
    EntityTypeDef {
        name: "Owner".to_string(),
        primary_key: "email".to_string(),
        field_mapping: [("email", "email"), ("name", "name")]
            .into_iter()
            .collect(),
        relation_specs: Default::default(),
        relations: Vec::new(),
    }
}

pub fn attrs(pairs: &[(&str, &str)]) -> AttributeSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// 写入 CSV 文件
pub fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write csv");
    path
}

// ==========================================
// TestEnv - 单测试运行环境
// ==========================================
pub struct TestEnv {
    pub _db_file: NamedTempFile,
    pub dir: TempDir,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub store: Arc<SqliteEntityStore>,
    pub job_repo: Arc<SqliteImportJobRepository>,
    pub config: Arc<ConfigManager>,
}

impl TestEnv {
    /// 新建环境并注册 Pet / Owner 实体类型
    pub fn new() -> Self {
        let (db_file, db_path) = create_test_db().expect("Failed to create test db");
        let conn = open_shared(&db_path);
        let config =
            Arc::new(ConfigManager::from_connection(conn.clone()).expect("Failed to create config"));
        config
            .register_entity_type(&pet_type_def())
            .expect("Failed to register Pet");
        config
            .register_entity_type(&owner_type_def())
            .expect("Failed to register Owner");

        Self {
            _db_file: db_file,
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
            db_path,
            store: Arc::new(SqliteEntityStore::from_connection(conn.clone())),
            job_repo: Arc::new(SqliteImportJobRepository::from_connection(conn.clone())),
            conn,
            config,
        }
    }

    pub async fn create_job(&self, target_type: &str) -> String {
        self.job_repo
            .create(Utc::now(), target_type, JobStatus::Pending)
            .await
            .expect("Failed to create job")
            .job_id
    }

    pub async fn job(&self, job_id: &str) -> ImportJob {
        self.job_repo
            .find_by_id(job_id)
            .await
            .expect("Failed to load job")
            .expect("job not found")
    }

    pub fn importer_with_store(&self, store: Arc<dyn EntityStore>) -> RecordImporter {
        RecordImporter::new(store, self.job_repo.clone(), Arc::new(FieldMapperImpl), 4)
    }

    /// 新建 Pet 导入任务并执行
    pub async fn import_pets(&self, csv: &str) -> (String, ImportResult<RunReport>) {
        self.import_pets_with_store(csv, self.store.clone()).await
    }

    pub async fn import_pets_with_store(
        &self,
        csv: &str,
        store: Arc<dyn EntityStore>,
    ) -> (String, ImportResult<RunReport>) {
        let job_id = self.create_job("Pet").await;
        let file = write_csv(self.dir.path(), &format!("{}.csv", job_id), csv);
        let result = self
            .importer_with_store(store)
            .run(&job_id, &pet_type_def(), &file)
            .await;
        (job_id, result)
    }

    pub async fn find_pet(&self, id: &str) -> Option<Entity> {
        self.store
            .find_one("Pet", &attrs(&[("id", id)]))
            .await
            .expect("find_one failed")
    }
}

// ==========================================
// 故障注入: EntityStore
// ==========================================
// - find_one: 查找条件中任一值等于 poison 时失败
// - fail_check_on: 指定关联的“是否已关联”查询失败
// - fail_attach_on: 指定关联的写入失败
// 其余调用委托给内部存储
pub struct FaultyEntityStore {
    inner: Arc<dyn EntityStore>,
    poison: String,
    fail_check: Option<String>,
    fail_attach: Option<String>,
    pub failures: AtomicUsize,
}

impl FaultyEntityStore {
    pub fn new(inner: Arc<dyn EntityStore>, poison: &str) -> Self {
        Self {
            inner,
            poison: poison.to_string(),
            fail_check: None,
            fail_attach: None,
            failures: AtomicUsize::new(0),
        }
    }

    pub fn fail_check_on(mut self, relation: &str) -> Self {
        self.fail_check = Some(relation.to_string());
        self
    }

    pub fn fail_attach_on(mut self, relation: &str) -> Self {
        self.fail_attach = Some(relation.to_string());
        self
    }

    fn inject(&self, target: &Option<String>, relation: &str, what: &str) -> RepositoryResult<()> {
        if target.as_deref() == Some(relation) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(RepositoryError::DatabaseQueryError(format!(
                "injected {} failure: {}",
                what, relation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for FaultyEntityStore {
    async fn find_one(
        &self,
        entity_type: &str,
        filter: &AttributeSet,
    ) -> RepositoryResult<Option<Entity>> {
        if filter.values().any(|v| v == &self.poison) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(RepositoryError::DatabaseQueryError(format!(
                "injected lookup failure: {}",
                self.poison
            )));
        }
        self.inner.find_one(entity_type, filter).await
    }

    async fn create(&self, entity_type: &str, attributes: AttributeSet) -> RepositoryResult<Entity> {
        self.inner.create(entity_type, attributes).await
    }

    async fn update(&self, entity: &Entity, attributes: AttributeSet) -> RepositoryResult<Entity> {
        self.inner.update(entity, attributes).await
    }

    async fn count(&self, entity_type: &str) -> RepositoryResult<usize> {
        self.inner.count(entity_type).await
    }

    async fn find_related_by_id(
        &self,
        entity: &Entity,
        relation: &str,
        target_id: i64,
    ) -> RepositoryResult<Option<Entity>> {
        self.inject(&self.fail_check, relation, "check")?;
        self.inner.find_related_by_id(entity, relation, target_id).await
    }

    async fn list_related(&self, entity: &Entity, relation: &str) -> RepositoryResult<Vec<Entity>> {
        self.inject(&self.fail_check, relation, "check")?;
        self.inner.list_related(entity, relation).await
    }

    async fn add_related(
        &self,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()> {
        self.inject(&self.fail_attach, &relation.name, "attach")?;
        self.inner.add_related(entity, relation, target).await
    }

    async fn set_reference(
        &self,
        entity: &Entity,
        relation: &RelationDecl,
        target: &Entity,
    ) -> RepositoryResult<()> {
        self.inject(&self.fail_attach, &relation.name, "attach")?;
        self.inner.set_reference(entity, relation, target).await
    }
}

// ==========================================
// 故障注入: ImportJobRepository
// ==========================================
// 前 allowed_saves 次 save 正常，之后全部失败
pub struct FailingSaveJobRepository {
    inner: Arc<dyn ImportJobRepository>,
    allowed_saves: usize,
    saves: AtomicUsize,
}

impl FailingSaveJobRepository {
    pub fn new(inner: Arc<dyn ImportJobRepository>, allowed_saves: usize) -> Self {
        Self {
            inner,
            allowed_saves,
            saves: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImportJobRepository for FailingSaveJobRepository {
    async fn create(
        &self,
        created_at: chrono::DateTime<Utc>,
        target_type: &str,
        status: JobStatus,
    ) -> RepositoryResult<ImportJob> {
        self.inner.create(created_at, target_type, status).await
    }

    async fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        self.inner.find_by_id(job_id).await
    }

    async fn save(&self, job: &ImportJob) -> RepositoryResult<ImportJob> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst);
        if n >= self.allowed_saves {
            return Err(RepositoryError::DatabaseQueryError(
                "injected save failure".to_string(),
            ));
        }
        self.inner.save(job).await
    }

    async fn delete(&self, job_id: &str) -> RepositoryResult<bool> {
        self.inner.delete(job_id).await
    }

    async fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ImportJob>> {
        self.inner.list_recent(limit).await
    }
}
