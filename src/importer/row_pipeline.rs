// ==========================================
// 批量导入引擎 - 行处理管道
// ==========================================
// 单行状态: Mapped → Upserted → RelationsResolved → Accounted
// 规则:
// - 行按文件顺序逐行处理，行间严格串行（避免同主键并发写）
// - 行内关联并发解析，全部结束后该行才记账
// - 行级错误记入任务后继续下一行；只有流结束才正常终止
// ==========================================

use crate::domain::import_job::{AuditEntry, RawRow, RunReport};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{CsvRowStream, SourceRow};
use crate::importer::importer_trait::{FieldMapper, MapOutcome};
use crate::importer::job_lifecycle::JobLifecycleManager;
use crate::importer::relation_resolver::{RelationOutcome, RelationResolver};
use crate::importer::run_context::RunContext;
use crate::importer::upsert_resolver::{UpsertOutcome, UpsertResolver, MSG_ENTITY_EXISTS};
use crate::repository::entity_store::EntityStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 行处理结果类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDisposition {
    Skipped, // 主键缺失
    Created, // 新建
    Updated, // 更新
    Failed,  // 未落库（upsert 失败 / 记录解码失败）
}

// ==========================================
// RowAccount - 单行记账
// ==========================================
#[derive(Debug, Clone)]
pub struct RowAccount {
    pub row_number: usize,
    pub disposition: RowDisposition,
    pub warnings: Vec<AuditEntry>,
    pub errors: Vec<AuditEntry>,
}

impl RowAccount {
    /// 关联失败时实体已落库，disposition 保持 Created/Updated，但仍记为失败行
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn new(row_number: usize, disposition: RowDisposition) -> Self {
        Self {
            row_number,
            disposition,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

// ==========================================
// RowPipeline
// ==========================================
pub struct RowPipeline {
    mapper: Arc<dyn FieldMapper>,
    upsert: UpsertResolver,
    relations: RelationResolver,
}

impl RowPipeline {
    pub fn new(store: Arc<dyn EntityStore>, mapper: Arc<dyn FieldMapper>) -> Self {
        Self {
            mapper,
            upsert: UpsertResolver::new(store.clone()),
            relations: RelationResolver::new(store),
        }
    }

    /// 处理单行（映射 → upsert → 关联），从不返回错误
    pub async fn process_row(&self, ctx: &RunContext, source: SourceRow) -> RowAccount {
        let SourceRow { row_number, row } = source;

        // === 映射 ===
        let record = match self.mapper.map(
            &row,
            &ctx.entity_type.field_mapping,
            ctx.primary_key(),
        ) {
            MapOutcome::Mapped(record) => record,
            MapOutcome::Skip => {
                debug!(job_id = %ctx.job_id, row_number, "主键缺失，跳过");
                return RowAccount::new(row_number, RowDisposition::Skipped);
            }
        };

        // === Upsert ===
        let outcome = match self.upsert.upsert(ctx, record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = %ctx.job_id, row_number, error = %e, "upsert 失败");
                let mut account = RowAccount::new(row_number, RowDisposition::Failed);
                account
                    .errors
                    .push(AuditEntry::new(row_number, row, e.to_string()));
                return account;
            }
        };

        let mut account = match &outcome {
            UpsertOutcome::Created(_) => RowAccount::new(row_number, RowDisposition::Created),
            UpsertOutcome::Updated(_) => {
                let mut account = RowAccount::new(row_number, RowDisposition::Updated);
                account
                    .warnings
                    .push(AuditEntry::new(row_number, row.clone(), MSG_ENTITY_EXISTS));
                account
            }
        };

        // === 关联 ===
        let outcomes = self
            .relations
            .resolve_all(ctx, outcome.entity(), &row)
            .await;
        self.account_relations(ctx, &mut account, &row, outcomes);

        account
    }

    /// 关联结果按 ctx.relations 顺序记账；多个关联失败合并为一条错误
    fn account_relations(
        &self,
        ctx: &RunContext,
        account: &mut RowAccount,
        row: &RawRow,
        outcomes: Vec<RelationOutcome>,
    ) {
        let mut failures = Vec::new();

        for outcome in outcomes {
            if let Some(message) = outcome.warning_message() {
                account
                    .warnings
                    .push(AuditEntry::new(account.row_number, row.clone(), message));
                continue;
            }
            if let RelationOutcome::Failed { relation, error } = outcome {
                warn!(
                    job_id = %ctx.job_id,
                    row_number = account.row_number,
                    relation = %relation,
                    error = %error,
                    "关联失败"
                );
                failures.push(format!("{}: {}", relation, error));
            }
        }

        if !failures.is_empty() {
            account.errors.push(AuditEntry::new(
                account.row_number,
                row.clone(),
                format!("关联失败: {}", failures.join("; ")),
            ));
        }
    }

    /// 消费整个行流并记账，流结束后将任务置为 FINISHED
    ///
    /// # 返回
    /// - Ok(RunReport): 运行汇总
    /// - Err(Fatal): 任务记录保存失败或源文件读取中断
    pub async fn run(
        &self,
        ctx: &RunContext,
        mut stream: CsvRowStream,
        lifecycle: &mut JobLifecycleManager,
    ) -> ImportResult<RunReport> {
        let started = Instant::now();
        let mut report = RunReport {
            job_id: ctx.job_id.clone(),
            ..Default::default()
        };

        while let Some(item) = stream.next().await {
            report.rows_read += 1;

            let account = match item {
                Ok(source) => self.process_row(ctx, source).await,
                Err(read_error) => {
                    let mut account =
                        RowAccount::new(read_error.row_number, RowDisposition::Failed);
                    account.errors.push(AuditEntry::new(
                        read_error.row_number,
                        RawRow::new(),
                        read_error.message,
                    ));
                    account
                }
            };

            match account.disposition {
                RowDisposition::Skipped => report.skipped += 1,
                RowDisposition::Created => report.created += 1,
                RowDisposition::Updated => report.updated += 1,
                RowDisposition::Failed => {}
            }
            if account.has_errors() {
                report.failed_rows += 1;
            }
            report.warnings += account.warnings.len();
            report.errors += account.errors.len();

            lifecycle.record(account.warnings, account.errors).await?;
        }

        if let Err(e) = stream.finish().await {
            return Err(ImportError::fatal(
                &ctx.job_id,
                format!("源文件读取中断: {}", e),
            ));
        }

        lifecycle.finish().await?;

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            job_id = %ctx.job_id,
            rows_read = report.rows_read,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            failed_rows = report.failed_rows,
            warnings = report.warnings,
            errors = report.errors,
            elapsed_ms = report.elapsed_ms,
            "导入运行完成"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{EntityTypeDef, RelationDecl};
    use crate::domain::types::RelationKind;
    use crate::importer::field_mapper::FieldMapper as FieldMapperImpl;
    use crate::repository::entity_store_impl::SqliteEntityStore;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup_store() -> Arc<SqliteEntityStore> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        Arc::new(SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn))))
    }

    fn pet_context() -> RunContext {
        RunContext::resolve(
            "job-1",
            EntityTypeDef {
                name: "Pet".to_string(),
                primary_key: "id".to_string(),
                field_mapping: [("id", "ID"), ("name", "Name")].into_iter().collect(),
                relation_specs: [(
                    "owner".to_string(),
                    [("email", "ownerEmail")].into_iter().collect(),
                )]
                .into_iter()
                .collect(),
                relations: vec![RelationDecl {
                    name: "owner".to_string(),
                    target_type: "Owner".to_string(),
                    kind: RelationKind::Reference,
                }],
            },
        )
    }

    fn source(row_number: usize, pairs: &[(&str, &str)]) -> SourceRow {
        SourceRow {
            row_number,
            row: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_process_row_dispositions() {
        let store = setup_store();
        let pipeline = RowPipeline::new(store.clone(), Arc::new(FieldMapperImpl));
        let ctx = pet_context();

        let skipped = pipeline
            .process_row(&ctx, source(1, &[("Name", "Rex")]))
            .await;
        assert_eq!(skipped.disposition, RowDisposition::Skipped);
        assert!(skipped.warnings.is_empty() && skipped.errors.is_empty());

        let created = pipeline
            .process_row(&ctx, source(2, &[("ID", "1"), ("Name", "Rex")]))
            .await;
        assert_eq!(created.disposition, RowDisposition::Created);
        assert!(created.warnings.is_empty());

        let updated = pipeline
            .process_row(&ctx, source(3, &[("ID", "1"), ("Name", "Max")]))
            .await;
        assert_eq!(updated.disposition, RowDisposition::Updated);
        assert_eq!(updated.warnings.len(), 1);
        assert_eq!(updated.warnings[0].message, MSG_ENTITY_EXISTS);
        assert_eq!(updated.warnings[0].row_number, 3);
    }

    #[tokio::test]
    async fn test_upsert_warning_precedes_relation_warning() {
        let store = setup_store();
        let pipeline = RowPipeline::new(store.clone(), Arc::new(FieldMapperImpl));
        let ctx = pet_context();

        pipeline
            .process_row(&ctx, source(1, &[("ID", "1")]))
            .await;
        let account = pipeline
            .process_row(&ctx, source(2, &[("ID", "1"), ("ownerEmail", "x@y.io")]))
            .await;

        let messages: Vec<&str> = account
            .warnings
            .iter()
            .map(|w| w.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec![
                MSG_ENTITY_EXISTS,
                "tried to relate nonexistent instance of owner"
            ]
        );
        assert!(account.errors.is_empty());
    }
}
