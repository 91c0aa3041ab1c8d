// ==========================================
// 批量导入引擎 - 导入任务领域模型
// ==========================================
// 职责: 单次导入运行的审计/状态记录
// 红线: 状态单调；FINISHED 后不可变；警告/错误只追加
// ==========================================

use crate::domain::types::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// 原始行（列名 → 字符串值）
pub type RawRow = BTreeMap<String, String>;

// ==========================================
// AuditEntry - 警告/错误条目
// ==========================================
// 插入顺序即发生顺序，审计可复现
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub row_number: usize, // 源文件数据行号（从 1 开始）
    pub row: RawRow,       // 原始行
    pub message: String,   // 描述
}

impl AuditEntry {
    pub fn new(row_number: usize, row: RawRow, message: impl Into<String>) -> Self {
        Self {
            row_number,
            row,
            message: message.into(),
        }
    }
}

/// 任务状态机错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobStateError {
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("任务已结束，不可修改: job_id={0}")]
    AlreadyFinished(String),
}

// ==========================================
// ImportJob - 导入任务
// ==========================================
// 对齐: import_job 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,              // 任务 ID（UUID）
    pub target_type: String,         // 目标实体类型名
    pub created_at: DateTime<Utc>,   // 创建时间
    pub status: JobStatus,           // 当前状态
    pub warnings: Vec<AuditEntry>,   // 警告（有序）
    pub errors: Vec<AuditEntry>,     // 错误（有序）
}

impl ImportJob {
    /// 新建 PENDING 任务
    pub fn new_pending(job_id: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            target_type: target_type.into(),
            created_at: Utc::now(),
            status: JobStatus::Pending,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// 推进状态
    pub fn advance_to(&mut self, next: JobStatus) -> Result<(), JobStateError> {
        if !self.status.can_advance_to(next) {
            return Err(JobStateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn push_warning(&mut self, entry: AuditEntry) -> Result<(), JobStateError> {
        self.ensure_mutable()?;
        self.warnings.push(entry);
        Ok(())
    }

    pub fn push_error(&mut self, entry: AuditEntry) -> Result<(), JobStateError> {
        self.ensure_mutable()?;
        self.errors.push(entry);
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_mutable(&self) -> Result<(), JobStateError> {
        if self.is_finished() {
            return Err(JobStateError::AlreadyFinished(self.job_id.clone()));
        }
        Ok(())
    }
}

// ==========================================
// RunReport - 单次运行汇总
// ==========================================
// worker 结束时返回；ProcessExecutor 通过 stdout 以 JSON 回传
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub job_id: String,
    pub rows_read: usize,   // 读取的数据行数（含解码失败的行）
    pub created: usize,     // 新建实体数
    pub updated: usize,     // 更新实体数
    pub skipped: usize,     // 主键缺失而跳过的行数
    pub failed_rows: usize, // 产生错误条目的行数
    pub warnings: usize,    // 警告条目总数
    pub errors: usize,      // 错误条目总数
    pub elapsed_ms: u64,    // 耗时（毫秒）
}
