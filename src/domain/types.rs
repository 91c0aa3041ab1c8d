// ==========================================
// 批量导入引擎 - 领域类型定义
// ==========================================
// 职责: 导入任务状态、关联类型等基础枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入任务状态 (Job Status)
// ==========================================
// 红线: 状态单调推进 PENDING → PROCESSING → FINISHED，不可回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,    // 已创建，等待执行
    Processing, // 数据流已开始
    Finished,   // 终态
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Finished => "FINISHED",
        }
    }

    /// 从数据库字符串解析，未知值返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "FINISHED" => Some(JobStatus::Finished),
            _ => None,
        }
    }

    /// 是否允许从当前状态推进到 next
    ///
    /// 只允许按顺序前进一步（或原地保持非终态）
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Finished, _) => false,
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Finished) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 关联类型 (Relation Kind)
// ==========================================
// 每个实体类型解析一次，决定关联的解析策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    Reference,  // 单槽引用（attach 覆盖原值）
    ManyToMany, // 多对多链接（attach 为幂等添加）
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Reference => "REFERENCE",
            RelationKind::ManyToMany => "MANY_TO_MANY",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
