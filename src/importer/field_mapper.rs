// ==========================================
// 批量导入引擎 - 字段映射器实现
// ==========================================
// 职责: 源列 → 目标属性映射
// 规则: 空值不写入、不补默认值；主键缺失的行静默跳过
// ==========================================

use crate::domain::entity::{FieldMapping, MappedRecord};
use crate::domain::import_job::RawRow;
use crate::importer::importer_trait::{FieldMapper as FieldMapperTrait, MapOutcome};

pub struct FieldMapper;

impl FieldMapperTrait for FieldMapper {
    fn map(&self, row: &RawRow, mapping: &FieldMapping, primary_key: &str) -> MapOutcome {
        let mut record = MappedRecord::default();

        for (target_attribute, source_column) in mapping.iter() {
            if let Some(value) = self.get_string(row, source_column) {
                record.attributes.insert(target_attribute.clone(), value);
            }
        }

        if record.get(primary_key).is_none() {
            return MapOutcome::Skip;
        }

        MapOutcome::Mapped(record)
    }
}

impl FieldMapper {
    /// 提取非空字符串字段（去除首尾空白）
    fn get_string(&self, row: &RawRow, column: &str) -> Option<String> {
        row.get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }
}
