// ==========================================
// 批量导入引擎 - 实体与实体类型定义
// ==========================================
// 职责: 宿主存储中的实体、实体类型元数据、字段映射与关联配置
// 红线: 映射/关联配置为静态配置，运行期间只读
// ==========================================

use crate::domain::types::RelationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 属性集（属性名 → 值）
pub type AttributeSet = BTreeMap<String, String>;

// ==========================================
// Entity - 宿主存储中的实体
// ==========================================
// 引擎视其为不透明的可寻址记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: String,       // 实体类型名
    pub id: i64,                   // 存储主键（行 ID）
    pub attributes: AttributeSet,  // 业务属性
}

impl Entity {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }
}

// ==========================================
// FieldMapping - 字段映射
// ==========================================
// 目标属性名 → 源列名
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(pub BTreeMap<String, String>);

impl FieldMapping {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FieldMapping(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ==========================================
// RelationSpec - 关联解析配置
// ==========================================
// 关联实体查找属性名 → 源列名
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationSpec(pub BTreeMap<String, String>);

impl RelationSpec {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RelationSpec {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RelationSpec(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ==========================================
// RelationDecl - 实体类型声明的关联
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDecl {
    pub name: String,        // 关联名
    pub target_type: String, // 目标实体类型名
    pub kind: RelationKind,  // 关联类型
}

// ==========================================
// EntityTypeDef - 实体类型定义
// ==========================================
// 存储: config_kv 表 key = entity_type/{name}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    pub name: String,
    pub primary_key: String,
    #[serde(default)]
    pub field_mapping: FieldMapping,
    #[serde(default)]
    pub relation_specs: BTreeMap<String, RelationSpec>,
    #[serde(default)]
    pub relations: Vec<RelationDecl>,
}

impl EntityTypeDef {
    pub fn declared_relation(&self, name: &str) -> Option<&RelationDecl> {
        self.relations.iter().find(|r| r.name == name)
    }
}

// ==========================================
// MappedRecord - 映射后的属性集
// ==========================================
// 仅在处理单行期间有效，不持久化
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRecord {
    pub attributes: AttributeSet,
}

impl MappedRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }
}
