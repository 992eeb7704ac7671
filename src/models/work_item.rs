use crate::error::ValidationError;
use crate::models::catalog::{Catalog, CatalogEntry};
use crate::models::date_range::DateRange;
use crate::models::identity::validate_cuit;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// 操作类型：决定一个事项需要跑几次查询
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// 只查预扣（Retención）
    Retencion,
    /// 只查代收（Percepción）
    Percepcion,
    /// 一次查询同时包含两者
    Ambas,
    /// 分两次查询：先预扣，再代收
    AmbasSeparadas,
    /// 没有操作类型字段，只填日期
    FechaSolo,
}

impl OperationMode {
    /// 展开为有序的变体列表
    pub fn variants(self) -> Vec<Variant> {
        match self {
            OperationMode::Retencion => vec![Variant::new("Retención", Some("1"))],
            OperationMode::Percepcion => vec![Variant::new("Percepción", Some("2"))],
            OperationMode::Ambas => vec![Variant::new("Retención y percepción", Some("0"))],
            OperationMode::AmbasSeparadas => vec![
                Variant::new("Retención", Some("1")),
                Variant::new("Percepción", Some("2")),
            ],
            OperationMode::FechaSolo => vec![Variant::new("Solo fecha", None)],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationMode::Retencion => "retencion",
            OperationMode::Percepcion => "percepcion",
            OperationMode::Ambas => "ambas",
            OperationMode::AmbasSeparadas => "ambas_separadas",
            OperationMode::FechaSolo => "fecha_solo",
        }
    }
}

/// 一个事项下的一次子查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// 显示名称
    pub label: String,
    /// 操作类型单选框的值；`None` 表示表单里没有该字段
    pub operation_value: Option<String>,
}

impl Variant {
    pub fn new(label: &str, operation_value: Option<&str>) -> Self {
        Self {
            label: label.to_string(),
            operation_value: operation_value.map(str::to_string),
        }
    }
}

/// 一个可请求的工作单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub category: String,
    pub key: String,
    pub name: String,
    pub variants: Vec<Variant>,
    pub date_range: DateRange,
}

impl WorkItem {
    fn from_entry(entry: &CatalogEntry, date_range: DateRange) -> Self {
        Self {
            category: entry.category.clone(),
            key: entry.code.clone(),
            name: entry.name.clone(),
            variants: entry.mode.variants(),
            date_range,
        }
    }

    /// 导出列表中用于匹配的内容标签，例如 `IMP_217` -> `217`
    pub fn tag(&self) -> &str {
        match self.key.split_once('_') {
            Some((_, number)) => number,
            None => &self.key,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.category)
    }
}

/// 有序的工作计划
///
/// 顺序在创建时固定，恢复时必须使用同一目录以保证顺序一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPlan {
    items: Vec<WorkItem>,
    pub date_range: DateRange,
    pub target_identity: String,
    pub login_identity: String,
}

impl WorkPlan {
    /// 批量模式：目录中的全部事项
    pub fn batch(
        catalog: &Catalog,
        date_range: DateRange,
        login_identity: &str,
        target_identity: &str,
    ) -> Result<Self, ValidationError> {
        let items = catalog
            .entries()
            .iter()
            .map(|entry| WorkItem::from_entry(entry, date_range))
            .collect();
        Self::new(items, date_range, login_identity, target_identity)
    }

    /// 单项模式：只处理目录中的一个事项
    pub fn single(
        catalog: &Catalog,
        key: &str,
        date_range: DateRange,
        login_identity: &str,
        target_identity: &str,
    ) -> Result<Self, ValidationError> {
        let entry = catalog
            .get(key)
            .ok_or_else(|| ValidationError::UnknownItem {
                key: key.to_string(),
            })?;
        let items = vec![WorkItem::from_entry(entry, date_range)];
        Self::new(items, date_range, login_identity, target_identity)
    }

    /// 校验所有不变量后创建计划
    pub fn new(
        items: Vec<WorkItem>,
        date_range: DateRange,
        login_identity: &str,
        target_identity: &str,
    ) -> Result<Self, ValidationError> {
        let plan = Self {
            items,
            date_range,
            target_identity: target_identity.to_string(),
            login_identity: login_identity.to_string(),
        };
        plan.validate()?;
        Ok(plan)
    }

    /// 检查身份、日期范围与事项列表
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_cuit("CUIT (login)", &self.login_identity)?;
        validate_cuit("CUIT (target)", &self.target_identity)?;
        DateRange::new(self.date_range.start, self.date_range.end)?;

        if self.items.is_empty() {
            return Err(ValidationError::EmptyPlan);
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if !seen.insert(item.key.as_str()) {
                return Err(ValidationError::DuplicateKey {
                    key: item.key.clone(),
                });
            }
            if item.variants.is_empty() {
                return Err(ValidationError::EmptyVariants {
                    key: item.key.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = "20111111112";
    const TARGET: &str = "30500010912";

    fn range() -> DateRange {
        DateRange::parse("01/01/2024", "31/03/2024").unwrap()
    }

    fn item(key: &str, variants: Vec<Variant>) -> WorkItem {
        WorkItem {
            category: "Impositivas".to_string(),
            key: key.to_string(),
            name: key.to_string(),
            variants,
            date_range: range(),
        }
    }

    #[test]
    fn test_ambas_separadas_has_two_ordered_variants() {
        let variants = OperationMode::AmbasSeparadas.variants();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].operation_value.as_deref(), Some("1"));
        assert_eq!(variants[1].operation_value.as_deref(), Some("2"));
        assert_eq!(OperationMode::FechaSolo.variants()[0].operation_value, None);
    }

    #[test]
    fn test_tag_is_numeric_suffix() {
        let it = item("IMP_217", OperationMode::Ambas.variants());
        assert_eq!(it.tag(), "217");
        let plain = item("939", OperationMode::Percepcion.variants());
        assert_eq!(plain.tag(), "939");
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let items = vec![
            item("IMP_217", OperationMode::Ambas.variants()),
            item("IMP_217", OperationMode::Ambas.variants()),
        ];
        let err = WorkPlan::new(items, range(), LOGIN, TARGET).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateKey {
                key: "IMP_217".to_string()
            }
        );
    }

    #[test]
    fn test_empty_variants_rejected() {
        let err = WorkPlan::new(vec![item("IMP_172", vec![])], range(), LOGIN, TARGET).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyVariants { .. }));
    }

    #[test]
    fn test_invalid_identity_rejected() {
        let items = vec![item("IMP_172", OperationMode::Retencion.variants())];
        let err = WorkPlan::new(items, range(), "123", TARGET).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCuit { .. }));
    }

    #[test]
    fn test_single_unknown_key() {
        let catalog = Catalog::builtin();
        let err = WorkPlan::single(&catalog, "IMP_000", range(), LOGIN, TARGET).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownItem {
                key: "IMP_000".to_string()
            }
        );
    }

    #[test]
    fn test_batch_preserves_catalog_order() {
        let catalog = Catalog::builtin();
        let plan = WorkPlan::batch(&catalog, range(), LOGIN, TARGET).unwrap();
        let keys: Vec<&str> = plan.items().iter().map(|i| i.key.as_str()).collect();
        let expected: Vec<&str> = catalog.entries().iter().map(|e| e.code.as_str()).collect();
        assert_eq!(keys, expected);
        assert!(plan.items().iter().all(|i| i.date_range == range()));
    }
}
