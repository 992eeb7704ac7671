//! 查询处理上下文
//!
//! 封装"我正在处理第几个事项的哪个变体"这一信息

use crate::models::{DateRange, Variant, WorkItem};
use std::fmt::Display;

/// 变体处理上下文
#[derive(Debug, Clone)]
pub struct VariantCtx {
    /// 事项 key，例如 `IMP_217`
    pub key: String,

    /// 导出列表中用于匹配的标签
    pub tag: String,

    /// 事项索引（从1开始，仅用于日志显示）
    pub item_index: usize,

    /// 变体在事项中的索引（从1开始）
    pub variant_index: usize,

    pub variant: Variant,

    pub date_range: DateRange,

    /// 代理的 CUIT（写入文件名）
    pub target_identity: String,
}

impl VariantCtx {
    pub fn new(
        item: &WorkItem,
        item_index: usize,
        variant_index: usize,
        variant: &Variant,
        target_identity: &str,
    ) -> Self {
        Self {
            key: item.key.clone(),
            tag: item.tag().to_string(),
            item_index,
            variant_index,
            variant: variant.clone(),
            date_range: item.date_range,
            target_identity: target_identity.to_string(),
        }
    }
}

impl Display for VariantCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[事项 #{} {} 变体#{} {}]",
            self.item_index, self.key, self.variant_index, self.variant.label
        )
    }
}
