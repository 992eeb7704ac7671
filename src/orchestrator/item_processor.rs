//! 单个事项处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **遍历变体**：按顺序执行事项的每个变体
//! 2. **进度落盘**：每下载一个文件立即写检查点
//! 3. **失败隔离**：非致命失败只记录，继续下一个变体
//! 4. **复位表单**：每个变体结束后回到"新查询"页签

use crate::driver::UiDriver;
use crate::error::AppResult;
use crate::models::{CheckpointRecord, WorkItem};
use crate::services::{CheckpointStorage, CheckpointStore};
use crate::workflow::{ExportFlow, VariantCtx};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// 单个变体的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantOutcome {
    /// 下载并保存成功
    Succeeded(PathBuf),
    /// 非致命失败，批次继续
    Failed { variant: String, reason: String },
}

impl VariantOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VariantOutcome::Succeeded(_))
    }
}

/// 处理一个事项的全部变体
///
/// # 返回
/// 每个变体的结果；只有致命错误才会返回 `Err`
#[allow(clippy::too_many_arguments)]
pub async fn process_item<D: UiDriver, S: CheckpointStorage>(
    driver: &D,
    portal: &D::Portal,
    flow: &ExportFlow,
    item: &WorkItem,
    item_index: usize,
    target_identity: &str,
    record: &mut CheckpointRecord,
    store: &CheckpointStore<S>,
) -> AppResult<Vec<VariantOutcome>> {
    let mut outcomes = Vec::with_capacity(item.variants.len());

    for (index, variant) in item.variants.iter().enumerate() {
        let ctx = VariantCtx::new(item, item_index, index + 1, variant, target_identity);
        info!("{} 🚀 开始处理", ctx);

        match flow.run_variant(driver, portal, &ctx).await {
            Ok(path) => {
                record.record_artifact(path.clone())?;
                store.save(record)?;
                outcomes.push(VariantOutcome::Succeeded(path));
            }
            Err(e) if e.is_fatal() => {
                error!("{} ❌ 致命错误: {}", ctx, e);
                return Err(e);
            }
            Err(e) => {
                error!("{} ❌ 处理失败，继续下一个: {}", ctx, e);
                outcomes.push(VariantOutcome::Failed {
                    variant: variant.label.clone(),
                    reason: e.to_string(),
                });
            }
        }

        match flow.return_to_new_query(driver, portal).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("{} ⚠️ 无法回到新查询页签: {}", ctx, e),
        }
    }

    Ok(outcomes)
}
