//! 单次查询导出流程 - 流程层
//!
//! 核心职责：定义"一个变体"的完整处理流程
//!
//! 流程顺序：
//! 1. 填写表单（税种 → 操作类型 → 起始日期 → 日历选择结束日期）
//! 2. 查询 → 导出 CSV（记录触发时刻）
//! 3. 切换到"已导出查询"列表，关联并下载文件
//! 4. 以确定的文件名保存

use crate::config::{Config, CorrelationPolicy, RetryPolicy};
use crate::driver::{ElementRef, UiDriver};
use crate::error::AppResult;
use crate::models::DateRange;
use crate::services::{with_retry, CorrelationQuery, ExportCorrelator, PositionFinder};
use crate::workflow::selectors;
use crate::workflow::variant_ctx::VariantCtx;
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 单次查询导出流程
///
/// - 编排表单、导出、关联、保存
/// - 不持有任何资源（page），只依赖驱动能力与业务能力
pub struct ExportFlow {
    finder: PositionFinder,
    correlator: ExportCorrelator,
    retry: RetryPolicy,
    output_dir: PathBuf,
}

impl ExportFlow {
    pub fn new(config: &Config) -> AppResult<Self> {
        Ok(Self::with_policies(
            PositionFinder::new(config.max_navigation_steps)?,
            config.retry_policy(),
            config.correlation_policy(),
            config.output_dir.clone(),
        ))
    }

    pub fn with_policies(
        finder: PositionFinder,
        retry: RetryPolicy,
        correlation: CorrelationPolicy,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            finder: finder.with_retry_policy(retry),
            correlator: ExportCorrelator::new(correlation, selectors::exported_feed()),
            retry,
            output_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 执行一个变体，返回保存的文件路径
    pub async fn run_variant<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
        ctx: &VariantCtx,
    ) -> AppResult<PathBuf> {
        info!("{} 📝 填写查询表单...", ctx);
        self.fill_form(driver, portal, ctx).await?;

        info!("{} 🔍 查询...", ctx);
        self.click(driver, portal, &ElementRef::css(selectors::CONSULT_BUTTON))
            .await?;

        info!("{} 📤 导出 CSV...", ctx);
        let requested_at = self.request_export(driver, portal).await?;
        self.open_exported_list(driver, portal, ctx).await;

        let query = CorrelationQuery {
            expected_tag: ctx.tag.clone(),
            requested_at,
            tolerance_minutes: self.correlator.policy().tolerance_minutes,
        };
        let artifact = self
            .correlator
            .await_artifact(driver, portal, &query, self.correlator.policy().max_wait_minutes)
            .await?;

        let path = unique_path(self.output_dir.join(artifact_file_name(
            &ctx.key,
            &ctx.target_identity,
            &ctx.date_range,
            Local::now().naive_local(),
        )));
        driver.save_artifact(&artifact, &path).await?;
        info!("{} ✓ 文件已保存: {}", ctx, path.display());
        Ok(path)
    }

    /// 回到"新查询"页签，为下一个变体做准备
    pub async fn return_to_new_query<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
    ) -> AppResult<()> {
        self.click(driver, portal, &ElementRef::css(selectors::NEW_QUERY_TAB))
            .await
    }

    async fn fill_form<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
        ctx: &VariantCtx,
    ) -> AppResult<()> {
        self.click(driver, portal, &ElementRef::css(selectors::TAX_SELECT))
            .await?;
        self.click(driver, portal, &selectors::tax_option(&ctx.key))
            .await?;

        if let Some(value) = &ctx.variant.operation_value {
            // 部分税种没有操作类型字段
            if let Err(e) = self
                .click(driver, portal, &selectors::operation_radio(value))
                .await
            {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("{} ⚠️ 未找到操作类型字段: {}", ctx, e);
            }
        }

        let start = ctx.date_range.start_text();
        let from_input = ElementRef::css(selectors::DATE_FROM_INPUT);
        with_retry(&self.retry, "填写起始日期", || {
            driver.fill_field(portal, &from_input, &start)
        })
        .await?;

        // 结束日期只能通过日历选择
        self.click(driver, portal, &ElementRef::css(selectors::DATE_TO_INPUT))
            .await?;
        let pane = ElementRef::css(selectors::CALENDAR_PANE);
        with_retry(&self.retry, "等待日历", || driver.read_text(portal, &pane)).await?;

        let steps = self
            .finder
            .navigate_to(
                driver,
                portal,
                &selectors::calendar_widget(),
                ctx.date_range.end_year_month(),
            )
            .await?;
        info!("{} 📅 日历移动 {} 步", ctx, steps);

        self.click(driver, portal, &selectors::calendar_day(ctx.date_range.end))
            .await?;
        Ok(())
    }

    /// 打开导出菜单并点击 CSV，返回点击前一刻的时间
    async fn request_export<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
    ) -> AppResult<NaiveDateTime> {
        self.click(driver, portal, &ElementRef::css(selectors::EXPORT_BUTTON))
            .await?;
        let requested_at = Local::now().naive_local();
        self.click(driver, portal, &selectors::csv_option()).await?;
        Ok(requested_at)
    }

    /// 导出后可能弹出确认框；没有弹框时手动切换页签
    async fn open_exported_list<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
        ctx: &VariantCtx,
    ) {
        if driver
            .click(portal, &ElementRef::css(selectors::EXPORT_MODAL_OK))
            .await
            .is_ok()
        {
            info!("{} ✓ 已通过弹框进入导出列表", ctx);
            return;
        }

        if let Err(e) = self
            .click(driver, portal, &ElementRef::css(selectors::EXPORTED_TAB))
            .await
        {
            warn!("{} ⚠️ 无法切换到导出列表页签，继续等待: {}", ctx, e);
        }
    }

    async fn click<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
        element: &ElementRef,
    ) -> AppResult<()> {
        with_retry(&self.retry, &format!("点击 {}", element), || {
            driver.click(portal, element)
        })
        .await?;
        Ok(())
    }
}

/// `MR_{key}_{target}_{ddmmyyyy}_{ddmmyyyy}_{YYYYmmdd_HHMMSS}.csv`
pub fn artifact_file_name(
    key: &str,
    target_identity: &str,
    date_range: &DateRange,
    saved_at: NaiveDateTime,
) -> String {
    format!(
        "MR_{}_{}_{}_{}_{}.csv",
        key,
        target_identity,
        date_range.start.format("%d%m%Y"),
        date_range.end.format("%d%m%Y"),
        saved_at.format("%Y%m%d_%H%M%S")
    )
}

/// 同一秒内保存两次时追加序号，避免覆盖
fn unique_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut n = 2;
    loop {
        let candidate = path.with_file_name(format!("{}_{}.csv", stem, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_artifact_file_name() {
        let range = DateRange::parse("01/01/2024", "31/03/2024").unwrap();
        let saved_at = NaiveDate::from_ymd_opt(2025, 11, 15)
            .unwrap()
            .and_hms_opt(19, 51, 7)
            .unwrap();
        assert_eq!(
            artifact_file_name("IMP_217", "30500010912", &range, saved_at),
            "MR_IMP_217_30500010912_01012024_31032024_20251115_195107.csv"
        );
    }

    #[test]
    fn test_unique_path_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("MR_a.csv");
        assert_eq!(unique_path(first.clone()), first);

        std::fs::write(&first, "x").unwrap();
        assert_eq!(unique_path(first), dir.path().join("MR_a_2.csv"));
    }
}
