//! 批次编排器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责整个批次的生命周期，是唯一写检查点的地方。
//!
//! ## 核心功能
//!
//! 1. **恢复或新建**：按会话 ID 恢复可恢复的检查点，否则新建会话
//! 2. **会话管理**：打开浏览器会话、进入门户、结束时关闭
//! 3. **顺序处理**：按计划顺序处理事项，跳过已完成的事项
//! 4. **进度落盘**：事项开始、每个文件、事项完成都会写检查点
//! 5. **致命错误**：检查点置为 `error` 并保留工作目录，便于之后恢复
//! 6. **停止信号**：在事项之间检查，停止后检查点保持 `in_progress`

use crate::driver::UiDriver;
use crate::error::AppResult;
use crate::models::{BatchStatus, CheckpointRecord, Secret, WorkPlan};
use crate::orchestrator::item_processor::{process_item, VariantOutcome};
use crate::services::{CheckpointStorage, CheckpointStore, FsCheckpointStorage};
use crate::utils::logging::{log_item_complete, log_item_start, log_plan_loaded};
use crate::workflow::{enter_portal, ExportFlow};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 协作式停止信号，只在事项之间检查
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 单个事项的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// 之前的运行中已完成
    Skipped,
    /// 本次处理了全部变体
    Processed(Vec<VariantOutcome>),
}

/// 批次运行结果
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub session_id: String,
    pub status: BatchStatus,
    /// 按计划顺序；停止后未处理的事项不出现
    pub items: Vec<(String, ItemOutcome)>,
    /// 整个会话（包括之前的运行）下载的全部文件
    pub artifact_paths: Vec<PathBuf>,
    /// 已完成的事项数（包括之前的运行）
    pub completed_count: usize,
    pub total_count: usize,
    /// 因停止信号提前结束
    pub stopped: bool,
}

impl BatchResult {
    /// 本次运行失败的变体：(事项 key, 变体, 原因)
    pub fn failed_variants(&self) -> Vec<(&str, &str, &str)> {
        self.items
            .iter()
            .filter_map(|(key, outcome)| match outcome {
                ItemOutcome::Processed(variants) => Some((key, variants)),
                ItemOutcome::Skipped => None,
            })
            .flat_map(|(key, variants)| {
                variants.iter().filter_map(move |v| match v {
                    VariantOutcome::Failed { variant, reason } => {
                        Some((key.as_str(), variant.as_str(), reason.as_str()))
                    }
                    VariantOutcome::Succeeded(_) => None,
                })
            })
            .collect()
    }

    pub fn skipped_count(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, outcome)| *outcome == ItemOutcome::Skipped)
            .count()
    }
}

/// 批次编排器
pub struct BatchOrchestrator<D, S = FsCheckpointStorage> {
    driver: D,
    store: CheckpointStore<S>,
    flow: ExportFlow,
    stop: StopSignal,
}

impl<D: UiDriver, S: CheckpointStorage> BatchOrchestrator<D, S> {
    pub fn new(driver: D, store: CheckpointStore<S>, flow: ExportFlow) -> Self {
        Self {
            driver,
            store,
            flow,
            stop: StopSignal::new(),
        }
    }

    /// 使用外部的停止信号（例如 Ctrl+C 处理器持有的那一份）
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn store(&self) -> &CheckpointStore<S> {
        &self.store
    }

    /// 运行整个计划
    ///
    /// # 参数
    /// - `plan`: 已校验的工作计划
    /// - `secret`: 登录密码
    /// - `resume_session_id`: 要恢复的会话；不可恢复时记录警告并新建会话
    pub async fn run(
        &self,
        plan: &WorkPlan,
        secret: &Secret,
        resume_session_id: Option<&str>,
    ) -> AppResult<BatchResult> {
        plan.validate()?;
        let mut record = self.resolve_record(plan, resume_session_id)?;
        let already_done = plan
            .items()
            .iter()
            .filter(|item| record.is_completed(&item.key))
            .count();
        log_plan_loaded(plan.len(), already_done);

        let session = match self.driver.open_session(&record.session_id).await {
            Ok(session) => session,
            Err(e) => {
                error!("❌ 无法打开浏览器会话: {}", e);
                self.mark_error(&mut record);
                return Err(e.into());
            }
        };

        match self.run_session(&session, plan, secret, &mut record).await {
            Ok(result) => {
                let retain = result.status != BatchStatus::Completed;
                if let Err(e) = self.driver.close_session(session, retain).await {
                    warn!("⚠️ 关闭会话失败: {}", e);
                }
                Ok(result)
            }
            Err(e) => {
                error!("❌ 批次因致命错误终止: {}", e);
                self.mark_error(&mut record);
                if let Err(close_err) = self.driver.close_session(session, true).await {
                    warn!("⚠️ 关闭会话失败: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// 恢复指定会话，或为计划新建一个会话
    fn resolve_record(
        &self,
        plan: &WorkPlan,
        resume_session_id: Option<&str>,
    ) -> AppResult<CheckpointRecord> {
        if let Some(session_id) = resume_session_id {
            match self.store.load(session_id)? {
                Some(mut record) if record.status.is_resumable() && record.matches_plan(plan) => {
                    record.reopen()?;
                    self.store.save(&mut record)?;
                    info!(
                        "🔁 恢复会话 {} (已完成 {} 项, 已下载 {} 个文件)",
                        record.session_id,
                        record.completed_keys.len(),
                        record.all_artifact_paths.len()
                    );
                    return Ok(record);
                }
                Some(record) => warn!(
                    "⚠️ 会话 {} 无法恢复 (状态 {}，或身份/日期与本次不一致)，将新建会话",
                    session_id, record.status
                ),
                None => warn!("⚠️ 未找到会话 {} 的检查点，将新建会话", session_id),
            }
        }

        let mut record = CheckpointRecord::new(plan);
        self.store.save(&mut record)?;
        info!("🆕 新建会话 {}", record.session_id);
        Ok(record)
    }

    async fn run_session(
        &self,
        session: &D::Session,
        plan: &WorkPlan,
        secret: &Secret,
        record: &mut CheckpointRecord,
    ) -> AppResult<BatchResult> {
        let portal = enter_portal(&self.driver, session, plan, secret).await?;

        let total = plan.len();
        let mut items = Vec::with_capacity(total);
        let mut stopped = false;

        for (index, item) in plan.items().iter().enumerate() {
            let item_index = index + 1;

            if record.is_completed(&item.key) {
                info!("⏭️  事项 {}/{} {} 已完成，跳过", item_index, total, item.key);
                items.push((item.key.clone(), ItemOutcome::Skipped));
                continue;
            }

            if self.stop.is_requested() {
                warn!("⏹️ 收到停止信号，在事项 {} 之前停止", item.key);
                stopped = true;
                break;
            }

            record.begin_item(&item.key)?;
            self.store.save(record)?;
            log_item_start(item_index, total, &item.to_string());

            let outcomes = process_item(
                &self.driver,
                &portal,
                &self.flow,
                item,
                item_index,
                &plan.target_identity,
                record,
                &self.store,
            )
            .await?;

            record.complete_item(&item.key)?;
            self.store.save(record)?;
            let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
            log_item_complete(item_index, succeeded, outcomes.len());

            items.push((item.key.clone(), ItemOutcome::Processed(outcomes)));
        }

        if !stopped {
            record.mark_completed()?;
            self.store.save(record)?;
            info!("🎉 会话 {} 全部完成", record.session_id);
        }

        Ok(BatchResult {
            session_id: record.session_id.clone(),
            status: record.status,
            items,
            artifact_paths: record.all_artifact_paths.clone(),
            completed_count: plan
                .items()
                .iter()
                .filter(|item| record.is_completed(&item.key))
                .count(),
            total_count: total,
            stopped,
        })
    }

    /// 尽力把检查点置为 `error`；这里的失败只记录日志
    fn mark_error(&self, record: &mut CheckpointRecord) {
        if let Err(e) = record.mark_error() {
            warn!("⚠️ 无法标记会话错误状态: {}", e);
            return;
        }
        if let Err(e) = self.store.save(record) {
            error!("❌ 保存错误状态的检查点失败: {}", e);
        }
    }
}
