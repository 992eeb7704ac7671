//! 导出结果关联 - 业务能力层
//!
//! 门户把导出任务追加到一个按时间倒序的共享列表里，但触发导出时不返回任何任务 ID。
//! 我们只能依靠四个信号判断第一行是不是"我们的"导出：
//!
//! 1. **位置**：最新的请求大概率在第一行
//! 2. **内容**：描述文本里包含我们请求的标签（税种编号）
//! 3. **时间**：创建时间在触发时刻附近的容差窗口内
//! 4. **状态**：已经是终态 "Finalizado"，而不是处理中
//!
//! 三者（标签、就绪、时间）同时满足才算匹配；否则按固定间隔继续轮询。

use crate::config::CorrelationPolicy;
use crate::driver::{ArtifactHandle, ElementRef, UiDriver};
use crate::error::{AppResult, CorrelationError, DriverResult};
use crate::utils::logging::truncate_text;
use chrono::NaiveDateTime;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// 门户列表中表示"已完成"的状态文本
pub const READY_STATUS: &str = "Finalizado";

const TIMESTAMP_FORMATS: [&str; 2] = ["%d/%m/%Y %H:%M", "%d/%m/%Y %H:%M:%S"];

/// 一次关联查询（不持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationQuery {
    /// 期望出现在结果描述中的片段，例如 "217"
    pub expected_tag: String,
    /// 触发导出之前一刻的本地时间
    pub requested_at: NaiveDateTime,
    /// 时间容差（分钟）
    pub tolerance_minutes: i64,
}

/// 列表第一行读到的内容；读取失败的单元格为空字符串
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub tag_text: String,
    pub status_text: String,
    pub timestamp_text: String,
}

/// 匹配结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchVerdict {
    /// 标签、状态、时间全部满足
    Matched,
    /// 是我们的标签，但还在处理中
    NotReady,
    /// 时间不在容差窗口内（更早的旧任务）
    Stale,
    /// 与本次请求无关（任务可能还没出现）
    Unrelated,
}

/// 单条记录的判定明细
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryCheck {
    pub is_tagged: bool,
    pub is_ready: bool,
    pub is_recent: bool,
    /// 时间戳无法解析，按"最近"处理
    pub timestamp_assumed: bool,
    pub verdict: MatchVerdict,
}

/// 判断一条记录是否对应本次请求
pub fn evaluate_entry(entry: &FeedEntry, query: &CorrelationQuery) -> EntryCheck {
    let is_tagged = !entry.tag_text.is_empty() && entry.tag_text.contains(&query.expected_tag);
    let is_ready = entry.status_text.contains(READY_STATUS);

    let (is_recent, timestamp_assumed) = match entry.timestamp_text.trim() {
        "" => (false, false),
        text => match parse_timestamp(text) {
            Some(created_at) => {
                let diff_secs = (query.requested_at - created_at).num_seconds().abs();
                (diff_secs <= query.tolerance_minutes * 60, false)
            }
            // 第一行最可能是我们的任务，过度拒绝会让整个批次停滞
            None => (true, true),
        },
    };

    let verdict = if is_tagged && is_ready && is_recent {
        MatchVerdict::Matched
    } else if is_tagged && !is_ready {
        MatchVerdict::NotReady
    } else if !is_recent {
        MatchVerdict::Stale
    } else {
        MatchVerdict::Unrelated
    };

    EntryCheck {
        is_tagged,
        is_ready,
        is_recent,
        timestamp_assumed,
        verdict,
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// 结果列表的页面结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLayout {
    /// 刷新列表按钮
    pub refresh: ElementRef,
    /// 第一行（最新）
    pub first_row: ElementRef,
    pub tag_cell: ElementRef,
    pub status_cell: ElementRef,
    pub timestamp_cell: ElementRef,
    /// 第一行的下载链接
    pub download_link: ElementRef,
}

/// 导出结果关联器
pub struct ExportCorrelator {
    policy: CorrelationPolicy,
    layout: FeedLayout,
}

impl ExportCorrelator {
    pub fn new(policy: CorrelationPolicy, layout: FeedLayout) -> Self {
        Self { policy, layout }
    }

    pub fn policy(&self) -> &CorrelationPolicy {
        &self.policy
    }

    /// 轮询结果列表，直到第一行匹配本次请求并下载成功
    ///
    /// 瞬时的读取错误在轮询内部吞掉；下载失败在剩余轮询次数内重试；
    /// 会话级别的致命错误立即返回。
    pub async fn await_artifact<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
        query: &CorrelationQuery,
        max_wait_minutes: u64,
    ) -> AppResult<ArtifactHandle> {
        let attempts = self.policy.attempts_for(max_wait_minutes);
        info!(
            "⏳ 等待导出文件就绪 (标签: {}, 最多 {} 分钟 / {} 次轮询)",
            query.expected_tag, max_wait_minutes, attempts
        );

        if !self.policy.initial_delay.is_zero() {
            sleep(self.policy.initial_delay).await;
        }

        for attempt in 1..=attempts {
            info!("🔍 第 {}/{} 次查找导出文件...", attempt, attempts);

            if let Some(artifact) = self.poll_once(driver, portal, query).await? {
                return Ok(artifact);
            }

            if attempt < attempts && !self.policy.poll_interval.is_zero() {
                sleep(self.policy.poll_interval).await;
            }
        }

        Err(CorrelationError::Timeout {
            tag: query.expected_tag.clone(),
            max_wait_minutes,
            attempts,
        }
        .into())
    }

    /// 一次轮询：刷新、读第一行、判定、匹配则下载
    async fn poll_once<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
        query: &CorrelationQuery,
    ) -> AppResult<Option<ArtifactHandle>> {
        if let Err(e) = driver.click(portal, &self.layout.refresh).await {
            if e.is_fatal() {
                return Err(e.into());
            }
            warn!("⚠️ 刷新按钮不可用: {}", e);
        }

        let Some(entry) = self.read_first_entry(driver, portal).await? else {
            warn!("⚠️ 列表中还没有任何行");
            return Ok(None);
        };

        let check = evaluate_entry(&entry, query);
        debug!(
            "第一行: 标签='{}' 状态='{}' 时间='{}' → tagged={} ready={} recent={}",
            truncate_text(entry.tag_text.trim(), 60),
            entry.status_text.trim(),
            entry.timestamp_text.trim(),
            check.is_tagged,
            check.is_ready,
            check.is_recent
        );
        if check.timestamp_assumed {
            warn!(
                "⚠️ 无法解析时间戳 '{}'，按最近记录处理",
                entry.timestamp_text.trim()
            );
        }

        match check.verdict {
            MatchVerdict::Matched => {
                info!("✓ 找到匹配的导出文件，开始下载...");
                match driver
                    .trigger_download(
                        portal,
                        &self.layout.download_link,
                        self.policy.download_timeout,
                    )
                    .await
                {
                    Ok(artifact) => {
                        info!("✓ 下载完成 ({} 字节)", artifact.bytes.len());
                        return Ok(Some(artifact));
                    }
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => warn!("⚠️ 下载失败，稍后重试: {}", e),
                }
            }
            MatchVerdict::NotReady => {
                warn!("⚠️ 找到我们的文件，但状态为 '{}'", entry.status_text.trim());
            }
            MatchVerdict::Stale => {
                warn!(
                    "⚠️ 第一行不是最近的记录 (时间: '{}')",
                    entry.timestamp_text.trim()
                );
            }
            MatchVerdict::Unrelated => {
                warn!("⚠️ 第一行与本次查询不匹配");
            }
        }

        Ok(None)
    }

    /// 读取第一行；行不存在时返回 `None`
    async fn read_first_entry<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
    ) -> DriverResult<Option<FeedEntry>> {
        match driver.read_text(portal, &self.layout.first_row).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("读取第一行失败: {}", e);
                return Ok(None);
            }
        }

        Ok(Some(FeedEntry {
            tag_text: self.read_cell(driver, portal, &self.layout.tag_cell).await?,
            status_text: self.read_cell(driver, portal, &self.layout.status_cell).await?,
            timestamp_text: self
                .read_cell(driver, portal, &self.layout.timestamp_cell)
                .await?,
        }))
    }

    async fn read_cell<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
        cell: &ElementRef,
    ) -> DriverResult<String> {
        match driver.read_text(portal, cell).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("读取单元格 {} 失败: {}", cell, e);
                Ok(String::new())
            }
        }
    }
}
