//! 批次检查点记录
//!
//! 只由编排层写入；状态界面等读者只能只读访问。

use crate::error::CheckpointError;
use crate::models::date_range::DateRange;
use crate::models::work_item::WorkPlan;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    InProgress,
    Completed,
    Error,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BatchStatus::InProgress)
    }

    /// 可以被恢复的状态
    pub fn is_resumable(self) -> bool {
        matches!(self, BatchStatus::InProgress | BatchStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Completed => "completed",
            BatchStatus::Error => "error",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个会话的持久化进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub session_id: String,
    pub login_identity: String,
    pub target_identity: String,
    pub date_range: DateRange,
    /// 计划中的事项 key，按处理顺序
    #[serde(default)]
    pub item_keys: Vec<String>,
    pub started_at: DateTime<Local>,
    pub completed_keys: BTreeSet<String>,
    pub current_key: Option<String>,
    pub all_artifact_paths: Vec<PathBuf>,
    pub status: BatchStatus,
    pub last_updated_at: DateTime<Local>,
}

impl CheckpointRecord {
    /// 为计划创建新的会话记录
    pub fn new(plan: &WorkPlan) -> Self {
        let now = Local::now();
        Self {
            session_id: new_session_id(),
            login_identity: plan.login_identity.clone(),
            target_identity: plan.target_identity.clone(),
            date_range: plan.date_range,
            item_keys: plan_keys(plan),
            started_at: now,
            completed_keys: BTreeSet::new(),
            current_key: None,
            all_artifact_paths: Vec::new(),
            status: BatchStatus::InProgress,
            last_updated_at: now,
        }
    }

    /// 记录是否属于同一个计划：身份、日期和事项列表都一致
    pub fn matches_plan(&self, plan: &WorkPlan) -> bool {
        self.login_identity == plan.login_identity
            && self.target_identity == plan.target_identity
            && self.date_range == plan.date_range
            && self.item_keys.iter().eq(plan.items().iter().map(|item| &item.key))
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.completed_keys.contains(key)
    }

    /// 标记事项开始处理
    pub fn begin_item(&mut self, key: &str) -> Result<(), CheckpointError> {
        self.ensure_open()?;
        if !self.completed_keys.contains(key) {
            self.current_key = Some(key.to_string());
        }
        Ok(())
    }

    /// 追加一个已下载文件路径
    pub fn record_artifact(&mut self, path: PathBuf) -> Result<(), CheckpointError> {
        self.ensure_open()?;
        self.all_artifact_paths.push(path);
        Ok(())
    }

    /// 事项完成：加入 completed_keys 并清空 current_key
    pub fn complete_item(&mut self, key: &str) -> Result<(), CheckpointError> {
        self.ensure_open()?;
        self.completed_keys.insert(key.to_string());
        if self.current_key.as_deref() == Some(key) {
            self.current_key = None;
        }
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), CheckpointError> {
        self.ensure_open()?;
        self.current_key = None;
        self.status = BatchStatus::Completed;
        Ok(())
    }

    pub fn mark_error(&mut self) -> Result<(), CheckpointError> {
        self.ensure_open()?;
        self.status = BatchStatus::Error;
        Ok(())
    }

    /// 恢复运行：只有 `error` 会被重新打开为 `in_progress`
    pub fn reopen(&mut self) -> Result<(), CheckpointError> {
        match self.status {
            BatchStatus::InProgress => Ok(()),
            BatchStatus::Error => {
                self.status = BatchStatus::InProgress;
                Ok(())
            }
            BatchStatus::Completed => Err(self.terminal_error()),
        }
    }

    pub fn touch(&mut self) {
        self.last_updated_at = Local::now();
    }

    fn ensure_open(&self) -> Result<(), CheckpointError> {
        if self.status.is_terminal() {
            return Err(self.terminal_error());
        }
        Ok(())
    }

    fn terminal_error(&self) -> CheckpointError {
        CheckpointError::Terminal {
            session_id: self.session_id.clone(),
            status: self.status.to_string(),
        }
    }
}

fn plan_keys(plan: &WorkPlan) -> Vec<String> {
    plan.items().iter().map(|item| item.key.clone()).collect()
}

/// 12 位十六进制会话 ID
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}
