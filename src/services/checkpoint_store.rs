//! 检查点存储 - 业务能力层
//!
//! 职责：
//! - 每个会话一个 JSON 文件：`checkpoint_{session_id}.json`
//! - 写入是原子的（先写临时文件再 rename），中途崩溃不会留下半截记录
//! - 按身份 + 日期范围查找可恢复的会话
//!
//! 存储后端以 `CheckpointStorage` trait 抽象，编排层只依赖 `CheckpointStore`。

use crate::error::CheckpointError;
use crate::models::{CheckpointRecord, WorkPlan};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "checkpoint_";
const FILE_SUFFIX: &str = ".json";

/// 检查点存储后端
pub trait CheckpointStorage {
    /// 读取原始内容；不存在时返回 `None`
    fn read(&self, session_id: &str) -> Result<Option<String>, CheckpointError>;

    /// 原子地替换整条记录
    fn write(&self, session_id: &str, contents: &str) -> Result<(), CheckpointError>;

    /// 列出所有会话 ID
    fn list(&self) -> Result<Vec<String>, CheckpointError>;

    fn remove(&self, session_id: &str) -> Result<(), CheckpointError>;
}

/// 基于文件系统的存储
#[derive(Debug, Clone)]
pub struct FsCheckpointStorage {
    dir: PathBuf,
}

impl FsCheckpointStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 检查点文件路径
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, session_id, FILE_SUFFIX))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
        move |source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl CheckpointStorage for FsCheckpointStorage {
    fn read(&self, session_id: &str) -> Result<Option<String>, CheckpointError> {
        let path = self.path_for(session_id);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path)(e)),
        }
    }

    fn write(&self, session_id: &str, contents: &str) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        let path = self.path_for(session_id);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, contents).map_err(Self::io_error(&tmp_path))?;
        std::fs::rename(&tmp_path, &path).map_err(Self::io_error(&path))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir)(e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Self::io_error(&self.dir))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn remove(&self, session_id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(session_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path)(e)),
        }
    }
}

/// 检查点存储
pub struct CheckpointStore<S = FsCheckpointStorage> {
    storage: S,
}

impl CheckpointStore<FsCheckpointStorage> {
    /// 在目录中存储检查点
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(FsCheckpointStorage::new(dir))
    }
}

impl<S: CheckpointStorage> CheckpointStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// 刷新 `last_updated_at` 并整体写入
    pub fn save(&self, record: &mut CheckpointRecord) -> Result<(), CheckpointError> {
        record.touch();
        let json = serde_json::to_string_pretty(record)?;
        self.storage.write(&record.session_id, &json)?;
        debug!(
            "💾 检查点已保存: {} (已完成 {} 项, 状态 {})",
            record.session_id,
            record.completed_keys.len(),
            record.status
        );
        Ok(())
    }

    /// 读取记录；不存在或内容损坏时返回 `None`
    pub fn load(&self, session_id: &str) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let Some(contents) = self.storage.read(session_id)? else {
            return Ok(None);
        };
        match serde_json::from_str(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("⚠️ 检查点 {} 内容损坏，已忽略: {}", session_id, e);
                Ok(None)
            }
        }
    }

    /// 所有可读取的记录，按最后更新时间倒序
    pub fn list_records(&self) -> Result<Vec<CheckpointRecord>, CheckpointError> {
        let mut records = Vec::new();
        for id in self.storage.list()? {
            if let Some(record) = self.load(&id)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(records)
    }

    /// 查找与计划匹配、最近更新的可恢复会话
    pub fn find_resumable(
        &self,
        plan: &WorkPlan,
    ) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let found = self
            .list_records()?
            .into_iter()
            .find(|r| r.status.is_resumable() && r.matches_plan(plan));
        if let Some(record) = &found {
            info!(
                "📂 找到可恢复的会话 {} (状态 {}, 已完成 {} 项)",
                record.session_id,
                record.status,
                record.completed_keys.len()
            );
        }
        Ok(found)
    }

    /// 最近更新的可恢复会话（不限身份与日期）
    pub fn find_latest_resumable(&self) -> Result<Option<CheckpointRecord>, CheckpointError> {
        Ok(self
            .list_records()?
            .into_iter()
            .find(|r| r.status.is_resumable()))
    }

    /// 删除已完成会话的检查点，返回删除数量
    pub fn prune_completed(&self) -> Result<usize, CheckpointError> {
        let mut removed = 0;
        for record in self.list_records()? {
            if record.status == crate::models::BatchStatus::Completed {
                self.storage.remove(&record.session_id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("🧹 已清理 {} 个已完成的检查点", removed);
        }
        Ok(removed)
    }
}
