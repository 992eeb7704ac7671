use crate::config::Config;
use crate::driver::ChromiumDriver;
use crate::models::{load_catalog, Catalog, DateRange, Secret, WorkPlan};
use crate::orchestrator::{BatchOrchestrator, BatchResult, StopSignal};
use crate::services::CheckpointStore;
use crate::utils::logging::{append_log_line, init_log_file, log_startup, print_final_stats};
use crate::workflow::ExportFlow;
use anyhow::{Context, Result};
use tracing::{error, info, warn};

/// 恢复方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeChoice {
    /// 总是新建会话
    Fresh,
    /// 恢复与本次计划匹配、最近更新的会话
    Latest,
    /// 恢复指定会话
    Session(String),
}

impl ResumeChoice {
    /// `latest` / 会话 ID / 空
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => ResumeChoice::Fresh,
            Some(v) if v.eq_ignore_ascii_case("latest") => ResumeChoice::Latest,
            Some(v) => ResumeChoice::Session(v.to_string()),
        }
    }
}

/// 一次运行的参数
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub login_identity: String,
    pub secret: Secret,
    pub target_identity: String,
    pub date_range: DateRange,
    /// 单项模式的事项 key；为空时处理整个目录
    pub item_key: Option<String>,
    pub resume: ResumeChoice,
}

impl RunRequest {
    /// 从环境变量读取运行参数
    ///
    /// `PORTAL_LOGIN_ID`、`PORTAL_SECRET`、`PORTAL_TARGET_ID`（默认同登录 CUIT）、
    /// `DATE_FROM`、`DATE_TO`、`TAX_CODE`（可选）、`RESUME`（可选）
    pub fn from_env() -> Result<Self> {
        let login_identity = required_env("PORTAL_LOGIN_ID")?;
        let secret = Secret::new(required_env("PORTAL_SECRET")?)?;
        let target_identity =
            std::env::var("PORTAL_TARGET_ID").unwrap_or_else(|_| login_identity.clone());
        let date_range = DateRange::parse(&required_env("DATE_FROM")?, &required_env("DATE_TO")?)?;
        let item_key = std::env::var("TAX_CODE").ok().filter(|v| !v.trim().is_empty());
        let resume = ResumeChoice::parse(std::env::var("RESUME").ok().as_deref());

        Ok(Self {
            login_identity: login_identity.trim().to_string(),
            secret,
            target_identity: target_identity.trim().to_string(),
            date_range,
            item_key,
            resume,
        })
    }

    /// 构建并校验工作计划
    pub fn plan(&self, catalog: &Catalog) -> Result<WorkPlan> {
        let plan = match &self.item_key {
            Some(key) => WorkPlan::single(
                catalog,
                key,
                self.date_range,
                &self.login_identity,
                &self.target_identity,
            )?,
            None => WorkPlan::batch(
                catalog,
                self.date_range,
                &self.login_identity,
                &self.target_identity,
            )?,
        };
        Ok(plan)
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("缺少环境变量 {}", name))
}

/// 应用主结构
pub struct App {
    config: Config,
    catalog: Catalog,
    store: CheckpointStore,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件 {}", config.output_log_file))?;

        let catalog = load_catalog(config.catalog_file.as_deref()).await?;
        let store = CheckpointStore::in_dir(&config.checkpoint_dir);

        if config.prune_completed_checkpoints {
            store.prune_completed()?;
        }
        if let Some(latest) = store.find_latest_resumable()? {
            info!(
                "💡 发现未完成的会话 {} (登录 {}, 代理 {}, {}, 已完成 {} 项)，设置 RESUME=latest 可继续",
                latest.session_id,
                latest.login_identity,
                latest.target_identity,
                latest.date_range,
                latest.completed_keys.len()
            );
        }

        Ok(Self {
            config,
            catalog,
            store,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(self, request: RunRequest) -> Result<BatchResult> {
        let plan = request.plan(&self.catalog)?;
        log_startup(
            &plan.login_identity,
            &plan.target_identity,
            &plan.date_range.to_string(),
        );

        let resume_id = match &request.resume {
            ResumeChoice::Fresh => None,
            ResumeChoice::Session(id) => Some(id.clone()),
            ResumeChoice::Latest => {
                let found = self.store.find_resumable(&plan)?.map(|r| r.session_id);
                if found.is_none() {
                    warn!("⚠️ 没有可恢复的会话，将新建会话");
                }
                found
            }
        };

        let flow = ExportFlow::new(&self.config)?;
        let driver = ChromiumDriver::from_config(&self.config);
        let stop = StopSignal::new();
        spawn_ctrl_c_handler(stop.clone());

        let log_file = self.config.output_log_file.clone();
        let orchestrator =
            BatchOrchestrator::new(driver, self.store, flow).with_stop_signal(stop);
        let result = orchestrator
            .run(&plan, &request.secret, resume_id.as_deref())
            .await?;

        write_summary(&log_file, &result);
        let failed = result.failed_variants();
        print_final_stats(
            result.artifact_paths.len(),
            failed.len(),
            result.status.as_str(),
            &log_file,
        );
        if result.stopped {
            warn!(
                "⏹️ 运行已停止，可用 RESUME={} 继续",
                result.session_id
            );
        }

        Ok(result)
    }
}

/// 第一次 Ctrl+C 只请求在事项之间停止
fn spawn_ctrl_c_handler(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹️ 收到 Ctrl+C，当前事项完成后停止...");
            stop.request();
        }
    });
}

fn write_summary(log_file: &str, result: &BatchResult) {
    let mut lines = vec![format!(
        "会话 {} - 状态 {} - 事项 {}/{} - 文件 {} 个",
        result.session_id,
        result.status,
        result.completed_count,
        result.total_count,
        result.artifact_paths.len()
    )];
    lines.extend(
        result
            .artifact_paths
            .iter()
            .enumerate()
            .map(|(i, path)| format!("  {}. {}", i + 1, path.display())),
    );
    lines.extend(
        result
            .failed_variants()
            .into_iter()
            .map(|(key, variant, reason)| format!("  ❌ {} {}: {}", key, variant, reason)),
    );

    for line in lines {
        if let Err(e) = append_log_line(log_file, &line) {
            error!("写入日志文件失败: {}", e);
            return;
        }
    }
}
