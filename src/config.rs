use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 登录页地址
    pub login_url: String,
    /// 浏览器调试端口；设置后连接已有浏览器，而不是启动新浏览器
    pub browser_debug_port: Option<u16>,
    /// 是否无头模式
    pub headless: bool,
    /// 浏览器可执行文件路径
    pub browser_executable: Option<PathBuf>,
    /// 下载文件存放目录
    pub output_dir: PathBuf,
    /// 检查点存放目录
    pub checkpoint_dir: PathBuf,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- UI 驱动 ---
    /// 单次 UI 调用超时（毫秒）
    pub step_timeout_ms: u64,
    /// 瞬时错误的最大尝试次数
    pub retry_attempts: u32,
    /// 两次尝试之间的等待（毫秒）
    pub retry_backoff_ms: u64,
    /// 点击之后等待页面稳定（毫秒）
    pub ui_settle_ms: u64,
    /// 日历导航最大步数（不超过 36）
    pub max_navigation_steps: u32,
    // --- 导出关联 ---
    pub poll_interval_secs: u64,
    pub correlation_initial_delay_secs: u64,
    pub correlation_max_wait_minutes: u64,
    pub correlation_tolerance_minutes: i64,
    pub download_timeout_secs: u64,
    /// 自定义税种目录（TOML）
    pub catalog_file: Option<PathBuf>,
    /// 启动时删除已完成会话的检查点
    pub prune_completed_checkpoints: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login_url: "https://auth.afip.gob.ar/contribuyente_/login.xhtml".to_string(),
            browser_debug_port: None,
            headless: false,
            browser_executable: None,
            output_dir: PathBuf::from("output"),
            checkpoint_dir: PathBuf::from("output").join("checkpoints"),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            step_timeout_ms: 20_000,
            retry_attempts: 3,
            retry_backoff_ms: 1_000,
            ui_settle_ms: 500,
            max_navigation_steps: 36,
            poll_interval_secs: 10,
            correlation_initial_delay_secs: 5,
            correlation_max_wait_minutes: 10,
            correlation_tolerance_minutes: 5,
            download_timeout_secs: 30,
            catalog_file: None,
            prune_completed_checkpoints: false,
        }
    }
}

impl Config {
    /// 默认值 + 环境变量覆盖
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 读取 TOML 配置文件（`PORTAL_CONFIG`，默认 `config.toml`，不存在则跳过），再应用环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("PORTAL_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let path = Path::new(&path);
        let base = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            login_url: std::env::var("LOGIN_URL").unwrap_or(default.login_url),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").or(default.browser_debug_port),
            headless: env_parse("HEADLESS").unwrap_or(default.headless),
            browser_executable: std::env::var("BROWSER_EXECUTABLE")
                .ok()
                .map(PathBuf::from)
                .or(default.browser_executable),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.output_dir),
            checkpoint_dir: std::env::var("CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.checkpoint_dir),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            step_timeout_ms: env_parse("STEP_TIMEOUT_MS").unwrap_or(default.step_timeout_ms),
            retry_attempts: env_parse("RETRY_ATTEMPTS").unwrap_or(default.retry_attempts),
            retry_backoff_ms: env_parse("RETRY_BACKOFF_MS").unwrap_or(default.retry_backoff_ms),
            ui_settle_ms: env_parse("UI_SETTLE_MS").unwrap_or(default.ui_settle_ms),
            max_navigation_steps: env_parse("MAX_NAVIGATION_STEPS")
                .unwrap_or(default.max_navigation_steps),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS")
                .unwrap_or(default.poll_interval_secs),
            correlation_initial_delay_secs: env_parse("CORRELATION_INITIAL_DELAY_SECS")
                .unwrap_or(default.correlation_initial_delay_secs),
            correlation_max_wait_minutes: env_parse("CORRELATION_MAX_WAIT_MINUTES")
                .unwrap_or(default.correlation_max_wait_minutes),
            correlation_tolerance_minutes: env_parse("CORRELATION_TOLERANCE_MINUTES")
                .unwrap_or(default.correlation_tolerance_minutes),
            download_timeout_secs: env_parse("DOWNLOAD_TIMEOUT_SECS")
                .unwrap_or(default.download_timeout_secs),
            catalog_file: std::env::var("CATALOG_FILE")
                .ok()
                .map(PathBuf::from)
                .or(default.catalog_file),
            prune_completed_checkpoints: env_parse("PRUNE_COMPLETED_CHECKPOINTS")
                .unwrap_or(default.prune_completed_checkpoints),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn correlation_policy(&self) -> CorrelationPolicy {
        CorrelationPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            initial_delay: Duration::from_secs(self.correlation_initial_delay_secs),
            max_wait_minutes: self.correlation_max_wait_minutes,
            tolerance_minutes: self.correlation_tolerance_minutes,
            download_timeout: Duration::from_secs(self.download_timeout_secs),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn ui_settle(&self) -> Duration {
        Duration::from_millis(self.ui_settle_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// 瞬时 UI 错误的有限重试策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// 不等待，适合测试
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Config::default().retry_policy()
    }
}

/// 导出关联的轮询策略
///
/// 以配置注入，将来门户提供事件通知时可以整体替换。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrelationPolicy {
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    pub max_wait_minutes: u64,
    pub tolerance_minutes: i64,
    pub download_timeout: Duration,
}

impl CorrelationPolicy {
    /// `max_wait_minutes` 对应的轮询次数（至少 1 次）
    pub fn attempts_for(&self, max_wait_minutes: u64) -> u32 {
        let interval_secs = self.poll_interval.as_secs().max(1);
        let attempts = max_wait_minutes.saturating_mul(60) / interval_secs;
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

impl Default for CorrelationPolicy {
    fn default() -> Self {
        Config::default().correlation_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_attempts_are_six_per_minute() {
        let policy = CorrelationPolicy::default();
        assert_eq!(policy.attempts_for(10), 60);
        assert_eq!(policy.attempts_for(0), 1);
    }

    #[test]
    fn test_zero_interval_does_not_divide_by_zero() {
        let policy = CorrelationPolicy {
            poll_interval: Duration::ZERO,
            ..CorrelationPolicy::default()
        };
        assert_eq!(policy.attempts_for(1), 60);
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "headless = true\npoll_interval_secs = 15").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.headless);
        assert_eq!(config.poll_interval_secs, 15);
        assert_eq!(config.max_navigation_steps, 36);
    }

    #[test]
    fn test_from_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "headless = \"maybe\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
