use std::path::PathBuf;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（在打开任何会话之前拒绝，从不重试）
    #[error("输入校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 日历控件导航错误
    #[error("控件导航错误: {0}")]
    Navigation(#[from] NavigationError),
    /// 导出结果关联错误
    #[error("导出关联错误: {0}")]
    Correlation(#[from] CorrelationError),
    /// UI 驱动错误
    #[error("浏览器驱动错误: {0}")]
    Driver(#[from] DriverError),
    /// 检查点读写错误
    #[error("检查点错误: {0}")]
    Checkpoint(#[from] CheckpointError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// 是否是整个批次级别的致命错误
    ///
    /// 致命错误会把检查点置为 `error` 并终止运行；
    /// 其他错误只影响当前变体，批次继续向前推进。
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Driver(e) => e.is_fatal(),
            AppError::Checkpoint(e) => !matches!(e, CheckpointError::Terminal { .. }),
            AppError::Validation(_) | AppError::Config(_) => true,
            AppError::Navigation(_) | AppError::Correlation(_) => false,
        }
    }
}

/// 输入校验错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// 日期格式错误
    #[error("日期格式无效: '{value}'，请使用 dd/mm/yyyy")]
    InvalidDateFormat { value: String },
    /// 起始日期晚于结束日期
    #[error("起始日期 {start} 不能晚于结束日期 {end}")]
    DateRangeInverted { start: String, end: String },
    /// CUIT 无效
    #[error("{field} 无效: '{value}'（需要 11 位数字且校验位正确）")]
    InvalidCuit { field: &'static str, value: String },
    /// 密码为空
    #[error("密码不能为空")]
    EmptySecret,
    /// 目录中不存在该事项
    #[error("目录中不存在事项: {key}")]
    UnknownItem { key: String },
    /// 事项 key 重复
    #[error("事项 key 重复: {key}")]
    DuplicateKey { key: String },
    /// 事项没有任何变体
    #[error("事项 {key} 的变体列表为空")]
    EmptyVariants { key: String },
    /// 计划为空
    #[error("工作计划为空")]
    EmptyPlan,
}

/// 日历控件导航错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    /// 无法从标签中解析年月
    #[error("无法解析控件标签: '{label}'")]
    LabelParse { label: String },
    /// 超过最大步数仍未到达目标
    #[error("导航到 {target} 超时: 已移动 {max_steps} 步")]
    Timeout { target: String, max_steps: u32 },
}

/// 导出结果关联错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// 在等待预算内没有找到匹配的导出文件
    #[error("等待 {max_wait_minutes} 分钟（{attempts} 次轮询）后仍未找到标签为 '{tag}' 的导出文件")]
    Timeout {
        tag: String,
        max_wait_minutes: u64,
        attempts: u32,
    },
}

/// UI 驱动错误
#[derive(Debug, Error)]
pub enum DriverError {
    /// 元素不存在（瞬时错误）
    #[error("元素不存在: {element}")]
    ElementNotFound { element: String },
    /// 单次调用超时（瞬时错误）
    #[error("操作超时: {operation} ({element})")]
    Timeout { operation: String, element: String },
    /// 下载超时（瞬时错误）
    #[error("下载超时: {element} ({timeout_secs} 秒)")]
    DownloadTimeout { element: String, timeout_secs: u64 },
    /// 登录失败
    #[error("登录失败 (身份: {identity}): {reason}")]
    LoginFailed { identity: String, reason: String },
    /// 找不到代理的目标身份
    #[error("未找到目标身份: {target}")]
    TargetNotFound { target: String },
    /// 浏览器会话丢失
    #[error("浏览器会话丢失: {reason}")]
    SessionLost { reason: String },
    /// 文件读写失败
    #[error("文件写入失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 其他浏览器错误
    #[error("浏览器错误: {reason}")]
    Browser { reason: String },
}

impl DriverError {
    /// 可在当前步骤内有限次重试的错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DriverError::ElementNotFound { .. }
                | DriverError::Timeout { .. }
                | DriverError::DownloadTimeout { .. }
        )
    }

    /// 会话级别的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::LoginFailed { .. }
                | DriverError::TargetNotFound { .. }
                | DriverError::SessionLost { .. }
        )
    }

    pub fn element_not_found(element: impl Into<String>) -> Self {
        DriverError::ElementNotFound {
            element: element.into(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for DriverError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match err {
            CdpError::Timeout => DriverError::Timeout {
                operation: "cdp".to_string(),
                element: String::new(),
            },
            CdpError::Ws(e) => DriverError::SessionLost {
                reason: e.to_string(),
            },
            other => DriverError::Browser {
                reason: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Browser {
            reason: format!("脚本返回值解析失败: {}", err),
        }
    }
}

/// 检查点错误
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// 读写检查点文件失败
    #[error("检查点文件读写失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("检查点序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
    /// 终态记录不允许修改
    #[error("会话 {session_id} 已处于终态 ({status})，不允许修改")]
    Terminal { session_id: String, status: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 解析配置文件失败
    #[error("无法解析配置文件 {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 正则表达式编译失败
    #[error("正则表达式无效: {0}")]
    Pattern(#[from] regex::Error),
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// UI 驱动结果类型
pub type DriverResult<T> = Result<T, DriverError>;
