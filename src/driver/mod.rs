//! UI 驱动接口
//!
//! 核心流程只依赖这里的 `UiDriver` 能力，不认识具体的自动化工具。
//! 所有调用都显式携带会话 / 页面句柄，不存在全局单例。
//!
//! - `chromium` - 基于 chromiumoxide 的实现

pub mod chromium;

use crate::error::DriverResult;
use crate::models::Secret;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub use chromium::ChromiumDriver;

/// 元素引用：CSS 选择器 + 可选的可见文本过滤
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub css: String,
    pub text: Option<String>,
}

impl ElementRef {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    /// 匹配 css 且文本包含 `text` 的第一个元素
    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: Some(text.into()),
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} (文本: '{}')", self.css, text),
            None => f.write_str(&self.css),
        }
    }
}

/// 只能相对移动的序数控件（例如日历）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetRef {
    /// 显示当前位置的标签
    pub label: ElementRef,
    /// 后退按钮
    pub retreat: ElementRef,
    /// 前进按钮
    pub advance: ElementRef,
}

/// 移动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Advance,
    Retreat,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Advance => f.write_str("前进"),
            Direction::Retreat => f.write_str("后退"),
        }
    }
}

/// 下载得到的文件
#[derive(Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    /// 门户建议的文件名（`a[download]` 属性）
    pub suggested_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactHandle")
            .field("suggested_name", &self.suggested_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// UI 驱动能力
///
/// 每个调用都可能阻塞在外部的慢操作上，实现方负责为每次调用加超时。
#[allow(async_fn_in_trait)]
pub trait UiDriver {
    /// 浏览器会话（独占的临时工作目录）
    type Session;
    /// 已登录的门户页面
    type Portal;

    async fn open_session(&self, session_id: &str) -> DriverResult<Self::Session>;

    async fn login(
        &self,
        session: &Self::Session,
        identity: &str,
        secret: &Secret,
    ) -> DriverResult<Self::Portal>;

    /// 打开门户首页上的某个服务（可能在新标签页中打开）
    async fn open_service(
        &self,
        session: &Self::Session,
        portal: &Self::Portal,
        tile: &ElementRef,
    ) -> DriverResult<Self::Portal>;

    async fn select_target(&self, portal: &Self::Portal, target_identity: &str)
        -> DriverResult<()>;

    async fn fill_field(
        &self,
        portal: &Self::Portal,
        field: &ElementRef,
        value: &str,
    ) -> DriverResult<()>;

    async fn click(&self, portal: &Self::Portal, element: &ElementRef) -> DriverResult<()>;

    async fn read_text(&self, portal: &Self::Portal, element: &ElementRef)
        -> DriverResult<String>;

    async fn advance_widget(
        &self,
        portal: &Self::Portal,
        widget: &WidgetRef,
        direction: Direction,
    ) -> DriverResult<()>;

    async fn trigger_download(
        &self,
        portal: &Self::Portal,
        element: &ElementRef,
        timeout: Duration,
    ) -> DriverResult<ArtifactHandle>;

    async fn save_artifact(&self, artifact: &ArtifactHandle, path: &Path) -> DriverResult<()>;

    /// 关闭会话；`retain_workspace` 为 true 时保留临时工作目录以便恢复
    async fn close_session(&self, session: Self::Session, retain_workspace: bool)
        -> DriverResult<()>;
}
