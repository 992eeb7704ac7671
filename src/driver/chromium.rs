//! 基于 chromiumoxide 的 UI 驱动
//!
//! 职责：
//! - 每个会话启动独立资料目录的浏览器（或连接已有浏览器的调试端口）
//! - 所有元素操作通过 `JsExecutor` 执行，并在超时内轮询等待元素出现
//! - 下载由浏览器写入会话的下载目录，再读回内存
//!
//! 不认识税种、检查点和批次。

use crate::browser::{self, LaunchOptions};
use crate::config::Config;
use crate::driver::{ArtifactHandle, Direction, ElementRef, UiDriver, WidgetRef};
use crate::error::{DriverError, DriverResult};
use crate::infrastructure::JsExecutor;
use crate::models::identity::format_cuit;
use crate::models::Secret;
use crate::utils::logging::sanitize_secret;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, Page};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

// ========== 登录页与身份切换的页面结构 ==========

const LOGIN_USERNAME: &str = "#F1\\:username";
const LOGIN_NEXT: &str = "#F1\\:btnSiguiente";
const LOGIN_PASSWORD: &str = "#F1\\:password";
const LOGIN_SUBMIT: &str = "#F1\\:btnIngresar";
const LOGIN_ERROR: &str = "#F1\\:msg, .alert-danger, .text-danger";
/// 登录后仍停留在该地址视为失败
const LOGIN_PAGE_MARKER: &str = "login.xhtml";

const USER_MENU: &str = "#e-navbar-dropdown-toggle, a[data-bs-toggle='dropdown']";
const CHANGE_RELATION: &str =
    "#navBarMisRetenciones-dropdown-changeRelation, a[id*='dropdown-changeRelation']";
const RELATION_CUIT: &str = "h6.e-relation__text--cuit, h6";
const RELATION_CARD: &str = ".e-relation__card, .card";

const POLL_STEP: Duration = Duration::from_millis(250);
const NEW_TAB_WAIT: Duration = Duration::from_secs(8);
const PARTIAL_DOWNLOAD_SUFFIX: &str = ".crdownload";

/// 驱动配置（从 `Config` 中提取）
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub login_url: String,
    pub debug_port: Option<u16>,
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub step_timeout: Duration,
    pub ui_settle: Duration,
    /// 会话工作目录的父目录
    pub workspace_root: PathBuf,
}

impl ChromiumOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            login_url: config.login_url.clone(),
            debug_port: config.browser_debug_port,
            headless: config.headless,
            executable: config.browser_executable.clone(),
            step_timeout: config.step_timeout(),
            ui_settle: config.ui_settle(),
            workspace_root: std::env::temp_dir(),
        }
    }
}

/// 一个浏览器会话
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    /// `portal_batch_{session_id}`：资料目录 + 下载目录
    workspace: PathBuf,
    /// 浏览器由我们启动（关闭会话时一并关闭）
    owns_browser: bool,
}

/// 已登录的门户页面
#[derive(Clone)]
pub struct ChromiumPortal {
    exec: JsExecutor,
    downloads_dir: PathBuf,
}

/// chromiumoxide UI 驱动
pub struct ChromiumDriver {
    options: ChromiumOptions,
}

impl ChromiumDriver {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ChromiumOptions::from_config(config))
    }

    /// 会话的临时工作目录
    pub fn workspace_for(&self, session_id: &str) -> PathBuf {
        self.options
            .workspace_root
            .join(format!("portal_batch_{}", session_id))
    }

    fn portal_for(&self, page: Page, workspace: &Path) -> ChromiumPortal {
        ChromiumPortal {
            exec: JsExecutor::new(page, self.options.step_timeout),
            downloads_dir: workspace.join("downloads"),
        }
    }

    async fn settle(&self) {
        if !self.options.ui_settle.is_zero() {
            sleep(self.options.ui_settle).await;
        }
    }

    /// 在超时内反复执行元素脚本，直到元素出现
    ///
    /// 脚本在元素不存在时返回 `null`。页面跳转中的脚本错误按"尚未出现"处理。
    async fn wait_for_element(
        &self,
        exec: &JsExecutor,
        element: &ElementRef,
        body: &str,
        operation: &str,
    ) -> DriverResult<JsonValue> {
        self.wait_for_element_within(exec, element, body, operation, self.options.step_timeout)
            .await
    }

    async fn wait_for_element_within(
        &self,
        exec: &JsExecutor,
        element: &ElementRef,
        body: &str,
        operation: &str,
        limit: Duration,
    ) -> DriverResult<JsonValue> {
        let script = element_script(element, body)?;
        let deadline = Instant::now() + limit;

        loop {
            match exec.eval(script.as_str(), operation).await {
                Ok(JsonValue::Null) => {}
                Ok(value) => return Ok(value),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("{} {} 暂不可用: {}", operation, element, e),
            }

            if Instant::now() >= deadline {
                return Err(DriverError::element_not_found(element.to_string()));
            }
            sleep(POLL_STEP).await;
        }
    }

    async fn goto(&self, page: &Page, url: &str) -> DriverResult<()> {
        timeout(self.options.step_timeout * 2, page.goto(url))
            .await
            .map_err(|_| DriverError::Timeout {
                operation: "打开页面".to_string(),
                element: url.to_string(),
            })??;
        Ok(())
    }

    async fn current_url(&self, exec: &JsExecutor) -> DriverResult<String> {
        exec.eval_as::<String>("location.href", "读取地址").await
    }

    /// 等待离开登录页；失败时带上页面上的错误提示
    async fn wait_login_redirect(&self, exec: &JsExecutor, identity: &str) -> DriverResult<()> {
        let deadline = Instant::now() + self.options.step_timeout * 3;
        loop {
            match self.current_url(exec).await {
                Ok(url) if !url.contains(LOGIN_PAGE_MARKER) => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => {}
            }

            if Instant::now() >= deadline {
                let message = exec
                    .eval_as::<Option<String>>(
                        format!(
                            "(() => {{ const el = document.querySelector({}); \
                             return el ? el.textContent.trim() : null; }})()",
                            serde_json::to_string(LOGIN_ERROR)?
                        ),
                        "读取登录错误",
                    )
                    .await
                    .ok()
                    .flatten()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "登录后仍停留在登录页".to_string());
                return Err(DriverError::LoginFailed {
                    identity: identity.to_string(),
                    reason: message,
                });
            }
            sleep(POLL_STEP).await;
        }
    }

    fn download_snapshot(dir: &Path) -> HashSet<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
            .unwrap_or_default()
    }

    /// 清空下载目录，之前超时留下的文件（包括未完成的）不能算作本次下载
    async fn purge_downloads(dir: &Path) -> usize {
        let mut removed = 0;
        for path in Self::download_snapshot(dir) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("⚠️ 无法清理残留下载文件 {}: {}", path.display(), e),
            }
        }
        removed
    }

    /// 本次下载完成的文件；有建议文件名时优先取同名文件
    fn finished_download(
        dir: &Path,
        before: &HashSet<PathBuf>,
        suggested_name: Option<&str>,
    ) -> Option<PathBuf> {
        let fresh: Vec<PathBuf> = Self::download_snapshot(dir)
            .into_iter()
            .filter(|path| {
                !before.contains(path)
                    && !path.to_string_lossy().ends_with(PARTIAL_DOWNLOAD_SUFFIX)
            })
            .collect();

        let named = suggested_name.and_then(|name| {
            fresh
                .iter()
                .find(|path| path.file_name().is_some_and(|n| n.to_string_lossy() == name))
                .cloned()
        });
        named.or_else(|| fresh.into_iter().next())
    }
}

impl UiDriver for ChromiumDriver {
    type Session = ChromiumSession;
    type Portal = ChromiumPortal;

    async fn open_session(&self, session_id: &str) -> DriverResult<ChromiumSession> {
        let workspace = self.workspace_for(session_id);
        let downloads_dir = workspace.join("downloads");
        tokio::fs::create_dir_all(&downloads_dir)
            .await
            .map_err(|source| DriverError::Io {
                path: downloads_dir.clone(),
                source,
            })?;

        let (browser, page, handler_task, owns_browser) = match self.options.debug_port {
            Some(port) => {
                let (browser, page, task) = browser::connect_to_browser_and_page(port, None).await?;
                (browser, page, task, false)
            }
            None => {
                let options = LaunchOptions {
                    headless: self.options.headless,
                    executable: self.options.executable.clone(),
                    user_data_dir: workspace.join("profile"),
                    request_timeout: self.options.step_timeout,
                };
                let (browser, page, task) = browser::launch_browser(&options).await?;
                (browser, page, task, true)
            }
        };

        let mut params = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
        params.download_path = Some(downloads_dir.to_string_lossy().into_owned());
        browser.execute(params).await?;

        info!("✓ 浏览器会话已就绪: {}", workspace.display());
        Ok(ChromiumSession {
            browser,
            page,
            handler_task,
            workspace,
            owns_browser,
        })
    }

    async fn login(
        &self,
        session: &ChromiumSession,
        identity: &str,
        secret: &Secret,
    ) -> DriverResult<ChromiumPortal> {
        info!("🔐 正在登录 (CUIT: {})...", identity);
        self.goto(&session.page, &self.options.login_url).await?;

        let portal = self.portal_for(session.page.clone(), &session.workspace);
        self.fill_field(&portal, &ElementRef::css(LOGIN_USERNAME), identity)
            .await?;
        self.click(&portal, &ElementRef::css(LOGIN_NEXT)).await?;

        self.fill_field(&portal, &ElementRef::css(LOGIN_PASSWORD), secret.expose())
            .await
            .map_err(|e| DriverError::LoginFailed {
                identity: identity.to_string(),
                reason: sanitize_secret(
                    &format!("未出现密码输入框: {}", e),
                    secret.expose(),
                ),
            })?;
        self.click(&portal, &ElementRef::css(LOGIN_SUBMIT)).await?;

        self.wait_login_redirect(&portal.exec, identity).await?;
        info!("✓ 登录成功");
        Ok(portal)
    }

    async fn open_service(
        &self,
        session: &ChromiumSession,
        portal: &ChromiumPortal,
        tile: &ElementRef,
    ) -> DriverResult<ChromiumPortal> {
        info!("正在打开服务: {}", tile);
        let before: HashSet<String> = session
            .browser
            .pages()
            .await?
            .iter()
            .map(|p| p.target_id().inner().clone())
            .collect();

        self.click(portal, tile).await?;

        let deadline = Instant::now() + NEW_TAB_WAIT;
        while Instant::now() < deadline {
            let pages = session.browser.pages().await?;
            if let Some(page) = pages
                .into_iter()
                .find(|p| !before.contains(p.target_id().inner()))
            {
                info!("✓ 服务在新标签页中打开");
                wait_logged(
                    self.options.step_timeout,
                    "等待新标签页加载",
                    page.wait_for_navigation(),
                )
                .await;
                self.settle().await;
                return Ok(self.portal_for(page, &session.workspace));
            }
            sleep(POLL_STEP).await;
        }

        info!("服务在当前标签页中打开");
        self.settle().await;
        Ok(portal.clone())
    }

    async fn select_target(
        &self,
        portal: &ChromiumPortal,
        target_identity: &str,
    ) -> DriverResult<()> {
        let formatted = format_cuit(target_identity);
        info!("正在切换代理身份: {}", formatted);

        // 用户菜单不一定存在
        if let Err(e) = self
            .wait_for_element_within(
                &portal.exec,
                &ElementRef::css(USER_MENU),
                CLICK_BODY,
                "打开用户菜单",
                Duration::from_secs(2),
            )
            .await
        {
            debug!("用户菜单不可用: {}", e);
        }
        self.settle().await;

        self.click(portal, &ElementRef::css(CHANGE_RELATION))
            .await
            .map_err(|e| DriverError::TargetNotFound {
                target: format!("{} (身份切换菜单不可用: {})", formatted, e),
            })?;

        let card_body = format!(
            "const card = el.closest({}) || el; \
             card.scrollIntoView({{block: 'center'}}); card.click(); return true;",
            serde_json::to_string(RELATION_CARD)?
        );
        self.wait_for_element(
            &portal.exec,
            &ElementRef::with_text(RELATION_CUIT, formatted.as_str()),
            &card_body,
            "选择代理身份",
        )
        .await
        .map_err(|e| match e {
            DriverError::ElementNotFound { .. } => DriverError::TargetNotFound {
                target: formatted.clone(),
            },
            other => other,
        })?;

        self.settle().await;
        info!("✓ 已切换到 {}", formatted);
        Ok(())
    }

    async fn fill_field(
        &self,
        portal: &ChromiumPortal,
        field: &ElementRef,
        value: &str,
    ) -> DriverResult<()> {
        let body = format!(
            r#"el.focus();
            const setter = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value')?.set;
            if (setter) {{ setter.call(el, {v}); }} else {{ el.value = {v}; }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            el.blur();
            return true;"#,
            v = serde_json::to_string(value)?
        );
        self.wait_for_element(&portal.exec, field, &body, "填写").await?;
        self.settle().await;
        Ok(())
    }

    async fn click(&self, portal: &ChromiumPortal, element: &ElementRef) -> DriverResult<()> {
        self.wait_for_element(&portal.exec, element, CLICK_BODY, "点击").await?;
        self.settle().await;
        Ok(())
    }

    async fn read_text(
        &self,
        portal: &ChromiumPortal,
        element: &ElementRef,
    ) -> DriverResult<String> {
        let value = self
            .wait_for_element(&portal.exec, element, READ_BODY, "读取文本")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn advance_widget(
        &self,
        portal: &ChromiumPortal,
        widget: &WidgetRef,
        direction: Direction,
    ) -> DriverResult<()> {
        let arrow = match direction {
            Direction::Advance => &widget.advance,
            Direction::Retreat => &widget.retreat,
        };
        debug!("日历{}一步", direction);
        self.click(portal, arrow).await
    }

    async fn trigger_download(
        &self,
        portal: &ChromiumPortal,
        element: &ElementRef,
        limit: Duration,
    ) -> DriverResult<ArtifactHandle> {
        let dir = &portal.downloads_dir;
        let purged = Self::purge_downloads(dir).await;
        if purged > 0 {
            debug!("已清理 {} 个残留下载文件", purged);
        }
        let before = Self::download_snapshot(dir);

        let suggested_name = self
            .wait_for_element(&portal.exec, element, DOWNLOAD_CLICK_BODY, "下载")
            .await?
            .as_str()
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let deadline = Instant::now() + limit;
        loop {
            let finished = Self::finished_download(dir, &before, suggested_name.as_deref());
            if let Some(path) = finished {
                let bytes = tokio::fs::read(&path).await.map_err(|source| DriverError::Io {
                    path: path.clone(),
                    source,
                })?;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("⚠️ 无法清理临时下载文件 {}: {}", path.display(), e);
                }
                let suggested_name = suggested_name.or_else(|| {
                    path.file_name().map(|n| n.to_string_lossy().into_owned())
                });
                return Ok(ArtifactHandle {
                    suggested_name,
                    bytes,
                });
            }

            if Instant::now() >= deadline {
                return Err(DriverError::DownloadTimeout {
                    element: element.to_string(),
                    timeout_secs: limit.as_secs(),
                });
            }
            sleep(POLL_STEP).await;
        }
    }

    async fn save_artifact(&self, artifact: &ArtifactHandle, path: &Path) -> DriverResult<()> {
        let io_error = |source| DriverError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(path, &artifact.bytes).await.map_err(io_error)?;
        Ok(())
    }

    async fn close_session(
        &self,
        session: ChromiumSession,
        retain_workspace: bool,
    ) -> DriverResult<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
            workspace,
            owns_browser,
        } = session;

        if owns_browser {
            if let Err(e) = browser.close().await {
                warn!("⚠️ 关闭浏览器失败: {}", e);
            }
            wait_logged(self.options.step_timeout, "等待浏览器进程退出", browser.wait()).await;
        } else if let Err(e) = page.close().await {
            warn!("⚠️ 关闭页面失败: {}", e);
        }
        handler_task.abort();

        if retain_workspace {
            info!("📁 保留会话工作目录以便恢复: {}", workspace.display());
        } else if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("⚠️ 清理会话工作目录失败 {}: {}", workspace.display(), e);
            }
        } else {
            info!("🧹 已清理会话工作目录");
        }
        Ok(())
    }
}

// ========== 页面脚本 ==========

const CLICK_BODY: &str = "el.scrollIntoView({block: 'center'}); el.click(); return true;";

const READ_BODY: &str = "return (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') \
     ? el.value : (el.textContent || '');";

/// 点击下载链接内部的按钮（没有则点链接本身），返回 `download` 属性
const DOWNLOAD_CLICK_BODY: &str = "const target = el.querySelector('button') || el; \
     target.scrollIntoView({block: 'center'}); target.click(); \
     return el.getAttribute('download') || '';";

/// 在超时内等待一个不影响结果的步骤；失败或超时只记录警告
async fn wait_logged<T, E: std::fmt::Display>(
    limit: Duration,
    what: &str,
    step: impl Future<Output = Result<T, E>>,
) -> bool {
    match timeout(limit, step).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!("⚠️ {}失败: {}", what, e);
            false
        }
        Err(_) => {
            warn!("⚠️ {}超时 ({}ms)", what, limit.as_millis());
            false
        }
    }
}

/// 生成"查找元素并执行 body"的脚本；元素不存在时脚本返回 `null`
fn element_script(element: &ElementRef, body: &str) -> DriverResult<String> {
    Ok(format!(
        r#"(() => {{
            const css = {css};
            const text = {text};
            const el = Array.from(document.querySelectorAll(css))
                .find(e => text === null || (e.textContent || '').includes(text));
            if (!el) return null;
            {body}
        }})()"#,
        css = serde_json::to_string(&element.css)?,
        text = serde_json::to_string(&element.text)?,
        body = body
    ))
}
