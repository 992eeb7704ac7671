use crate::error::{DriverError, DriverResult};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 启动参数
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    /// 会话独占的浏览器资料目录
    pub user_data_dir: PathBuf,
    pub request_timeout: Duration,
}

/// 启动一个使用独立资料目录的浏览器并打开空白页
pub async fn launch_browser(
    options: &LaunchOptions,
) -> DriverResult<(Browser, Page, JoinHandle<()>)> {
    info!(
        "🚀 启动浏览器 ({})...",
        if options.headless { "无头模式" } else { "有界面模式" }
    );
    debug!("资料目录: {}", options.user_data_dir.display());

    let mut builder = BrowserConfig::builder()
        .user_data_dir(&options.user_data_dir)
        .request_timeout(options.request_timeout)
        .args(vec![
            "--disable-gpu",
            "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
            "--disable-dev-shm-usage", // 防止共享内存不足
            "--window-size=1400,900",
        ]);
    builder = if options.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &options.executable {
        builder = builder.chrome_executable(executable);
    }

    let config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        DriverError::Browser {
            reason: format!("配置浏览器失败: {}", e),
        }
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        DriverError::Browser {
            reason: format!("启动浏览器失败: {}", e),
        }
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handler_task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建页面失败: {}", e);
        e
    })?;

    info!("✅ 浏览器已启动");
    Ok((browser, page, handler_task))
}
