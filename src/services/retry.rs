//! 瞬时错误重试 - 业务能力层
//!
//! 只对 `ElementNotFound` / `Timeout` / `DownloadTimeout` 这类瞬时错误重试，
//! 其余错误立即返回。

use crate::config::RetryPolicy;
use crate::error::DriverResult;
use std::future::Future;
use tokio::time::sleep;
use tracing::warn;

/// 在有限次数内重试一个 UI 步骤
///
/// # 参数
/// - `policy`: 重试策略
/// - `what`: 步骤描述（仅用于日志）
/// - `op`: 每次调用返回一个新的 future
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> DriverResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DriverResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "⚠️ {} 失败 (尝试 {}/{}): {}，稍后重试...",
                    what, attempt, policy.max_attempts, e
                );
                if !policy.backoff.is_zero() {
                    sleep(policy.backoff).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
