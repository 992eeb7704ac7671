//! 进入门户 - 流程层
//!
//! 登录 → 打开服务 → 切换代理身份。
//! 这里的任何失败都会让整个批次无法继续，由编排层作为致命错误处理。

use crate::driver::{ElementRef, UiDriver};
use crate::error::{AppResult, DriverError};
use crate::models::{Secret, WorkPlan};
use crate::utils::logging::sanitize_secret;
use crate::workflow::selectors;
use tracing::info;

/// 在已打开的会话中进入目标服务，返回可以开始查询的页面
pub async fn enter_portal<D: UiDriver>(
    driver: &D,
    session: &D::Session,
    plan: &WorkPlan,
    secret: &Secret,
) -> AppResult<D::Portal> {
    let home = driver
        .login(session, &plan.login_identity, secret)
        .await
        .map_err(|e| redact_login_error(e, &plan.login_identity, secret))?;

    let portal = driver
        .open_service(session, &home, &ElementRef::css(selectors::SERVICE_TILE))
        .await?;

    driver.select_target(&portal, &plan.target_identity).await?;

    info!(
        "✓ 已进入门户 (登录 {}, 代理 {})",
        plan.login_identity, plan.target_identity
    );
    Ok(portal)
}

/// 登录阶段的任何失败都视为登录失败，错误信息中不能出现密码
fn redact_login_error(err: DriverError, identity: &str, secret: &Secret) -> DriverError {
    match err {
        DriverError::SessionLost { reason } => DriverError::SessionLost {
            reason: sanitize_secret(&reason, secret.expose()),
        },
        DriverError::LoginFailed { identity, reason } => DriverError::LoginFailed {
            identity,
            reason: sanitize_secret(&reason, secret.expose()),
        },
        other => DriverError::LoginFailed {
            identity: identity.to_string(),
            reason: sanitize_secret(&other.to_string(), secret.expose()),
        },
    }
}
