//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"的能力

use crate::error::{DriverError, DriverResult};
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::timeout;

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力，每次执行都带超时
/// - 不认识门户 / 税种
/// - 不处理业务流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
    step_timeout: Duration,
}

impl JsExecutor {
    pub fn new(page: Page, step_timeout: Duration) -> Self {
        Self { page, step_timeout }
    }

    /// 获取 page 的引用（用于导航等其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// # 参数
    /// - `js_code`: 要执行的 JavaScript 代码
    /// - `operation`: 操作描述，超时时写入错误
    pub async fn eval(
        &self,
        js_code: impl Into<String>,
        operation: &str,
    ) -> DriverResult<JsonValue> {
        let js_code = js_code.into();
        let result = timeout(self.step_timeout, self.page.evaluate(js_code))
            .await
            .map_err(|_| DriverError::Timeout {
                operation: operation.to_string(),
                element: String::new(),
            })??;
        Ok(result.into_value()?)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
        operation: &str,
    ) -> DriverResult<T> {
        let json_value = self.eval(js_code, operation).await?;
        Ok(serde_json::from_value(json_value)?)
    }
}
