//! # Retenciones Export
//!
//! 一个用于批量导出"Mis Retenciones"查询结果的 Rust 应用程序，支持中断后恢复
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure / Driver）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供带超时的 eval() 能力
//! - `driver/` - `UiDriver` 能力接口与 chromiumoxide 实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不认识批次
//! - `PositionFinder` - 只能前进/后退的日历控件定位
//! - `ExportCorrelator` - 在共享导出列表中找到"我们的"文件
//! - `CheckpointStore` - 会话进度的原子持久化
//! - `with_retry` - 瞬时错误的有限重试
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个查询"的完整处理流程
//! - `enter_portal` - 登录 → 打开服务 → 切换代理身份
//! - `ExportFlow` - 表单 → 查询 → 导出 → 关联 → 保存
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_orchestrator` - 批次编排，唯一的检查点写者
//! - `orchestrator/item_processor` - 单个事项处理器，遍历变体
//!
//! ## 模块结构

pub mod app;
pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::{App, ResumeChoice, RunRequest};
pub use config::Config;
pub use driver::{ChromiumDriver, UiDriver};
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{Catalog, CheckpointRecord, DateRange, Secret, WorkItem, WorkPlan};
pub use orchestrator::{BatchOrchestrator, BatchResult, ItemOutcome, StopSignal, VariantOutcome};
pub use services::{CheckpointStore, ExportCorrelator, PositionFinder};
pub use workflow::ExportFlow;
