//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度和进度持久化，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_orchestrator` - 批次编排器
//! - 恢复或新建会话（CheckpointRecord）
//! - 打开 / 关闭浏览器会话，进入门户
//! - 按顺序处理事项（Vec<WorkItem>），跳过已完成的事项
//! - 致命错误时保存 `error` 状态，保留工作目录
//!
//! ### `item_processor` - 单个事项处理器
//! - 遍历单个事项的所有变体（Vec<Variant>）
//! - 复用 ExportFlow
//! - 每个文件下载后立即写检查点
//! - 非致命失败只记录，不中断批次
//!
//! ## 层次关系
//!
//! ```text
//! batch_orchestrator (处理 WorkPlan)
//!     ↓
//! item_processor (处理 Vec<Variant>)
//!     ↓
//! workflow::ExportFlow (处理单个 Variant)
//!     ↓
//! services (能力层：position_finder / export_correlator / checkpoint_store)
//!     ↓
//! driver (UiDriver：chromium / 测试用的假驱动)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_orchestrator 管会话与检查点，item_processor 管变体
//! 2. **单一写者**：只有编排层写检查点
//! 3. **向下依赖**：编排层 → workflow → services → driver
//! 4. **无页面细节**：只做调度和统计，不认识选择器

pub mod batch_orchestrator;
pub mod item_processor;

// 重新导出主要类型
pub use batch_orchestrator::{BatchOrchestrator, BatchResult, ItemOutcome, StopSignal};
pub use item_processor::{process_item, VariantOutcome};
