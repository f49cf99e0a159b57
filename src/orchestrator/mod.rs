//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批处理协调器
//! - 校验运行参数（非法值直接拒绝）
//! - 调用排序服务确定处理顺序
//! - 按模式选择后端适配器并驱动它
//! - 转发进度事件、汇总统计、生成并写出报告
//!
//! ### `offline_processor` - 顺序后端适配器
//! - 驱动本地识别引擎逐张处理
//! - 单线程，处理完一张再开始下一张
//!
//! ### `online_processor` - 并发后端适配器
//! - 固定大小的工作池 + 原子计数器认领任务
//! - 预分配槽位数组保证输出顺序
//! - 每张图片独立的重试 / 超时 / 取消处理
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (一次批处理运行)
//!     ↓
//! offline_processor / online_processor (处理 Vec<PathBuf>)
//!     ↓
//! clients (能力接口：本地引擎 / 远程推理)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：协调器管流程，适配器管单个后端
//! 2. **顺序不变量**：任何模式下 `outcomes[i].item_index == i`
//! 3. **失败隔离**：单张图片失败只影响该图片，整批错误才向外传播

pub mod batch_processor;
pub mod offline_processor;
pub mod online_processor;

// 重新导出主要类型
pub use batch_processor::{failure_breakdown, OcrProcessor};
pub use offline_processor::OfflineProcessor;
pub use online_processor::OnlineProcessor;
