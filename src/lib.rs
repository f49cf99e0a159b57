//! # OCR Batch
//!
//! 一个批量图片文字识别工具：支持本地引擎（顺序处理）和远程推理
//! 服务（并发处理）两种后端，输出带统计信息的结构化报告。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 外部引擎的薄封装，定义两个能力接口
//! - `TesseractClient` - 本地识别引擎（阻塞调用）
//! - `LlmClient` - 远程推理服务（异步调用，兼容 OpenAI API）
//!
//! ### ② 能力层（Services）
//! - `services/` - 单一职责的能力，不关心批处理流程
//! - `ImageSorter` - 排序能力（八种策略，稳定且永不失败）
//! - `PromptStore` - 提示词加载与显式缓存
//! - `ReportFormatter` - 报告渲染（纯函数，无 IO）
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批处理协调器，管理一次运行的全流程
//! - `orchestrator/offline_processor` - 顺序后端适配器
//! - `orchestrator/online_processor` - 并发后端适配器（槽位数组保序）
//!
//! ## 核心不变量
//!
//! 每张输入图片恰好产生一个结果，且 `outcomes[i].item_index == i`，
//! 与后端模式和实际完成顺序无关；单张图片的失败绝不中断整批处理。

pub mod clients;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;

// 重新导出常用类型
pub use clients::{InferenceClient, LlmClient, RecognitionEngine, TesseractClient};
pub use config::Config;
pub use error::{AppResult, OcrError};
pub use models::{
    BatchOptions, BatchOutcome, CancelToken, FailureKind, OcrMode, OcrOutcome, OfflineOptions,
    OnlineOptions, ProgressEvent, ProgressSink, ReportFormat, SortStrategy,
};
pub use orchestrator::{OcrProcessor, OfflineProcessor, OnlineProcessor};
pub use services::{
    ArtifactWriter, FsArtifactWriter, ImageSorter, PromptStore, ReportFormatter,
};
