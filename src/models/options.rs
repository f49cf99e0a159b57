//! 批处理选项与枚举
//!
//! 排序策略、处理模式、报告格式的注册表，以及两种后端的参数结构。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    /// 本地引擎，逐张顺序处理
    Offline,
    /// 远程推理服务，并发处理
    Online,
}

impl OcrMode {
    /// 从名称解析模式
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "offline" => Some(OcrMode::Offline),
            "online" => Some(OcrMode::Online),
            _ => None,
        }
    }

    /// 获取模式名称
    pub fn name(self) -> &'static str {
        match self {
            OcrMode::Offline => "offline",
            OcrMode::Online => "online",
        }
    }
}

/// 图片排序策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStrategy {
    /// 自然排序（识别文件名中的数字）
    Natural,
    /// 按文件名字母排序
    Alphabetical,
    /// 按文件名字母倒序
    ReverseAlphabetical,
    /// 按创建时间升序
    CreationTime,
    /// 按修改时间升序
    ModificationTime,
    /// 按文件大小升序
    FileSize,
    /// 按文件大小降序
    FileSizeDesc,
    /// 随机打乱
    Random,
}

impl SortStrategy {
    /// 所有可用策略
    pub fn all() -> &'static [SortStrategy] {
        &[
            SortStrategy::Natural,
            SortStrategy::Alphabetical,
            SortStrategy::ReverseAlphabetical,
            SortStrategy::CreationTime,
            SortStrategy::ModificationTime,
            SortStrategy::FileSize,
            SortStrategy::FileSizeDesc,
            SortStrategy::Random,
        ]
    }

    /// 从名称解析策略
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "natural" => Some(SortStrategy::Natural),
            "alphabetical" => Some(SortStrategy::Alphabetical),
            "reverse_alphabetical" => Some(SortStrategy::ReverseAlphabetical),
            "creation_time" => Some(SortStrategy::CreationTime),
            "modification_time" => Some(SortStrategy::ModificationTime),
            "file_size" => Some(SortStrategy::FileSize),
            "file_size_desc" => Some(SortStrategy::FileSizeDesc),
            "random" => Some(SortStrategy::Random),
            _ => None,
        }
    }

    /// 获取策略名称
    pub fn name(self) -> &'static str {
        match self {
            SortStrategy::Natural => "natural",
            SortStrategy::Alphabetical => "alphabetical",
            SortStrategy::ReverseAlphabetical => "reverse_alphabetical",
            SortStrategy::CreationTime => "creation_time",
            SortStrategy::ModificationTime => "modification_time",
            SortStrategy::FileSize => "file_size",
            SortStrategy::FileSizeDesc => "file_size_desc",
            SortStrategy::Random => "random",
        }
    }

    /// 获取策略说明
    pub fn description(self) -> &'static str {
        match self {
            SortStrategy::Natural => "自然排序（识别文件名中的数字）",
            SortStrategy::Alphabetical => "按文件名字母排序",
            SortStrategy::ReverseAlphabetical => "按文件名字母倒序",
            SortStrategy::CreationTime => "按创建时间排序（旧 → 新）",
            SortStrategy::ModificationTime => "按修改时间排序（旧 → 新）",
            SortStrategy::FileSize => "按文件大小排序（小 → 大）",
            SortStrategy::FileSizeDesc => "按文件大小排序（大 → 小）",
            SortStrategy::Random => "随机打乱",
        }
    }
}

/// 报告格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// 完整格式（统计信息 + 逐张详情）
    Detailed,
    /// 简单格式（基本信息 + 文本）
    Simple,
    /// 纯文本格式（只保留识别文本）
    Clean,
}

impl ReportFormat {
    /// 从名称解析格式
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "detailed" => Some(ReportFormat::Detailed),
            "simple" => Some(ReportFormat::Simple),
            "clean" => Some(ReportFormat::Clean),
            _ => None,
        }
    }

    /// 获取格式名称
    pub fn name(self) -> &'static str {
        match self {
            ReportFormat::Detailed => "detailed",
            ReportFormat::Simple => "simple",
            ReportFormat::Clean => "clean",
        }
    }
}

/// 本地引擎处理参数
#[derive(Debug, Clone)]
pub struct OfflineOptions {
    /// OCR 语言代码（如 "chi_sim"、"eng"）
    pub language: String,
    /// Tesseract 页面分割模式
    pub psm_mode: u32,
    /// Tesseract 引擎模式
    pub oem_mode: u32,
}

impl Default for OfflineOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            psm_mode: 3,
            oem_mode: 3,
        }
    }
}

/// 远程推理处理参数
#[derive(Debug, Clone)]
pub struct OnlineOptions {
    /// 提示词名称
    pub prompt_name: String,
    /// 最大并发数
    pub max_concurrency: usize,
    /// 单次调用超时
    pub timeout: Duration,
    /// 首次尝试之外的重试次数（0 表示只尝试一次）
    pub retry_limit: u32,
    /// 重试退避基准时长（第 n 次失败后等待 n * base）
    pub retry_base_delay: Duration,
}

impl Default for OnlineOptions {
    fn default() -> Self {
        Self {
            prompt_name: "classic_ocr".to_string(),
            max_concurrency: 5,
            timeout: Duration::from_secs(30),
            retry_limit: 2,
            retry_base_delay: Duration::from_secs(2),
        }
    }
}

/// 一次批处理运行的全部参数
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// 处理模式
    pub mode: OcrMode,
    /// 排序策略
    pub sort_strategy: SortStrategy,
    /// 本地引擎参数
    pub offline: OfflineOptions,
    /// 远程推理参数
    pub online: OnlineOptions,
    /// 报告格式
    pub report_format: ReportFormat,
    /// 报告是否包含元数据
    pub include_metadata: bool,
    /// 报告输出路径（由调用方解析好再传入）
    pub output_file: PathBuf,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            mode: OcrMode::Offline,
            sort_strategy: SortStrategy::Natural,
            offline: OfflineOptions::default(),
            online: OnlineOptions::default(),
            report_format: ReportFormat::Detailed,
            include_metadata: true,
            output_file: PathBuf::from("ocr_result.txt"),
        }
    }
}

/// 协作式取消令牌
///
/// 设置后已开始的调用允许跑完，但不再开始新的尝试或重试；
/// 尚未调度的图片立即得到"已取消"结果。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// 创建新令牌
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出取消信号
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// 查询是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
