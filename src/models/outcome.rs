//! 识别结果数据模型
//!
//! 一张图片对应一个 [`OcrOutcome`]，不多不少；整批处理对应一个
//! [`BatchOutcome`]。结果一旦由后端适配器创建即不可变，
//! 由批处理器持有直到交给报告生成器。

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// 单个图片失败原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 文件不存在
    NotFound,
    /// 不支持的图片格式
    UnsupportedFormat,
    /// 本地识别引擎报错
    EngineFailure,
    /// 远程推理服务报错
    InferenceFailure,
    /// 远程推理服务返回空白内容（重试耗尽）
    EmptyResponse,
    /// 单次调用超时（重试耗尽）
    Timeout,
    /// 批次被取消，该图片未完成处理
    Cancelled,
}

impl FailureKind {
    /// 获取分类名称（用于报告与日志）
    pub fn name(self) -> &'static str {
        match self {
            FailureKind::NotFound => "文件不存在",
            FailureKind::UnsupportedFormat => "格式不支持",
            FailureKind::EngineFailure => "引擎错误",
            FailureKind::InferenceFailure => "推理错误",
            FailureKind::EmptyResponse => "空白响应",
            FailureKind::Timeout => "超时",
            FailureKind::Cancelled => "已取消",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 单个图片的失败信息
#[derive(Debug, Clone)]
pub struct OcrFailure {
    /// 失败分类
    pub kind: FailureKind,
    /// 失败详情（引擎/服务返回的原始信息）
    pub message: String,
}

/// 单个图片的识别结果
///
/// `item_index` 是该图片在排序后输入列表中的位置，
/// 批次结果始终满足 `outcomes[i].item_index == i`。
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    /// 图片在输入列表中的位置
    pub item_index: usize,
    /// 图片路径
    pub path: PathBuf,
    /// 是否识别成功
    pub succeeded: bool,
    /// 识别出的文本（失败时为空）
    pub text: String,
    /// 失败信息（成功时为 None）
    pub failure: Option<OcrFailure>,
    /// 该图片的处理耗时
    pub duration: Duration,
}

impl OcrOutcome {
    /// 创建成功结果
    pub fn success(
        item_index: usize,
        path: impl Into<PathBuf>,
        text: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            item_index,
            path: path.into(),
            succeeded: true,
            text: text.into(),
            failure: None,
            duration,
        }
    }

    /// 创建失败结果
    pub fn failure(
        item_index: usize,
        path: impl Into<PathBuf>,
        kind: FailureKind,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            item_index,
            path: path.into(),
            succeeded: false,
            text: String::new(),
            failure: Some(OcrFailure {
                kind,
                message: message.into(),
            }),
            duration,
        }
    }

    /// 获取文件显示名（不含目录部分）
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

/// 整批处理的汇总结果
#[derive(Debug)]
pub struct BatchOutcome {
    /// 按输入顺序排列的各图片结果
    pub outcomes: Vec<OcrOutcome>,
    /// 图片总数
    pub total: usize,
    /// 成功数量
    pub succeeded_count: usize,
    /// 整批耗时
    pub elapsed: Duration,
    /// 批次完成时间（报告中的所有时间戳均取自此处）
    pub finished_at: DateTime<Local>,
    /// 报告写出路径
    pub artifact_path: Option<PathBuf>,
}

/// 处理进度事件
///
/// `completed` 单调递增；`label` 指向刚完成的图片，
/// 并发模式下与索引顺序无关。
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// 已完成数量
    pub completed: usize,
    /// 总数量
    pub total: usize,
    /// 刚完成图片的显示名
    pub label: String,
}

/// 进度接收器
///
/// 即发即弃，调用方不等待；每次运行只允许注册一个。
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// 从路径提取显示名
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
