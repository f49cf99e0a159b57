//! 统一错误类型
//!
//! 仅用于"整批失败"级别的错误：配置校验、客户端初始化、提示词加载、
//! 报告写出等。单个图片的识别失败不走这里，而是记录在
//! [`crate::models::OcrOutcome`] 的失败信息中，批次始终正常返回。

use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum OcrError {
    /// 配置校验失败（并发数、超时、必填项等）
    #[error("配置错误: {0}")]
    Config(String),

    /// 目录不存在或不是目录
    #[error("目录无效: {path}")]
    InvalidDirectory { path: String },

    /// 提示词不存在或无法加载
    #[error("提示词 '{name}' 加载失败: {reason}")]
    PromptLoad { name: String, reason: String },

    /// 本地识别引擎不可用（如 tesseract 不在 PATH 中）
    #[error("识别引擎不可用: {reason}")]
    EngineUnavailable { reason: String },

    /// 外部命令执行失败
    #[error("命令 '{command}' 执行失败: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// 语言包下载失败
    #[error("语言包 '{language}' 下载失败: {reason}")]
    LanguageDownload { language: String, reason: String },

    /// 报告写出失败
    #[error("写入文件失败 ({path})")]
    ArtifactWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 文件读取失败
    #[error("读取文件失败 ({path})")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 远程推理服务调用失败（适配器内部按条目捕获，通常不会向外传播）
    #[error("推理服务调用失败: {0}")]
    Inference(String),

    /// 其他错误（包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, OcrError>;
