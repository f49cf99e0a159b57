//! 外部引擎客户端层
//!
//! 批处理核心只依赖这里定义的两个接口：
//! - [`RecognitionEngine`] - 本地识别引擎（阻塞调用）
//! - [`InferenceClient`] - 远程推理服务（异步调用）
//!
//! 具体实现是对外部系统的薄封装，任何调用错误都由上层适配器
//! 按条目捕获，不会让整批处理崩溃。

pub mod llm_client;
pub mod tesseract;

use crate::error::AppResult;
use crate::models::OfflineOptions;
use std::future::Future;
use std::path::Path;

pub use llm_client::LlmClient;
pub use tesseract::TesseractClient;

/// 本地识别引擎接口
///
/// 阻塞调用，一次识别一张图片。
pub trait RecognitionEngine: Send + Sync + 'static {
    /// 识别一张图片中的文字
    fn recognize(&self, image_path: &Path, options: &OfflineOptions) -> AppResult<String>;
}

/// 远程推理服务接口
///
/// 异步调用；空白返回值是合法响应，由适配器的重试策略判定为未成功。
pub trait InferenceClient: Send + Sync + 'static {
    /// 按给定指令识别一张图片中的文字
    fn infer(
        &self,
        image_path: &Path,
        instructions: &str,
    ) -> impl Future<Output = AppResult<String>> + Send;
}
