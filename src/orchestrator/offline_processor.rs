//! 离线批处理器 - 顺序后端适配器
//!
//! ## 职责
//!
//! 驱动本地识别引擎逐张处理图片：单线程、无并发，
//! 每张图片处理完立即发出一个进度事件。
//!
//! 单张图片的任何失败（文件缺失、格式不支持、引擎报错）都只记录在
//! 该图片的结果里，绝不中断整批处理。

use crate::clients::RecognitionEngine;
use crate::models::{
    display_name, CancelToken, FailureKind, OcrOutcome, OfflineOptions, ProgressEvent,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

/// 离线批处理器
pub struct OfflineProcessor<E> {
    engine: Arc<E>,
    /// 支持的图片扩展名（小写，含点）
    supported_formats: Vec<String>,
}

impl<E> Clone for OfflineProcessor<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            supported_formats: self.supported_formats.clone(),
        }
    }
}

impl<E: RecognitionEngine> OfflineProcessor<E> {
    /// 创建离线批处理器
    pub fn new(engine: Arc<E>, supported_formats: Vec<String>) -> Self {
        Self {
            engine,
            supported_formats,
        }
    }

    /// 逐张顺序处理图片列表
    ///
    /// 每张图片恰好产生一个结果，`outcomes[i].item_index == i`；
    /// 取消信号生效后，剩余图片立即得到"已取消"结果。
    pub fn process_batch(
        &self,
        image_paths: &[PathBuf],
        options: &OfflineOptions,
        progress: &UnboundedSender<ProgressEvent>,
        cancel: &CancelToken,
    ) -> Vec<OcrOutcome> {
        let total = image_paths.len();
        info!("开始离线处理 {} 张图片 (语言: {})", total, options.language);

        let mut outcomes = Vec::with_capacity(total);
        for (index, path) in image_paths.iter().enumerate() {
            let outcome = if cancel.is_cancelled() {
                OcrOutcome::failure(
                    index,
                    path.clone(),
                    FailureKind::Cancelled,
                    "批次已取消，未开始处理",
                    Duration::ZERO,
                )
            } else {
                self.process_item(index, path, options)
            };

            let _ = progress.send(ProgressEvent {
                completed: index + 1,
                total,
                label: display_name(path),
            });
            outcomes.push(outcome);
        }

        let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
        info!("离线处理完成: 成功 {}/{}", succeeded, total);
        outcomes
    }

    /// 处理单张图片
    fn process_item(&self, index: usize, path: &Path, options: &OfflineOptions) -> OcrOutcome {
        let started = Instant::now();

        if !path.exists() {
            error!("文件不存在: {}", path.display());
            return OcrOutcome::failure(
                index,
                path,
                FailureKind::NotFound,
                format!("文件不存在: {}", path.display()),
                started.elapsed(),
            );
        }

        if !self.is_supported(path) {
            error!("不支持的图片格式: {}", path.display());
            return OcrOutcome::failure(
                index,
                path,
                FailureKind::UnsupportedFormat,
                format!("不支持的图片格式: {}", extension_of(path)),
                started.elapsed(),
            );
        }

        match self.engine.recognize(path, options) {
            Ok(text) => {
                let duration = started.elapsed();
                debug!(
                    "{} 处理完成，耗时 {:.2}秒，识别 {} 字符",
                    path.display(),
                    duration.as_secs_f64(),
                    text.chars().count()
                );
                OcrOutcome::success(index, path, text.trim().to_string(), duration)
            }
            Err(e) => {
                error!("引擎处理 {} 失败: {}", path.display(), e);
                OcrOutcome::failure(
                    index,
                    path,
                    FailureKind::EngineFailure,
                    e.to_string(),
                    started.elapsed(),
                )
            }
        }
    }

    fn is_supported(&self, path: &Path) -> bool {
        let ext = extension_of(path);
        !ext.is_empty() && self.supported_formats.iter().any(|f| f == &ext)
    }
}

/// 提取小写、带点的扩展名；没有扩展名时返回空串
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("a/b/c.PNG")), ".png");
        assert_eq!(extension_of(Path::new("c.jpeg")), ".jpeg");
        assert_eq!(extension_of(Path::new("noext")), "");
    }
}
