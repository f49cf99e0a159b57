//! 在线批处理器 - 并发后端适配器
//!
//! ## 职责
//!
//! 通过远程推理服务并发处理图片，同时保证输出顺序与输入一致：
//!
//! 1. 按输入数量预分配结果槽位，完成顺序不影响输出顺序
//! 2. 固定数量的工作任务从原子计数器认领下一个未处理的下标
//! 3. 每张图片独立的重试循环：线性退避、单次调用超时、
//!    空白响应视为未成功
//! 4. 工作任务把最终结果连同下标发到聚合通道，由聚合方写入对应
//!    槽位并发出单调递增的进度事件
//! 5. 取消是协作式的：每次尝试前和退避等待前检查标志，已开始的
//!    调用允许跑完，未调度的图片立即得到"已取消"结果
//!
//! 槽位数组只归聚合方所有，工作任务之间唯一的竞争点是认领计数器。

use crate::clients::InferenceClient;
use crate::models::{
    CancelToken, FailureKind, OcrOutcome, OnlineOptions, ProgressEvent,
};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// 在线批处理器
pub struct OnlineProcessor<C> {
    client: Arc<C>,
}

impl<C> Clone for OnlineProcessor<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: InferenceClient> OnlineProcessor<C> {
    /// 创建在线批处理器
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// 并发处理图片列表
    ///
    /// 返回结果与输入等长，且 `outcomes[i].item_index == i`，
    /// 与各图片的实际完成先后无关。
    pub async fn process_batch(
        &self,
        image_paths: &[PathBuf],
        prompt_text: &str,
        options: &OnlineOptions,
        progress: UnboundedSender<ProgressEvent>,
        cancel: CancelToken,
    ) -> Vec<OcrOutcome> {
        let total = image_paths.len();
        if total == 0 {
            return Vec::new();
        }

        let worker_count = options.max_concurrency.min(total).max(1);
        info!(
            "开始在线处理 {} 张图片，并发 {} (超时 {:.0}秒, 重试 {} 次)",
            total,
            worker_count,
            options.timeout.as_secs_f64(),
            options.retry_limit
        );

        let paths = Arc::new(image_paths.to_vec());
        let prompt = Arc::new(prompt_text.to_string());
        let options = Arc::new(options.clone());
        // 工作任务间唯一的共享可变状态：下一个待认领的下标
        let next_index = Arc::new(AtomicUsize::new(0));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<OcrOutcome>();

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let client = Arc::clone(&self.client);
            let paths = Arc::clone(&paths);
            let prompt = Arc::clone(&prompt);
            let options = Arc::clone(&options);
            let next_index = Arc::clone(&next_index);
            let cancel = cancel.clone();
            let result_tx = result_tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let index = next_index.fetch_add(1, Ordering::SeqCst);
                    if index >= paths.len() {
                        break;
                    }

                    let path = &paths[index];
                    let outcome = if cancel.is_cancelled() {
                        OcrOutcome::failure(
                            index,
                            path.clone(),
                            FailureKind::Cancelled,
                            "批次已取消，未开始处理",
                            Duration::ZERO,
                        )
                    } else {
                        process_item(client.as_ref(), index, path, &prompt, &options, &cancel)
                            .await
                    };

                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        // 聚合：槽位数组按下标写入，进度计数单调递增
        let mut slots: Vec<Option<OcrOutcome>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;
        while let Some(outcome) = result_rx.recv().await {
            completed += 1;
            let _ = progress.send(ProgressEvent {
                completed,
                total,
                label: outcome.file_name(),
            });
            let item_index = outcome.item_index;
            slots[item_index] = Some(outcome);
        }

        join_all(handles).await;

        // 工作任务 panic 时槽位可能缺失，兜底补一个失败结果
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                warn!("图片 {} 的结果缺失，记录为失败", paths[index].display());
                *slot = Some(OcrOutcome::failure(
                    index,
                    paths[index].clone(),
                    FailureKind::InferenceFailure,
                    "结果缺失：处理任务异常退出",
                    Duration::ZERO,
                ));
            }
        }
        let outcomes: Vec<OcrOutcome> = slots.into_iter().flatten().collect();

        let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
        info!("在线处理完成: 成功 {}/{}", succeeded, total);
        outcomes
    }

    /// 估算处理耗时（基于经验均值，每张不低于 2 秒）
    pub fn estimate_processing_time(
        &self,
        image_count: usize,
        options: &OnlineOptions,
    ) -> Duration {
        if image_count == 0 {
            return Duration::ZERO;
        }
        let avg_per_image = 5.0;
        let parallel_factor =
            options.max_concurrency.min(image_count) as f64 / image_count as f64;
        let estimated = image_count as f64 * avg_per_image * parallel_factor;
        Duration::from_secs_f64(estimated.max(image_count as f64 * 2.0))
    }
}

/// 处理单张图片：重试循环 + 单次调用超时 + 协作式取消
async fn process_item<C: InferenceClient>(
    client: &C,
    index: usize,
    path: &Path,
    prompt: &str,
    options: &OnlineOptions,
    cancel: &CancelToken,
) -> OcrOutcome {
    let started = Instant::now();

    if !path.exists() {
        return OcrOutcome::failure(
            index,
            path,
            FailureKind::NotFound,
            format!("文件不存在: {}", path.display()),
            started.elapsed(),
        );
    }

    let total_attempts = options.retry_limit + 1;
    let mut last_failure = (FailureKind::InferenceFailure, String::new());

    for attempt in 1..=total_attempts {
        if cancel.is_cancelled() {
            return OcrOutcome::failure(
                index,
                path,
                FailureKind::Cancelled,
                "批次已取消",
                started.elapsed(),
            );
        }

        match timeout(options.timeout, client.infer(path, prompt)).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                if !text.is_empty() {
                    let duration = started.elapsed();
                    debug!(
                        "{} 处理完成，耗时 {:.2}秒 (第 {} 次尝试)，识别 {} 字符",
                        path.display(),
                        duration.as_secs_f64(),
                        attempt,
                        text.chars().count()
                    );
                    return OcrOutcome::success(index, path, text.to_string(), duration);
                }
                last_failure = (
                    FailureKind::EmptyResponse,
                    "服务返回空白内容".to_string(),
                );
            }
            Ok(Err(e)) => {
                last_failure = (FailureKind::InferenceFailure, e.to_string());
            }
            Err(_) => {
                last_failure = (
                    FailureKind::Timeout,
                    format!("单次调用超过 {:.0}秒", options.timeout.as_secs_f64()),
                );
            }
        }

        if attempt < total_attempts {
            let delay = options.retry_base_delay * attempt;
            warn!(
                "{} 第 {} 次尝试失败 ({})，{:.1}秒后重试",
                path.display(),
                attempt,
                last_failure.1,
                delay.as_secs_f64()
            );
            // 退避等待前再查一次取消标志，不再开始新的重试
            if cancel.is_cancelled() {
                return OcrOutcome::failure(
                    index,
                    path,
                    FailureKind::Cancelled,
                    "批次已取消",
                    started.elapsed(),
                );
            }
            sleep(delay).await;
        }
    }

    warn!("{} 重试耗尽: {}", path.display(), last_failure.1);
    OcrOutcome::failure(
        index,
        path,
        last_failure.0,
        last_failure.1,
        started.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;

    struct NoopClient;

    impl InferenceClient for NoopClient {
        async fn infer(&self, _image_path: &Path, _instructions: &str) -> AppResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_estimate_processing_time_has_per_image_floor() {
        let processor = OnlineProcessor::new(Arc::new(NoopClient));
        let options = OnlineOptions::default();

        assert_eq!(
            processor.estimate_processing_time(0, &options),
            Duration::ZERO
        );
        // 不论并发多高，每张图片至少按 2 秒估算
        let estimated = processor.estimate_processing_time(10, &options);
        assert!(estimated >= Duration::from_secs(20));
    }
}
