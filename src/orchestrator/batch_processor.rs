//! 批处理协调器 - 编排层
//!
//! ## 职责
//!
//! 本模块是批量 OCR 的入口，负责一次批处理运行的完整生命周期：
//!
//! 1. **参数校验**：并发数、超时等非法值直接拒绝，不做静默修正
//! 2. **排序**：调用排序服务得到确定的处理顺序
//! 3. **分发**：按模式选择离线（顺序）或在线（并发）后端适配器
//! 4. **进度转发**：把适配器的进度事件转发给注册的接收器
//! 5. **汇总**：统计成功数量，生成报告并交给调用方提供的写出器
//!
//! ## 状态机
//!
//! `Idle -> Ordering -> Dispatching -> Aggregating -> Done`；
//! 取消信号生效时以 `Cancelled` 结束，写出失败等整批错误以
//! `Failed` 结束并向外传播。单张图片的失败只影响该图片的结果。

use crate::clients::{InferenceClient, RecognitionEngine};
use crate::config::Config;
use crate::error::{AppResult, OcrError};
use crate::models::{
    BatchOptions, BatchOutcome, CancelToken, OcrMode, OcrOutcome, ProgressSink,
};
use crate::orchestrator::{OfflineProcessor, OnlineProcessor};
use crate::services::{ArtifactWriter, ImageSorter, PromptStore, ReportFormatter, DEFAULT_PROMPT_TEXT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 批处理运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    Idle,
    Ordering,
    Dispatching,
    Aggregating,
    Done,
    Cancelled,
    Failed,
}

fn transition(state: &mut BatchState, next: BatchState) {
    debug!("批处理状态: {:?} -> {:?}", state, next);
    *state = next;
}

/// 批处理协调器
///
/// 持有排序服务、提示词存储、报告生成器和两个后端适配器；
/// 提示词缓存在构造时显式注入，不存在进程级全局状态。
pub struct OcrProcessor<E, C> {
    config: Config,
    sorter: ImageSorter,
    prompts: PromptStore,
    formatter: ReportFormatter,
    offline: OfflineProcessor<E>,
    online: OnlineProcessor<C>,
    progress_sink: Option<ProgressSink>,
    cancel: CancelToken,
}

impl<E: RecognitionEngine, C: InferenceClient> OcrProcessor<E, C> {
    /// 创建批处理协调器
    pub fn new(config: Config, engine: Arc<E>, client: Arc<C>, prompts: PromptStore) -> Self {
        let offline = OfflineProcessor::new(engine, config.supported_formats.clone());
        let online = OnlineProcessor::new(client);

        Self {
            config,
            sorter: ImageSorter::new(),
            prompts,
            formatter: ReportFormatter::new(),
            offline,
            online,
            progress_sink: None,
            cancel: CancelToken::new(),
        }
    }

    /// 注册进度接收器
    ///
    /// 每次运行只允许一个接收器；重复注册视为使用错误，
    /// 记录警告并以最后一次注册为准。
    pub fn set_progress_sink(&mut self, sink: ProgressSink) {
        if self.progress_sink.is_some() {
            warn!("进度接收器已存在，本次注册将替换之前的接收器");
        }
        self.progress_sink = Some(sink);
    }

    /// 获取取消令牌（可跨线程克隆使用）
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 支持的图片扩展名
    pub fn supported_formats(&self) -> &[String] {
        &self.config.supported_formats
    }

    /// 可用的提示词名称
    pub fn available_prompts(&self) -> Vec<String> {
        self.prompts.available()
    }

    /// 重新加载提示词缓存
    pub fn reload_prompts(&mut self) {
        self.prompts.reload();
    }

    /// 校验配置是否可用于批处理
    pub fn validate_config(&self) -> AppResult<()> {
        self.config.batch_options()?;
        if self.config.supported_formats.is_empty() {
            return Err(OcrError::Config("支持的图片格式列表不能为空".to_string()));
        }
        Ok(())
    }

    /// 扫描目录中受支持的图片文件
    pub fn find_image_files(&self, directory: impl AsRef<Path>) -> AppResult<Vec<PathBuf>> {
        let directory = directory.as_ref();
        if !directory.exists() || !directory.is_dir() {
            return Err(OcrError::InvalidDirectory {
                path: directory.display().to_string(),
            });
        }

        let entries = std::fs::read_dir(directory).map_err(|e| OcrError::InvalidDirectory {
            path: format!("{} ({})", directory.display(), e),
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.has_supported_extension(path))
            .collect();
        files.sort();

        info!("在 {} 中找到 {} 张图片", directory.display(), files.len());
        Ok(files)
    }

    /// 完整的批处理流程：排序 → 分发 → 汇总 → 报告写出
    ///
    /// # 参数
    /// - `image_paths`: 待处理图片列表
    /// - `options`: 本次运行的全部参数
    /// - `writer`: 报告写出器（协调器自身不打开文件）
    ///
    /// # 返回
    /// 无论多少图片失败，只要流程本身正常，都返回完整的批次结果；
    /// 调用方应检查 `succeeded_count` 而不是依赖错误来判断"全部失败"。
    pub async fn run_batch(
        &self,
        image_paths: &[PathBuf],
        options: &BatchOptions,
        writer: &dyn ArtifactWriter,
    ) -> AppResult<BatchOutcome> {
        let mut state = BatchState::Idle;
        validate_options(options)?;

        let started = Instant::now();
        info!(
            "开始处理 {} 张图片，模式: {}，排序: {}",
            image_paths.len(),
            options.mode.name(),
            options.sort_strategy.name()
        );

        // 排序阶段：永不失败
        transition(&mut state, BatchState::Ordering);
        let ordered = self.sorter.sort_files(image_paths, options.sort_strategy);
        debug!("图片已按 {} 策略排序", options.sort_strategy.name());

        // 分发阶段：进度事件经通道转发给接收器，生产与消费互不阻塞
        transition(&mut state, BatchState::Dispatching);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let sink = self.progress_sink.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                if let Some(sink) = &sink {
                    (sink.as_ref())(event);
                }
            }
        });

        let outcomes = match options.mode {
            OcrMode::Offline => {
                let processor = self.offline.clone();
                let paths = ordered.clone();
                let offline_options = options.offline.clone();
                let tx = progress_tx.clone();
                let cancel = self.cancel.clone();
                tokio::task::spawn_blocking(move || {
                    processor.process_batch(&paths, &offline_options, &tx, &cancel)
                })
                .await
                .map_err(|e| {
                    transition(&mut state, BatchState::Failed);
                    OcrError::Other(format!("离线处理任务异常退出: {}", e))
                })?
            }
            OcrMode::Online => {
                let prompt = self.load_prompt(&options.online.prompt_name);
                self.online
                    .process_batch(
                        &ordered,
                        &prompt,
                        &options.online,
                        progress_tx.clone(),
                        self.cancel.clone(),
                    )
                    .await
            }
        };
        drop(progress_tx);
        let _ = forwarder.await;

        // 汇总阶段
        transition(&mut state, BatchState::Aggregating);
        let succeeded_count = outcomes.iter().filter(|o| o.succeeded).count();
        let elapsed = started.elapsed();
        let finished_at = chrono::Local::now();

        let artifact = self.formatter.format_report(
            &outcomes,
            finished_at,
            options.report_format,
            options.include_metadata,
        );
        if let Err(e) = writer.write_artifact(&options.output_file, &artifact) {
            transition(&mut state, BatchState::Failed);
            error!("报告写出失败: {}", e);
            return Err(e);
        }

        if self.cancel.is_cancelled() {
            transition(&mut state, BatchState::Cancelled);
        } else {
            transition(&mut state, BatchState::Done);
        }

        info!(
            "处理完成: 成功 {}/{}，耗时 {:.2}秒",
            succeeded_count,
            outcomes.len(),
            elapsed.as_secs_f64()
        );

        Ok(BatchOutcome {
            total: outcomes.len(),
            succeeded_count,
            outcomes,
            elapsed,
            finished_at,
            artifact_path: Some(options.output_file.clone()),
        })
    }

    /// 生成批次结果的 JSON 导出
    pub fn export_json(&self, batch: &BatchOutcome) -> String {
        self.formatter.export_json(&batch.outcomes, batch.finished_at)
    }

    /// 生成批次结果的一屏摘要
    pub fn summarize(&self, batch: &BatchOutcome) -> String {
        self.formatter
            .summary(&batch.outcomes, batch.elapsed, batch.finished_at)
    }

    fn load_prompt(&self, name: &str) -> String {
        match self.prompts.get(name) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("提示词加载失败 ({})，使用内置默认提示词", e);
                DEFAULT_PROMPT_TEXT.to_string()
            }
        }
    }

    fn has_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .is_some_and(|ext| self.config.supported_formats.iter().any(|f| f == &ext))
    }
}

/// 入口处的参数校验：非法值直接拒绝，不做静默修正
fn validate_options(options: &BatchOptions) -> AppResult<()> {
    if options.online.max_concurrency < 1 {
        return Err(OcrError::Config("最大并发数必须大于等于 1".to_string()));
    }
    if options.online.timeout.is_zero() {
        return Err(OcrError::Config("单次调用超时必须大于 0".to_string()));
    }
    if options.mode == OcrMode::Offline && options.offline.language.trim().is_empty() {
        return Err(OcrError::Config("OCR 语言不能为空".to_string()));
    }
    Ok(())
}

/// 统计一批结果中每种失败类型的数量（用于日志与诊断）
pub fn failure_breakdown(outcomes: &[OcrOutcome]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for outcome in outcomes {
        let Some(failure) = &outcome.failure else { continue };
        let name = failure.kind.name().to_string();
        match counts.iter_mut().find(|(k, _)| *k == name) {
            Some((_, n)) => *n += 1,
            None => counts.push((name, 1)),
        }
    }
    counts
}
