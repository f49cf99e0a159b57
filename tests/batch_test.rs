//! 批处理集成测试
//!
//! 用内存中的模拟引擎 / 模拟推理客户端驱动两个后端适配器和协调器，
//! 验证顺序不变量、重试 / 超时 / 取消语义和报告内容。

use ocr_batch::{
    AppResult, ArtifactWriter, BatchOptions, CancelToken, Config, FailureKind, InferenceClient,
    OcrError, OcrMode, OcrProcessor, OfflineOptions, OfflineProcessor, OnlineOptions,
    OnlineProcessor, ProgressEvent, PromptStore, RecognitionEngine, SortStrategy,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

// ========== 测试辅助 ==========

/// 在临时目录中创建一组真实存在的图片文件
fn temp_images(tag: &str, names: &[&str]) -> (PathBuf, Vec<PathBuf>) {
    let dir = std::env::temp_dir().join(format!(
        "ocr_batch_test_{}_{}",
        tag,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("创建临时目录失败");

    let paths = names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, name.as_bytes()).expect("写入测试文件失败");
            path
        })
        .collect();
    (dir, paths)
}

fn basename(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// 模拟本地识别引擎：按文件名决定成功或失败
struct MockEngine {
    fail_names: HashSet<String>,
}

impl MockEngine {
    fn new() -> Self {
        Self {
            fail_names: HashSet::new(),
        }
    }

    fn failing_on(mut self, name: &str) -> Self {
        self.fail_names.insert(name.to_string());
        self
    }
}

impl RecognitionEngine for MockEngine {
    fn recognize(&self, image_path: &Path, _options: &OfflineOptions) -> AppResult<String> {
        let name = basename(image_path);
        if self.fail_names.contains(&name) {
            return Err(OcrError::CommandFailed {
                command: "mock-engine".to_string(),
                stderr: format!("模拟引擎故障: {}", name),
            });
        }
        Ok(format!("{} 的识别文本", name))
    }
}

/// 模拟远程推理客户端：可按文件名配置延迟、失败次数和空白响应
#[derive(Default)]
struct MockClient {
    delays: HashMap<String, Duration>,
    fail_first: HashMap<String, u32>,
    blank_names: HashSet<String>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl MockClient {
    fn new() -> Self {
        Self::default()
    }

    /// 每次调用前等待指定时长
    fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// 前 n 次调用返回错误
    fn failing_first(mut self, name: &str, n: u32) -> Self {
        self.fail_first.insert(name.to_string(), n);
        self
    }

    /// 始终返回空白内容
    fn always_blank(mut self, name: &str) -> Self {
        self.blank_names.insert(name.to_string());
        self
    }

    fn attempts_for(&self, name: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

impl InferenceClient for MockClient {
    async fn infer(&self, image_path: &Path, _instructions: &str) -> AppResult<String> {
        let name = basename(image_path);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(name.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if let Some(delay) = self.delays.get(&name) {
            tokio::time::sleep(*delay).await;
        }

        if self.blank_names.contains(&name) {
            return Ok("   ".to_string());
        }

        if let Some(fail_count) = self.fail_first.get(&name) {
            if attempt <= *fail_count {
                return Err(OcrError::Inference(format!(
                    "模拟故障 (第 {} 次调用)",
                    attempt
                )));
            }
        }

        Ok(format!("{} 的识别文本", name))
    }
}

/// 收集写出的报告内容，不落盘
#[derive(Default)]
struct MemoryWriter {
    artifact: Mutex<Option<(PathBuf, String)>>,
}

impl MemoryWriter {
    fn content(&self) -> String {
        self.artifact
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, content)| content.clone())
            .unwrap_or_default()
    }
}

impl ArtifactWriter for MemoryWriter {
    fn write_artifact(&self, path: &Path, content: &str) -> AppResult<()> {
        *self.artifact.lock().unwrap() = Some((path.to_path_buf(), content.to_string()));
        Ok(())
    }
}

fn fast_online_options() -> OnlineOptions {
    OnlineOptions {
        max_concurrency: 4,
        timeout: Duration::from_secs(5),
        retry_limit: 0,
        retry_base_delay: Duration::from_millis(10),
        ..OnlineOptions::default()
    }
}

fn test_processor(
    tag: &str,
    engine: MockEngine,
    client: MockClient,
) -> OcrProcessor<MockEngine, MockClient> {
    let prompts_dir = std::env::temp_dir().join(format!(
        "ocr_batch_prompts_{}_{}",
        tag,
        std::process::id()
    ));
    let prompts = PromptStore::new(&prompts_dir).expect("创建提示词存储失败");
    OcrProcessor::new(Config::default(), Arc::new(engine), Arc::new(client), prompts)
}

// ========== 并发适配器 ==========

#[tokio::test]
async fn test_online_reverse_completion_order_still_yields_input_order() {
    let names = ["page1.png", "page2.png", "page3.png", "page4.png"];
    let (dir, paths) = temp_images("reverse", &names);

    // 越靠前的图片处理得越慢：完成顺序与提交顺序完全相反
    let client = MockClient::new()
        .with_delay("page1.png", Duration::from_millis(200))
        .with_delay("page2.png", Duration::from_millis(150))
        .with_delay("page3.png", Duration::from_millis(100))
        .with_delay("page4.png", Duration::from_millis(50));

    let processor = OnlineProcessor::new(Arc::new(client));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcomes = processor
        .process_batch(
            &paths,
            "测试提示词",
            &fast_online_options(),
            tx,
            CancelToken::new(),
        )
        .await;

    assert_eq!(outcomes.len(), names.len());
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.item_index, i, "槽位 {} 的下标错误", i);
        assert_eq!(outcome.file_name(), names[i], "槽位 {} 的文件错误", i);
        assert!(outcome.succeeded, "{} 应当成功", names[i]);
    }

    // 进度事件：完成计数单调递增；第一个完成的是最快的图片
    let mut events: Vec<ProgressEvent> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), names.len());
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.completed, i + 1);
        assert_eq!(event.total, names.len());
    }
    assert_eq!(events[0].label, "page4.png");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_online_retry_then_success() {
    let (dir, paths) = temp_images("retry", &["flaky.png"]);

    // 前两次失败，第三次成功；retry_limit = 2 共三次尝试
    let client = Arc::new(MockClient::new().failing_first("flaky.png", 2));
    let processor = OnlineProcessor::new(Arc::clone(&client));

    let options = OnlineOptions {
        retry_limit: 2,
        retry_base_delay: Duration::from_millis(5),
        ..fast_online_options()
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let outcomes = processor
        .process_batch(&paths, "测试提示词", &options, tx, CancelToken::new())
        .await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].succeeded, "重试后应当成功");
    assert!(outcomes[0].failure.is_none(), "成功结果不应残留错误信息");
    assert_eq!(client.attempts_for("flaky.png"), 3);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_online_timeout_exhausts_retries_without_aborting_batch() {
    let (dir, paths) = temp_images("timeout", &["slow.png", "quick.png"]);

    let client = MockClient::new().with_delay("slow.png", Duration::from_millis(300));
    let processor = OnlineProcessor::new(Arc::new(client));

    let options = OnlineOptions {
        timeout: Duration::from_millis(40),
        retry_limit: 1,
        retry_base_delay: Duration::from_millis(5),
        ..fast_online_options()
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let outcomes = processor
        .process_batch(&paths, "测试提示词", &options, tx, CancelToken::new())
        .await;

    assert_eq!(outcomes.len(), 2, "超时不应影响批次完整性");
    let slow = &outcomes[0];
    assert!(!slow.succeeded);
    assert_eq!(
        slow.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::Timeout)
    );
    assert!(outcomes[1].succeeded, "其他图片应正常完成");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_online_blank_response_retries_then_reports_empty() {
    let (dir, paths) = temp_images("blank", &["blank.png"]);

    let client = Arc::new(MockClient::new().always_blank("blank.png"));
    let processor = OnlineProcessor::new(Arc::clone(&client));

    let options = OnlineOptions {
        retry_limit: 1,
        retry_base_delay: Duration::from_millis(5),
        ..fast_online_options()
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let outcomes = processor
        .process_batch(&paths, "测试提示词", &options, tx, CancelToken::new())
        .await;

    // 空白响应视为未成功，重试耗尽后记录为空白响应错误
    assert!(!outcomes[0].succeeded);
    assert_eq!(
        outcomes[0].failure.as_ref().map(|f| f.kind),
        Some(FailureKind::EmptyResponse)
    );
    assert_eq!(client.attempts_for("blank.png"), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_online_missing_file_fails_without_calling_service() {
    let (dir, mut paths) = temp_images("missing", &["real.png"]);
    paths.push(dir.join("ghost.png"));

    let client = Arc::new(MockClient::new());
    let processor = OnlineProcessor::new(Arc::clone(&client));

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcomes = processor
        .process_batch(
            &paths,
            "测试提示词",
            &fast_online_options(),
            tx,
            CancelToken::new(),
        )
        .await;

    assert!(outcomes[0].succeeded);
    assert_eq!(
        outcomes[1].failure.as_ref().map(|f| f.kind),
        Some(FailureKind::NotFound)
    );
    assert_eq!(client.attempts_for("ghost.png"), 0, "缺失文件不应发起调用");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_online_cancellation_mid_run() {
    let names = ["c1.png", "c2.png", "c3.png", "c4.png", "c5.png", "c6.png"];
    let (dir, paths) = temp_images("cancel", &names);

    let mut client = MockClient::new();
    for name in &names {
        client = client.with_delay(name, Duration::from_millis(150));
    }
    let processor = OnlineProcessor::new(Arc::new(client));

    let options = OnlineOptions {
        max_concurrency: 2,
        ..fast_online_options()
    };
    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcomes = processor
        .process_batch(&paths, "测试提示词", &options, tx, cancel)
        .await;

    // 结果数量始终等于输入数量，每个结果要么成功要么被取消
    assert_eq!(outcomes.len(), names.len());
    let mut succeeded = 0;
    let mut cancelled = 0;
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.item_index, i);
        if outcome.succeeded {
            succeeded += 1;
        } else {
            assert_eq!(
                outcome.failure.as_ref().map(|f| f.kind),
                Some(FailureKind::Cancelled),
                "{} 的失败类型应为已取消",
                outcome.file_name()
            );
            cancelled += 1;
        }
    }
    assert!(succeeded >= 2, "取消前已开始的图片应正常完成");
    assert!(cancelled >= 1, "取消后未调度的图片应被标记为已取消");

    let _ = std::fs::remove_dir_all(&dir);
}

// ========== 顺序适配器 ==========

#[tokio::test]
async fn test_offline_adapter_isolates_per_item_failures() {
    let (dir, mut paths) = temp_images("offline", &["ok.png", "broken.png"]);
    paths.push(dir.join("ghost.png"));
    let gif = dir.join("animation.gif");
    std::fs::write(&gif, b"gif").expect("写入失败");
    paths.push(gif);

    let engine = MockEngine::new().failing_on("broken.png");
    let processor = OfflineProcessor::new(
        Arc::new(engine),
        Config::default().supported_formats,
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcomes = processor.process_batch(
        &paths,
        &OfflineOptions::default(),
        &tx,
        &CancelToken::new(),
    );
    drop(tx);

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[0].succeeded);
    assert_eq!(
        outcomes[1].failure.as_ref().map(|f| f.kind),
        Some(FailureKind::EngineFailure)
    );
    assert_eq!(
        outcomes[2].failure.as_ref().map(|f| f.kind),
        Some(FailureKind::NotFound)
    );
    assert_eq!(
        outcomes[3].failure.as_ref().map(|f| f.kind),
        Some(FailureKind::UnsupportedFormat)
    );
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.item_index, i);
    }

    // 顺序模式的进度事件按处理顺序逐张发出
    let mut labels = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.total, 4);
        labels.push(event.label);
    }
    assert_eq!(
        labels,
        vec!["ok.png", "broken.png", "ghost.png", "animation.gif"]
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_offline_adapter_cancelled_before_start() {
    let (dir, paths) = temp_images("offline_cancel", &["x.png", "y.png"]);

    let processor = OfflineProcessor::new(
        Arc::new(MockEngine::new()),
        Config::default().supported_formats,
    );
    let cancel = CancelToken::new();
    cancel.cancel();

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcomes = processor.process_batch(&paths, &OfflineOptions::default(), &tx, &cancel);

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(
            outcome.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::Cancelled)
        );
    }

    let _ = std::fs::remove_dir_all(&dir);
}

// ========== 协调器 ==========

#[tokio::test]
async fn test_run_batch_offline_end_to_end_with_alphabetical_order() {
    // 输入 [b.png, a.png]，字母序处理 [a.png, b.png]；
    // a.png 不存在，b.png 成功
    let (dir, _) = temp_images("e2e", &["b.png"]);
    let input = vec![dir.join("b.png"), dir.join("a.png")];

    let mut processor = test_processor("e2e", MockEngine::new(), MockClient::new());

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    processor.set_progress_sink(Arc::new(move |event| {
        sink_events.lock().unwrap().push(event);
    }));

    let options = BatchOptions {
        mode: OcrMode::Offline,
        sort_strategy: SortStrategy::Alphabetical,
        output_file: dir.join("report.txt"),
        ..BatchOptions::default()
    };
    let writer = MemoryWriter::default();
    let batch = tokio_test::assert_ok!(processor.run_batch(&input, &options, &writer).await);

    assert_eq!(batch.total, 2);
    assert_eq!(batch.succeeded_count, 1);
    assert_eq!(batch.outcomes[0].file_name(), "a.png");
    assert!(!batch.outcomes[0].succeeded);
    assert_eq!(
        batch.outcomes[0].failure.as_ref().map(|f| f.kind),
        Some(FailureKind::NotFound)
    );
    assert_eq!(batch.outcomes[1].file_name(), "b.png");
    assert!(batch.outcomes[1].succeeded);
    assert_eq!(batch.artifact_path, Some(dir.join("report.txt")));

    // 报告内容：成功与失败分区互不混入
    let report = writer.content();
    assert!(report.contains("b.png 的识别文本"));
    assert!(report.contains("# 失败文件"));
    assert!(report.contains("文件不存在"));

    // 进度事件经转发器送达接收器
    {
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].completed, 1);
        assert_eq!(events[1].completed, 2);
    }

    // 摘要与 JSON 导出基于同一批结果
    let summary = processor.summarize(&batch);
    assert!(summary.contains("文件总数: 2"));
    let exported = processor.export_json(&batch);
    assert!(exported.contains("\"total_files\": 2"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_run_batch_online_end_to_end() {
    let names = ["n2.png", "n10.png", "n1.png"];
    let (dir, _) = temp_images("e2e_online", &names);
    let input: Vec<PathBuf> = names.iter().map(|n| dir.join(n)).collect();

    let processor = test_processor("e2e_online", MockEngine::new(), MockClient::new());

    let options = BatchOptions {
        mode: OcrMode::Online,
        sort_strategy: SortStrategy::Natural,
        output_file: dir.join("report.txt"),
        online: fast_online_options(),
        ..BatchOptions::default()
    };
    let writer = MemoryWriter::default();
    let batch = tokio_test::assert_ok!(processor.run_batch(&input, &options, &writer).await);

    // 自然排序决定处理顺序，槽位数组保证输出顺序
    assert_eq!(batch.succeeded_count, 3);
    let ordered: Vec<String> = batch.outcomes.iter().map(|o| o.file_name()).collect();
    assert_eq!(ordered, vec!["n1.png", "n2.png", "n10.png"]);
    for (i, outcome) in batch.outcomes.iter().enumerate() {
        assert_eq!(outcome.item_index, i);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_run_batch_rejects_invalid_configuration() {
    let processor = test_processor("invalid", MockEngine::new(), MockClient::new());
    let writer = MemoryWriter::default();

    let mut options = BatchOptions {
        mode: OcrMode::Online,
        ..BatchOptions::default()
    };
    options.online.max_concurrency = 0;
    let result = processor.run_batch(&[], &options, &writer).await;
    assert!(
        matches!(result, Err(OcrError::Config(_))),
        "并发数为 0 应立即拒绝"
    );

    let mut options = BatchOptions::default();
    options.online.timeout = Duration::ZERO;
    let result = processor.run_batch(&[], &options, &writer).await;
    assert!(
        matches!(result, Err(OcrError::Config(_))),
        "超时为 0 应立即拒绝"
    );
}

#[tokio::test]
async fn test_run_batch_on_empty_input_is_a_normal_run() {
    let dir = std::env::temp_dir().join(format!("ocr_batch_empty_{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);

    let processor = test_processor("empty", MockEngine::new(), MockClient::new());
    let options = BatchOptions {
        output_file: dir.join("report.txt"),
        ..BatchOptions::default()
    };
    let writer = MemoryWriter::default();
    let batch = tokio_test::assert_ok!(processor.run_batch(&[], &options, &writer).await);

    // 全部失败或没有输入都是正常结果，调用方检查 succeeded_count
    assert_eq!(batch.total, 0);
    assert_eq!(batch.succeeded_count, 0);
    assert!(writer.content().contains("没有可处理的结果"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_find_image_files_filters_by_extension() {
    let (dir, _) = temp_images("scan", &["a.png", "b.jpg"]);
    std::fs::write(dir.join("notes.txt"), b"x").expect("写入失败");

    let processor = test_processor("scan", MockEngine::new(), MockClient::new());
    let files = processor.find_image_files(&dir).expect("扫描失败");
    let names: Vec<String> = files.iter().map(|p| basename(p)).collect();
    assert_eq!(names, vec!["a.png", "b.jpg"]);

    assert!(
        processor.find_image_files(dir.join("no_such_dir")).is_err(),
        "不存在的目录应报错"
    );

    let _ = std::fs::remove_dir_all(&dir);
}
