use anyhow::Result;
use ocr_batch::{
    logger, CancelToken, Config, FsArtifactWriter, LlmClient, OcrMode, OcrProcessor, PromptStore,
    TesseractClient,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 加载配置：config.toml 存在则读取，否则使用环境变量
    let config = Config::load("config.toml")?;
    let options = config.batch_options()?;

    // 构建客户端与协调器
    let engine = Arc::new(TesseractClient::new(&config.tessdata_dir));
    let client = Arc::new(LlmClient::new(&config));
    let prompts = PromptStore::new(&config.prompts_dir)?;

    match options.mode {
        OcrMode::Offline => {
            // 提前确认引擎与语言包就绪，引擎级故障在任何图片处理前暴露
            engine.version()?;
            engine.ensure_language(&config.language).await?;
        }
        OcrMode::Online => {}
    }

    let mut processor = OcrProcessor::new(config.clone(), engine, client, prompts);
    processor.validate_config()?;

    // 扫描输入目录
    let image_paths = processor.find_image_files(&config.input_folder)?;
    logger::log_startup(options.mode.name(), image_paths.len());

    // Ctrl+C 触发协作式取消
    let cancel: CancelToken = processor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到中断信号，正在取消剩余任务...");
            cancel.cancel();
        }
    });

    // 进度打印
    processor.set_progress_sink(Arc::new(|event| {
        info!("📄 [{}/{}] {}", event.completed, event.total, event.label);
    }));

    // 运行批处理并写出报告
    let writer = FsArtifactWriter;
    let batch = processor.run_batch(&image_paths, &options, &writer).await?;

    logger::print_final_stats(
        batch.succeeded_count,
        batch.total,
        batch.elapsed.as_secs_f64(),
        &config.output_file,
    );

    if batch.succeeded_count < batch.total {
        for (kind, count) in ocr_batch::orchestrator::failure_breakdown(&batch.outcomes) {
            info!("  {} × {}", kind, count);
        }
    }

    Ok(())
}
