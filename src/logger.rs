//! 日志工具模块
//!
//! 提供 tracing 初始化和批处理生命周期日志的辅助函数

use tracing_subscriber::EnvFilter;

/// 初始化日志系统
///
/// 默认级别 info，可通过 RUST_LOG 环境变量覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(mode: &str, total: usize) {
    tracing::info!("{}", "=".repeat(60));
    tracing::info!("🚀 批量 OCR 处理启动 - {} 模式", mode);
    tracing::info!("📄 待处理图片: {} 张", total);
    tracing::info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `total`: 总数
/// - `elapsed_secs`: 整批耗时（秒）
/// - `output_file`: 报告输出路径
pub fn print_final_stats(success: usize, total: usize, elapsed_secs: f64, output_file: &str) {
    tracing::info!("\n{}", "=".repeat(60));
    tracing::info!("📊 全部处理完成统计");
    tracing::info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    tracing::info!("{}", "=".repeat(60));
    tracing::info!("✅ 成功: {}/{}", success, total);
    tracing::info!("❌ 失败: {}", total - success);
    tracing::info!("⏱️ 总耗时: {:.2}秒", elapsed_secs);
    tracing::info!("{}", "=".repeat(60));
    tracing::info!("\n报告已保存至: {}", output_file);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
