//! 报告生成服务
//!
//! 将一批识别结果渲染为结构化文本：统计信息、成功条目、失败条目。
//! 纯函数：同一批结果渲染出的内容完全一致（时间戳来自批次本身，
//! 不读取系统时钟），也不做任何 IO，写出由 [`ArtifactWriter`] 承担。

use crate::error::{AppResult, OcrError};
use crate::models::{OcrOutcome, ReportFormat};
use chrono::{DateTime, Local};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// 报告写出接口
///
/// 批处理器不直接打开文件，由调用方提供写出实现。
pub trait ArtifactWriter {
    /// 将报告内容写到目标路径
    fn write_artifact(&self, path: &Path, content: &str) -> AppResult<()>;
}

/// 基于文件系统的默认写出实现（自动创建父目录）
#[derive(Debug, Default)]
pub struct FsArtifactWriter;

impl ArtifactWriter for FsArtifactWriter {
    fn write_artifact(&self, path: &Path, content: &str) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| OcrError::ArtifactWrite {
                    path: path.display().to_string(),
                    source: e,
                })?;
            }
        }
        std::fs::write(path, content).map_err(|e| OcrError::ArtifactWrite {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// 报告生成器
#[derive(Debug, Default)]
pub struct ReportFormatter;

impl ReportFormatter {
    /// 创建报告生成器
    pub fn new() -> Self {
        Self
    }

    /// 渲染一批结果
    ///
    /// # 参数
    /// - `outcomes`: 按输入顺序排列的各图片结果
    /// - `finished_at`: 批次完成时间（报告中的时间戳）
    /// - `format`: 报告格式
    /// - `include_metadata`: 是否包含统计与元数据
    pub fn format_report(
        &self,
        outcomes: &[OcrOutcome],
        finished_at: DateTime<Local>,
        format: ReportFormat,
        include_metadata: bool,
    ) -> String {
        if outcomes.is_empty() {
            return self.empty_report(finished_at);
        }

        match format {
            ReportFormat::Detailed => self.format_detailed(outcomes, finished_at, include_metadata),
            ReportFormat::Simple => self.format_simple(outcomes, finished_at, include_metadata),
            ReportFormat::Clean => self.format_clean(outcomes),
        }
    }

    /// 生成一屏可读的摘要
    pub fn summary(
        &self,
        outcomes: &[OcrOutcome],
        elapsed: Duration,
        finished_at: DateTime<Local>,
    ) -> String {
        if outcomes.is_empty() {
            return "没有可汇总的结果。".to_string();
        }

        let total = outcomes.len();
        let succeeded: Vec<&OcrOutcome> = outcomes.iter().filter(|o| o.succeeded).collect();
        let failed = total - succeeded.len();
        let total_chars: usize = succeeded.iter().map(|o| o.text.chars().count()).sum();
        let secs = elapsed.as_secs_f64();
        let speed = if secs > 0.0 {
            total_chars as f64 / secs
        } else {
            0.0
        };

        format!(
            "OCR 批处理摘要\n{}\n\n文件总数: {}\n成功: {} ({:.1}%)\n失败: {} ({:.1}%)\n\n识别字符: {}\n处理耗时: {:.1}秒\n处理速度: {:.0} 字符/秒\n\n完成时间: {}\n",
            "=".repeat(40),
            total,
            succeeded.len(),
            succeeded.len() as f64 / total as f64 * 100.0,
            failed,
            failed as f64 / total as f64 * 100.0,
            total_chars,
            secs,
            speed,
            finished_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }

    /// 导出为 JSON（供程序化处理）
    pub fn export_json(&self, outcomes: &[OcrOutcome], finished_at: DateTime<Local>) -> String {
        let results: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|o| {
                json!({
                    "item_index": o.item_index,
                    "file_path": o.path.display().to_string(),
                    "filename": o.file_name(),
                    "success": o.succeeded,
                    "text_content": o.text,
                    "text_length": o.text.chars().count(),
                    "processing_time": o.duration.as_secs_f64(),
                    "error_kind": o.failure.as_ref().map(|f| f.kind.name()),
                    "error_message": o.failure.as_ref().map(|f| f.message.clone()),
                })
            })
            .collect();

        let data = json!({
            "metadata": {
                "generated_at": finished_at.to_rfc3339(),
                "total_files": outcomes.len(),
                "successful_files": outcomes.iter().filter(|o| o.succeeded).count(),
                "failed_files": outcomes.iter().filter(|o| !o.succeeded).count(),
            },
            "results": results,
        });

        serde_json::to_string_pretty(&data).unwrap_or_default()
    }

    fn empty_report(&self, finished_at: DateTime<Local>) -> String {
        format!(
            "# OCR 处理报告\n\n**生成时间:** {}\n**状态:** 没有可处理的结果\n\n未找到待处理的文件，或所有文件都未能产生结果。\n",
            finished_at.format("%Y-%m-%d %H:%M:%S")
        )
    }

    fn format_detailed(
        &self,
        outcomes: &[OcrOutcome],
        finished_at: DateTime<Local>,
        include_metadata: bool,
    ) -> String {
        let mut lines: Vec<String> = Vec::new();
        let succeeded: Vec<&OcrOutcome> = outcomes.iter().filter(|o| o.succeeded).collect();
        let failed: Vec<&OcrOutcome> = outcomes.iter().filter(|o| !o.succeeded).collect();

        // 文档头
        lines.push("# OCR 处理报告".to_string());
        lines.push(String::new());
        lines.push(format!(
            "**处理时间:** {}",
            finished_at.format("%Y-%m-%d %H:%M:%S")
        ));
        lines.push(format!("**文件总数:** {}", outcomes.len()));
        lines.push(format!("**成功:** {}", succeeded.len()));
        lines.push(format!("**失败:** {}", failed.len()));
        lines.push(String::new());

        if include_metadata {
            lines.extend(self.statistics_block(outcomes, &succeeded));
        }

        // 成功条目
        lines.push(format!("\n{}", "=".repeat(80)));
        lines.push("# 识别文本".to_string());
        lines.push(format!("{}\n", "=".repeat(80)));

        for (i, outcome) in succeeded.iter().enumerate() {
            lines.extend(self.success_section(outcome, i + 1, include_metadata));
        }

        // 失败条目
        if !failed.is_empty() && include_metadata {
            lines.push(format!("\n{}", "=".repeat(80)));
            lines.push("# 失败文件".to_string());
            lines.push(format!("{}\n", "=".repeat(80)));

            for outcome in &failed {
                lines.extend(self.failure_section(outcome));
            }
        }

        if include_metadata {
            lines.extend(self.footer_block(outcomes, &succeeded, finished_at));
        }

        lines.join("\n")
    }

    fn format_simple(
        &self,
        outcomes: &[OcrOutcome],
        finished_at: DateTime<Local>,
        include_metadata: bool,
    ) -> String {
        let mut lines: Vec<String> = Vec::new();

        if include_metadata {
            lines.push(format!(
                "OCR 处理 - {}",
                finished_at.format("%Y-%m-%d %H:%M:%S")
            ));
            lines.push("-".repeat(50));
            lines.push(String::new());
        }

        for (i, outcome) in outcomes.iter().filter(|o| o.succeeded).enumerate() {
            if include_metadata {
                lines.push(format!("[{}] {}", i + 1, outcome.file_name()));
                lines.push("-".repeat(30));
            }
            let text = outcome.text.trim();
            if text.is_empty() {
                lines.push("[未识别到文字]".to_string());
            } else {
                lines.push(text.to_string());
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }

    fn format_clean(&self, outcomes: &[OcrOutcome]) -> String {
        outcomes
            .iter()
            .filter(|o| o.succeeded && !o.text.trim().is_empty())
            .map(|o| o.text.trim().to_string())
            .collect::<Vec<String>>()
            .join("\n\n")
    }

    fn statistics_block(&self, outcomes: &[OcrOutcome], succeeded: &[&OcrOutcome]) -> Vec<String> {
        let mut lines = vec!["## 处理统计".to_string(), String::new()];

        let failed_count = outcomes.len() - succeeded.len();
        lines.push(format!("- 成功: {}", succeeded.len()));
        lines.push(format!("- 失败: {}", failed_count));
        lines.push(format!(
            "- 成功率: {:.1}%",
            succeeded.len() as f64 / outcomes.len() as f64 * 100.0
        ));

        // 耗时统计只统计成功条目
        let times: Vec<f64> = succeeded
            .iter()
            .map(|o| o.duration.as_secs_f64())
            .filter(|t| *t > 0.0)
            .collect();
        if !times.is_empty() {
            let avg = times.iter().sum::<f64>() / times.len() as f64;
            let max = times.iter().cloned().fold(f64::MIN, f64::max);
            let min = times.iter().cloned().fold(f64::MAX, f64::min);
            lines.push(String::new());
            lines.push("**处理耗时:**".to_string());
            lines.push(format!("- 平均: {:.2}秒", avg));
            lines.push(format!("- 最长: {:.2}秒", max));
            lines.push(format!("- 最短: {:.2}秒", min));
        }

        if !succeeded.is_empty() {
            let lengths: Vec<usize> = succeeded.iter().map(|o| o.text.chars().count()).collect();
            let total: usize = lengths.iter().sum();
            let max = lengths.iter().max().copied().unwrap_or(0);
            lines.push(String::new());
            lines.push("**识别文本:**".to_string());
            lines.push(format!("- 总字符数: {}", total));
            lines.push(format!(
                "- 平均每张: {:.0} 字符",
                total as f64 / succeeded.len() as f64
            ));
            lines.push(format!("- 最长文本: {} 字符", max));
        }

        lines.push(String::new());
        lines
    }

    fn success_section(
        &self,
        outcome: &OcrOutcome,
        index: usize,
        include_metadata: bool,
    ) -> Vec<String> {
        let mut lines = Vec::new();

        if include_metadata {
            lines.push(format!("## [{}] {}", index, outcome.file_name()));
            lines.push(String::new());
            lines.push(format!("**路径:** {}", outcome.path.display()));
            lines.push(format!("**耗时:** {:.2}秒", outcome.duration.as_secs_f64()));
            lines.push(format!(
                "**文本长度:** {} 字符",
                outcome.text.chars().count()
            ));
            lines.push(String::new());
        } else {
            lines.push(format!("## {}", outcome.file_name()));
            lines.push(String::new());
        }

        let text = outcome.text.trim();
        if text.is_empty() {
            lines.push("*[未识别到文字或文件为空]*".to_string());
        } else {
            lines.push("**识别内容:**".to_string());
            lines.push(String::new());
            lines.push(text.to_string());
        }

        lines.push(String::new());
        lines.push("-".repeat(80));
        lines.push(String::new());
        lines
    }

    fn failure_section(&self, outcome: &OcrOutcome) -> Vec<String> {
        let (kind, message) = match &outcome.failure {
            Some(f) => (f.kind.name(), f.message.as_str()),
            None => ("未知", ""),
        };

        vec![
            format!("**{}**", outcome.file_name()),
            format!("- 路径: {}", outcome.path.display()),
            format!("- 错误类型: {}", kind),
            format!("- 错误信息: {}", message),
            format!("- 耗时: {:.2}秒", outcome.duration.as_secs_f64()),
            String::new(),
        ]
    }

    fn footer_block(
        &self,
        outcomes: &[OcrOutcome],
        succeeded: &[&OcrOutcome],
        finished_at: DateTime<Local>,
    ) -> Vec<String> {
        if succeeded.is_empty() {
            return vec![
                String::new(),
                "=".repeat(80),
                "# 汇总统计".to_string(),
                "=".repeat(80),
                String::new(),
                "没有成功处理的文件。".to_string(),
            ];
        }

        let total_chars: usize = succeeded.iter().map(|o| o.text.chars().count()).sum();
        let total_time: f64 = outcomes
            .iter()
            .map(|o| o.duration.as_secs_f64())
            .filter(|t| *t > 0.0)
            .sum();
        let speed = if total_time > 0.0 {
            total_chars as f64 / total_time
        } else {
            0.0
        };

        vec![
            String::new(),
            "=".repeat(80),
            "# 汇总统计".to_string(),
            "=".repeat(80),
            String::new(),
            format!("总计识别字符: {}", total_chars),
            format!("总处理耗时: {:.2}秒", total_time),
            format!("处理速度: {:.0} 字符/秒", speed),
            String::new(),
            format!("处理完成: {}", finished_at.format("%Y-%m-%d %H:%M:%S")),
        ]
    }
}
