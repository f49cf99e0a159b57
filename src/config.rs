//! 程序配置
//!
//! 支持三种来源，优先级从高到低：环境变量、`config.toml`、内置默认值。

use crate::error::{AppResult, OcrError};
use crate::models::{
    BatchOptions, OcrMode, OfflineOptions, OnlineOptions, ReportFormat, SortStrategy,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 默认支持的图片扩展名（小写，含点）
pub static DEFAULT_SUPPORTED_FORMATS: phf::Set<&'static str> = phf::phf_set! {
    ".png", ".jpg", ".jpeg", ".tiff", ".bmp",
};

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 待处理图片所在目录
    pub input_folder: String,
    /// 报告输出文件
    pub output_file: String,
    /// 处理模式（"offline" / "online"）
    pub mode: String,
    /// 排序策略名称
    pub sort_method: String,
    /// 报告格式（"detailed" / "simple" / "clean"）
    pub report_format: String,
    /// 报告是否包含元数据
    pub include_metadata: bool,
    /// 支持的图片扩展名（小写，含点）
    pub supported_formats: Vec<String>,
    // --- 本地引擎配置 ---
    /// Tesseract 语言数据目录
    pub tessdata_dir: String,
    /// OCR 语言代码
    pub language: String,
    /// 页面分割模式
    pub psm_mode: u32,
    /// 引擎模式
    pub oem_mode: u32,
    // --- 远程推理配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 提示词目录
    pub prompts_dir: String,
    /// 提示词名称
    pub prompt_name: String,
    /// 最大并发数
    pub max_concurrency: usize,
    /// 单次调用超时（秒）
    pub timeout_seconds: u64,
    /// 首次尝试之外的重试次数
    pub retry_limit: u32,
    /// 重试退避基准时长（秒）
    pub retry_base_delay_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folder: "images".to_string(),
            output_file: "ocr_result.txt".to_string(),
            mode: "offline".to_string(),
            sort_method: "natural".to_string(),
            report_format: "detailed".to_string(),
            include_metadata: true,
            supported_formats: DEFAULT_SUPPORTED_FORMATS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tessdata_dir: "tessdata".to_string(),
            language: "eng".to_string(),
            psm_mode: 3,
            oem_mode: 3,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            prompts_dir: "ocr_prompts".to_string(),
            prompt_name: "classic_ocr".to_string(),
            max_concurrency: 5,
            timeout_seconds: 30,
            retry_limit: 2,
            retry_base_delay_seconds: 2,
        }
    }
}

impl Config {
    /// 从环境变量加载配置（缺失项使用默认值）
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            input_folder: std::env::var("OCR_INPUT_FOLDER").unwrap_or(default.input_folder),
            output_file: std::env::var("OCR_OUTPUT_FILE").unwrap_or(default.output_file),
            mode: std::env::var("OCR_MODE").unwrap_or(default.mode),
            sort_method: std::env::var("OCR_SORT_METHOD").unwrap_or(default.sort_method),
            report_format: std::env::var("OCR_REPORT_FORMAT").unwrap_or(default.report_format),
            include_metadata: std::env::var("OCR_INCLUDE_METADATA").ok().and_then(|v| v.parse().ok()).unwrap_or(default.include_metadata),
            supported_formats: default.supported_formats,
            tessdata_dir: std::env::var("OCR_TESSDATA_DIR").unwrap_or(default.tessdata_dir),
            language: std::env::var("OCR_LANGUAGE").unwrap_or(default.language),
            psm_mode: std::env::var("OCR_PSM_MODE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.psm_mode),
            oem_mode: std::env::var("OCR_OEM_MODE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.oem_mode),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            prompts_dir: std::env::var("OCR_PROMPTS_DIR").unwrap_or(default.prompts_dir),
            prompt_name: std::env::var("OCR_PROMPT_NAME").unwrap_or(default.prompt_name),
            max_concurrency: std::env::var("OCR_MAX_CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrency),
            timeout_seconds: std::env::var("OCR_TIMEOUT_SECONDS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.timeout_seconds),
            retry_limit: std::env::var("OCR_RETRY_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_limit),
            retry_base_delay_seconds: std::env::var("OCR_RETRY_BASE_DELAY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_base_delay_seconds),
        }
    }

    /// 从 TOML 配置文件加载
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| OcrError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content)
            .map_err(|e| OcrError::Config(format!("配置文件解析失败 ({}): {}", path.display(), e)))
    }

    /// 如果配置文件存在则读取，否则回退到环境变量
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::from_env())
        }
    }

    /// 将字符串字段解析为一次批处理运行的参数
    pub fn batch_options(&self) -> AppResult<BatchOptions> {
        let mode = OcrMode::from_name(&self.mode)
            .ok_or_else(|| OcrError::Config(format!("不支持的处理模式: {}", self.mode)))?;
        let sort_strategy = SortStrategy::from_name(&self.sort_method)
            .ok_or_else(|| OcrError::Config(format!("未知的排序策略: {}", self.sort_method)))?;
        let report_format = ReportFormat::from_name(&self.report_format)
            .ok_or_else(|| OcrError::Config(format!("未知的报告格式: {}", self.report_format)))?;

        Ok(BatchOptions {
            mode,
            sort_strategy,
            offline: OfflineOptions {
                language: self.language.clone(),
                psm_mode: self.psm_mode,
                oem_mode: self.oem_mode,
            },
            online: OnlineOptions {
                prompt_name: self.prompt_name.clone(),
                max_concurrency: self.max_concurrency,
                timeout: Duration::from_secs(self.timeout_seconds),
                retry_limit: self.retry_limit,
                retry_base_delay: Duration::from_secs(self.retry_base_delay_seconds),
            },
            report_format,
            include_metadata: self.include_metadata,
            output_file: PathBuf::from(&self.output_file),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_formats_lowercase_with_dot() {
        for ext in &Config::default().supported_formats {
            assert!(ext.starts_with('.'), "扩展名应以点开头: {}", ext);
            assert_eq!(ext, &ext.to_lowercase());
        }
    }

    #[test]
    fn test_batch_options_from_default_config() {
        let options = Config::default().batch_options().expect("默认配置应可解析");
        assert_eq!(options.mode, OcrMode::Offline);
        assert_eq!(options.sort_strategy, SortStrategy::Natural);
        assert_eq!(options.report_format, ReportFormat::Detailed);
        assert_eq!(options.online.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_batch_options_rejects_unknown_mode() {
        let config = Config {
            mode: "hybrid".to_string(),
            ..Config::default()
        };
        assert!(config.batch_options().is_err());
    }

    #[test]
    fn test_mode_and_format_round_trip() {
        assert_eq!(
            OcrMode::from_name(OcrMode::Online.name()),
            Some(OcrMode::Online)
        );
        assert_eq!(
            ReportFormat::from_name(ReportFormat::Clean.name()),
            Some(ReportFormat::Clean)
        );
    }

    #[test]
    fn test_from_toml_snippet() {
        let config: Config =
            toml::from_str("mode = \"online\"\nmax_concurrency = 8").expect("解析失败");
        assert_eq!(config.mode, "online");
        assert_eq!(config.max_concurrency, 8);
        // 未出现的字段取默认值
        assert_eq!(config.sort_method, "natural");
    }
}
