//! Tesseract 引擎客户端
//!
//! 封装对 tesseract 命令行的调用，以及语言包的检测与下载。

use crate::clients::RecognitionEngine;
use crate::error::{AppResult, OcrError};
use crate::models::OfflineOptions;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// 语言包下载源
const TESSDATA_URL: &str = "https://github.com/tesseract-ocr/tessdata_best/raw/main";

/// Tesseract 客户端
pub struct TesseractClient {
    tessdata_dir: PathBuf,
}

impl TesseractClient {
    /// 创建客户端
    pub fn new(tessdata_dir: impl Into<PathBuf>) -> Self {
        Self {
            tessdata_dir: tessdata_dir.into(),
        }
    }

    /// 检查 tesseract 是否可用并返回版本号
    pub fn version(&self) -> AppResult<String> {
        let output = Command::new("tesseract")
            .arg("--version")
            .output()
            .map_err(|e| OcrError::EngineUnavailable {
                reason: format!("tesseract 未安装或不在 PATH 中: {}", e),
            })?;

        let text = String::from_utf8_lossy(&output.stdout);
        let version = text
            .lines()
            .next()
            .unwrap_or("tesseract (版本未知)")
            .trim()
            .to_string();
        info!("Tesseract 版本: {}", version);
        Ok(version)
    }

    /// 列出本地已有的语言包
    pub fn available_languages(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.tessdata_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut languages: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".traineddata").map(|s| s.to_string())
            })
            .collect();
        languages.sort();
        languages
    }

    /// 检查语言包是否已存在
    pub fn is_language_available(&self, language: &str) -> bool {
        self.tessdata_dir
            .join(format!("{}.traineddata", language))
            .exists()
    }

    /// 确保语言包就绪（必要时从 tessdata_best 下载）
    ///
    /// 下载失败时回退到英文语言包；两者都不可用才报错。
    pub async fn ensure_language(&self, language: &str) -> AppResult<String> {
        if self.is_language_available(language) {
            debug!("语言包 {} 已就绪", language);
            return Ok(language.to_string());
        }

        match self.download_language(language).await {
            Ok(()) => Ok(language.to_string()),
            Err(e) => {
                warn!("语言包 {} 下载失败: {}，回退到 eng", language, e);
                if language != "eng" && !self.is_language_available("eng") {
                    self.download_language("eng").await?;
                }
                if self.is_language_available("eng") {
                    Ok("eng".to_string())
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn download_language(&self, language: &str) -> AppResult<()> {
        let url = format!("{}/{}.traineddata", TESSDATA_URL, language);
        info!("正在下载语言包: {}", language);

        let response = reqwest::get(&url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OcrError::LanguageDownload {
                language: language.to_string(),
                reason: e.to_string(),
            })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OcrError::LanguageDownload {
                language: language.to_string(),
                reason: e.to_string(),
            })?;

        std::fs::create_dir_all(&self.tessdata_dir).map_err(|e| OcrError::LanguageDownload {
            language: language.to_string(),
            reason: e.to_string(),
        })?;
        let target = self.tessdata_dir.join(format!("{}.traineddata", language));
        std::fs::write(&target, &bytes).map_err(|e| OcrError::LanguageDownload {
            language: language.to_string(),
            reason: e.to_string(),
        })?;

        info!("语言包 {} 下载完成 ({} 字节)", language, bytes.len());
        Ok(())
    }
}

impl RecognitionEngine for TesseractClient {
    fn recognize(&self, image_path: &Path, options: &OfflineOptions) -> AppResult<String> {
        debug!(
            "调用 tesseract: {} (lang={}, psm={}, oem={})",
            image_path.display(),
            options.language,
            options.psm_mode,
            options.oem_mode
        );

        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&options.language)
            .arg("--psm")
            .arg(options.psm_mode.to_string())
            .arg("--oem")
            .arg(options.oem_mode.to_string())
            .env("TESSDATA_PREFIX", &self.tessdata_dir)
            .output()
            .map_err(|e| OcrError::EngineUnavailable {
                reason: format!("tesseract 启动失败: {}", e),
            })?;

        if !output.status.success() {
            return Err(OcrError::CommandFailed {
                command: "tesseract".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_languages_on_missing_dir() {
        let client = TesseractClient::new("/no/such/tessdata");
        assert!(client.available_languages().is_empty());
        assert!(!client.is_language_available("eng"));
    }

    #[test]
    fn test_available_languages_scans_traineddata() {
        let dir = std::env::temp_dir().join(format!("ocr_tessdata_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("创建临时目录失败");
        std::fs::write(dir.join("eng.traineddata"), b"x").expect("写入失败");
        std::fs::write(dir.join("chi_sim.traineddata"), b"x").expect("写入失败");
        std::fs::write(dir.join("readme.txt"), b"x").expect("写入失败");

        let client = TesseractClient::new(&dir);
        assert_eq!(client.available_languages(), vec!["chi_sim", "eng"]);
        assert!(client.is_language_available("eng"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
