//! 提示词存储
//!
//! ## 职责
//!
//! 管理 OCR 提示词目录（`*.txt`）：加载、缓存、校验、保存与删除。
//! 缓存是显式对象，构造时注入批处理器，通过 `reload` / `invalidate`
//! 主动刷新，不存在进程级全局状态。

use crate::error::{AppResult, OcrError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 默认提示词名称
pub const DEFAULT_PROMPT_NAME: &str = "classic_ocr";

/// 默认提示词内容
pub const DEFAULT_PROMPT_TEXT: &str = "\
请逐字转写图片中的全部文字。

要求：
1. 每个字都按原样转写，不要增删
2. 保留所有标点符号和排版结构
3. 不要纠正原文中的错别字
4. 无法辨认的文字用 [无法辨认] 标注

输出：只返回图片中的文字内容，不要任何解释。";

/// 提示词存储
///
/// 持有目录路径和一份内存缓存；`get` 优先读缓存，未命中再读磁盘。
#[derive(Debug)]
pub struct PromptStore {
    prompts_dir: PathBuf,
    cache: HashMap<String, String>,
}

impl PromptStore {
    /// 创建存储并加载目录中的全部提示词
    ///
    /// 目录不存在时自动创建；目录为空时写入默认提示词。
    pub fn new(prompts_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let prompts_dir = prompts_dir.into();
        std::fs::create_dir_all(&prompts_dir).map_err(|e| OcrError::InvalidDirectory {
            path: format!("{} ({})", prompts_dir.display(), e),
        })?;

        let mut store = Self {
            prompts_dir,
            cache: HashMap::new(),
        };
        store.load_all();

        if store.cache.is_empty() {
            store.create_default_prompt();
        }

        Ok(store)
    }

    /// 按名称获取提示词内容
    ///
    /// 缓存未命中时直接读文件（不回填缓存，保持 `&self`）。
    pub fn get(&self, name: &str) -> AppResult<String> {
        if let Some(content) = self.cache.get(name) {
            return Ok(content.clone());
        }

        let path = self.prompt_path(name);
        if !path.exists() {
            return Err(OcrError::PromptLoad {
                name: name.to_string(),
                reason: format!("不存在，可用提示词: {:?}", self.available()),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| OcrError::PromptLoad {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(OcrError::PromptLoad {
                name: name.to_string(),
                reason: "文件为空".to_string(),
            });
        }
        Ok(content)
    }

    /// 列出可用提示词名称（缓存与磁盘的并集，已排序）
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.keys().cloned().collect();
        if let Ok(entries) = std::fs::read_dir(&self.prompts_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "txt") {
                    if let Some(stem) = path.file_stem() {
                        names.push(stem.to_string_lossy().into_owned());
                    }
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }

    /// 保存提示词到磁盘并更新缓存
    pub fn save(&mut self, name: &str, content: &str) -> AppResult<()> {
        let content = content.trim();
        if content.is_empty() {
            return Err(OcrError::PromptLoad {
                name: name.to_string(),
                reason: "不能保存空提示词".to_string(),
            });
        }

        let path = self.prompt_path(name);
        std::fs::write(&path, content).map_err(|e| OcrError::ArtifactWrite {
            path: path.display().to_string(),
            source: e,
        })?;
        self.cache.insert(name.to_string(), content.to_string());
        info!("提示词 '{}' 已保存", name);
        Ok(())
    }

    /// 从缓存中移除指定提示词（下次 `get` 重新读盘）
    pub fn invalidate(&mut self, name: &str) {
        self.cache.remove(name);
    }

    /// 清空缓存并重新加载目录中的全部提示词
    pub fn reload(&mut self) {
        info!("重新加载提示词目录: {}", self.prompts_dir.display());
        self.cache.clear();
        self.load_all();
    }

    /// 校验提示词内容是否像一段可用的 OCR 指令
    pub fn validate_content(content: &str) -> bool {
        let content = content.trim();
        if content.chars().count() < 10 {
            return false;
        }

        let lower = content.to_lowercase();
        let required = ["文字", "图片", "文本", "text", "image"];
        let helpful = ["转写", "识别", "抄写", "ocr", "逐字"];

        required.iter().any(|k| lower.contains(k)) || helpful.iter().any(|k| lower.contains(k))
    }

    fn prompt_path(&self, name: &str) -> PathBuf {
        self.prompts_dir.join(format!("{}.txt", name))
    }

    fn load_all(&mut self) {
        let entries = match std::fs::read_dir(&self.prompts_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("提示词目录不可读 ({}): {}", self.prompts_dir.display(), e);
                return;
            }
        };

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "txt") {
                continue;
            }
            let Some(stem) = path.file_stem() else { continue };
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let content = content.trim().to_string();
                    if content.is_empty() {
                        warn!("提示词文件为空: {}", path.display());
                        continue;
                    }
                    if !Self::validate_content(&content) {
                        debug!("提示词 '{}' 未通过内容校验，仍然加载", stem.to_string_lossy());
                    }
                    self.cache.insert(stem.to_string_lossy().into_owned(), content);
                    loaded += 1;
                }
                Err(e) => warn!("提示词 {} 读取失败: {}", path.display(), e),
            }
        }
        info!("已加载 {} 个提示词", loaded);
    }

    fn create_default_prompt(&mut self) {
        match self.save(DEFAULT_PROMPT_NAME, DEFAULT_PROMPT_TEXT) {
            Ok(()) => info!("已创建默认提示词 '{}'", DEFAULT_PROMPT_NAME),
            Err(e) => warn!("默认提示词创建失败: {}", e),
        }
    }
}
