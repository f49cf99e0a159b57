//! LLM 推理客户端
//!
//! 封装对 OpenAI 兼容视觉 API 的调用：图片读入后以 base64 data URL
//! 形式随提示词一起发送，返回识别出的文本。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use crate::clients::InferenceClient;
use crate::config::Config;
use crate::error::{AppResult, OcrError};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use base64::{engine::general_purpose, Engine as _};
use std::path::Path;
use tracing::{debug, warn};

/// OCR 任务的系统消息
const SYSTEM_PROMPT: &str =
    "你是一个精确的 OCR 助手。你的任务是尽可能准确地识别图片中的全部文字。";

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 创建自定义模型的 LLM 客户端
    pub fn with_model(config: &Config, model_name: impl Into<String>) -> Self {
        let mut client = Self::new(config);
        client.model_name = model_name.into();
        client
    }

    /// 将图片文件编码为 data URL
    async fn encode_image(&self, image_path: &Path) -> AppResult<String> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| OcrError::FileRead {
                path: image_path.display().to_string(),
                source: e,
            })?;
        let encoded = general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{};base64,{}", image_mime(image_path), encoded))
    }
}

/// 按扩展名推断图片 MIME 类型
fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("tiff") | Some("tif") => "image/tiff",
        _ => "image/png",
    }
}

impl InferenceClient for LlmClient {
    async fn infer(&self, image_path: &Path, instructions: &str) -> AppResult<String> {
        debug!(
            "调用 LLM API，模型: {}，图片: {}",
            self.model_name,
            image_path.display()
        );

        let data_url = self.encode_image(image_path).await?;

        // 构建消息列表
        let mut messages = Vec::new();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|e| OcrError::Inference(e.to_string()))?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        // 用户消息：提示词文本 + 图片
        let content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: instructions.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: data_url,
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(
                content_parts,
            ))
            .build()
            .map_err(|e| OcrError::Inference(e.to_string()))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.1)
            .max_tokens(4096u32)
            .build()
            .map_err(|e| OcrError::Inference(e.to_string()))?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            OcrError::Inference(e.to_string())
        })?;

        // 提取响应内容；空白内容是合法返回值，由上层重试策略处理
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        debug!(
            "LLM API 调用成功，响应预览: {}",
            crate::logger::truncate_text(&content, 80)
        );

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_mime_by_extension() {
        assert_eq!(image_mime(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(image_mime(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(image_mime(Path::new("a.tif")), "image/tiff");
        assert_eq!(image_mime(Path::new("a.png")), "image/png");
        assert_eq!(image_mime(Path::new("noext")), "image/png");
    }
}
