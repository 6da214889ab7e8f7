use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::services::ai::{
    BackendError, ContentGenerator, Prompt, Segment, Transcriber, Transcript, VisionAnalyzer,
};

const WHISPER_MODEL: &str = "@cf/openai/whisper-large-v3-turbo";
const LLAVA_MODEL: &str = "@cf/llava-hf/llava-1.5-7b-hf";
const CHAT_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

const VISION_PROMPT: &str = "Describe this image in detail for a social media manager: \
the subject, setting, mood, colours, any visible text, and what makes it engaging.";

/// Client for Cloudflare Workers AI (Whisper, LLaVA and Llama models).
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Serialize)]
struct WhisperRequest<'a> {
    audio: String,
    task: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Deserialize)]
struct WhisperResult {
    text: String,
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    transcription_info: Option<TranscriptionInfo>,
}

#[derive(Deserialize)]
struct TranscriptionInfo {
    language: Option<String>,
}

#[derive(Serialize)]
struct LlavaRequest {
    image: String,
    prompt: &'static str,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct LlavaResult {
    description: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResult {
    response: String,
}

impl WorkersAiClient {
    pub fn new(account_id: &str, api_token: &str) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| BackendError::Fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, model
        )
    }

    async fn run<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        model: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .http
            .post(self.model_url(model))
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(BackendError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, &body));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| BackendError::Fatal(format!("unexpected {model} response: {e}")))?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl Transcriber for WorkersAiClient {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<Transcript, BackendError> {
        let request = WhisperRequest {
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            task: "translate",
            language,
        };

        let result: WhisperResult = self.run(WHISPER_MODEL, &request).await?;
        Ok(Transcript {
            text: result.text,
            segments: result.segments,
            language: result.transcription_info.and_then(|info| info.language),
        })
    }
}

#[async_trait]
impl VisionAnalyzer for WorkersAiClient {
    async fn describe(&self, image: &[u8]) -> Result<String, BackendError> {
        let request = LlavaRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image),
            prompt: VISION_PROMPT,
            max_tokens: 512,
        };

        let result: LlavaResult = self.run(LLAVA_MODEL, &request).await?;
        Ok(result.description.trim().to_string())
    }
}

#[async_trait]
impl ContentGenerator for WorkersAiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: 1000,
            temperature: 0.7,
        };

        let result: ChatResult = self.run(CHAT_MODEL, &request).await?;
        Ok(result.response)
    }
}
