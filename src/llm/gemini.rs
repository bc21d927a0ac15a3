use async_trait::async_trait;
use futures_util::StreamExt;
use log::{ debug, warn };
use reqwest::{ Client, StatusCode };
use serde::{ Deserialize, Serialize };
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ ChatBackend, FragmentStream, GenerationOptions, StreamFragment, UpstreamError };

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    include_thoughts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_budget: Option<i32>,
}

#[derive(Deserialize)]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

impl GeminiChunk {
    fn fragments(self) -> Vec<StreamFragment> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Vec::new();
        };
        let Some(content) = candidate.content else {
            return Vec::new();
        };
        content.parts
            .into_iter()
            .filter_map(|part| {
                let text = part.text?;
                if text.is_empty() {
                    return None;
                }
                Some(StreamFragment { text, thought: part.thought })
            })
            .collect()
    }
}

/// Parses one line of an `alt=sse` response. Lines that are not `data:`
/// frames (blank keep-alives, comments) produce nothing; frames that fail to
/// parse are logged and skipped.
fn parse_stream_line(line: &str) -> Vec<StreamFragment> {
    let Some(data) = line.strip_prefix("data:") else {
        return Vec::new();
    };
    let data = data.trim();
    if data.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<GeminiChunk>(data) {
        Ok(chunk) => chunk.fragments(),
        Err(e) => {
            warn!("Skipping unparseable stream frame: {}", e);
            Vec::new()
        }
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<GeminiErrorBody>(body) {
        return parsed.error.message;
    }
    let snippet: String = body.trim().chars().take(200).collect();
    if snippet.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, snippet)
    }
}

fn request_payload(prompt: &str, options: &GenerationOptions) -> GenerateRequest {
    let thinking_config = options.thinking.then(|| ThinkingConfig {
        include_thoughts: true,
        thinking_budget: options.thinking_budget,
    });
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part { text: prompt.to_string() }],
        }],
        generation_config: GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
            thinking_config,
        },
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiClient {
    /// A missing or empty key is allowed at construction time; every call
    /// made without one fails with `MissingApiKey`.
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            api_key: api_key.filter(|key| !key.is_empty()),
            base_url,
        }
    }

    fn api_key(&self) -> Result<&str, UpstreamError> {
        self.api_key.as_deref().ok_or(UpstreamError::MissingApiKey)
    }

    async fn status_error(response: reqwest::Response) -> UpstreamError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        UpstreamError::Api {
            status: status.as_u16(),
            message: error_message(status, &body),
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions
    ) -> Result<String, UpstreamError> {
        let key = self.api_key()?;
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, key);
        debug!("Gemini generate: model={}", model);

        let response = self.http
            .post(&url)
            .json(&request_payload(prompt, options)).send().await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let chunk: GeminiChunk = response.json().await?;
        let text: String = chunk
            .fragments()
            .into_iter()
            .filter(|fragment| !fragment.thought)
            .map(|fragment| fragment.text)
            .collect();
        if text.is_empty() {
            Ok("No response generated".to_string())
        } else {
            Ok(text)
        }
    }

    async fn stream_generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions
    ) -> Result<FragmentStream, UpstreamError> {
        let key = self.api_key()?;
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url,
            model,
            key
        );
        debug!("Gemini stream open: model={}", model);

        let response = self.http
            .post(&url)
            .json(&request_payload(prompt, options)).send().await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            // Network chunks can split a line mid-character; decode only
            // complete lines out of the byte buffer.
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        buffer.extend_from_slice(&buf);
                        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=newline).collect();
                            let line = String::from_utf8_lossy(&line);
                            for fragment in parse_stream_line(line.trim_end()) {
                                if tx.send(Ok(fragment)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(UpstreamError::from(e))).await;
                        return;
                    }
                }
            }
            if !buffer.is_empty() {
                let line = String::from_utf8_lossy(&buffer);
                for fragment in parse_stream_line(line.trim_end()) {
                    if tx.send(Ok(fragment)).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
