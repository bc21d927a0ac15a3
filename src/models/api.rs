use serde::{ Serialize, Deserialize, Deserializer };

use super::chat::ChatMessage;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
}

/// Body shared by `/api/chat` and `/api/chat/stream`. Only `message` is
/// required; a missing model falls back to the configured default. History
/// entries that fail to parse as a `ChatMessage` are dropped rather than
/// failing the request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_history")]
    pub history: Vec<ChatMessage>,
    #[serde(default, rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn lenient_history<'de, D>(deserializer: D) -> Result<Vec<ChatMessage>, D::Error>
    where D: Deserializer<'de>
{
    let entries = Option::<Vec<serde_json::Value>>
        ::deserialize(deserializer)?
        .unwrap_or_default();
    Ok(
        entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect()
    )
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub success: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
