pub mod gemini;

use async_trait::async_trait;
use futures::Stream;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::pin::Pin;
use thiserror::Error;

pub const TEMPERATURE: f32 = 0.7;
pub const MAX_OUTPUT_TOKENS: u32 = 8192;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("GOOGLE_AI_API_KEY is not configured")]
    MissingApiKey,
    #[error("request to the model API failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Gemini API Error: {message}")]
    Api {
        status: u16,
        message: String,
    },
}

// Request URLs carry the API key in the query string; errors are stored with
// the URL stripped.
impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Request(e.without_url())
    }
}

/// One piece of streamed model output. `thought` marks reasoning-trace text;
/// providers that never set the flag produce plain answer fragments.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamFragment {
    pub text: String,
    pub thought: bool,
}

pub type FragmentStream = Pin<
    Box<dyn Stream<Item = Result<StreamFragment, UpstreamError>> + Send>
>;

#[derive(Clone, Copy, Debug)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub thinking: bool,
    pub thinking_budget: Option<i32>,
}

impl GenerationOptions {
    pub fn for_profile(profile: &ModelProfile, thinking_budget: Option<i32>) -> Self {
        Self {
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            thinking: profile.thinking,
            thinking_budget,
        }
    }
}

/// Per-model behavior knobs: how much history the prompt carries, how many
/// times a failed stream open is attempted, and whether the model accepts a
/// thinking config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelProfile {
    pub history_window: usize,
    pub max_attempts: u32,
    pub thinking: bool,
}

static MODEL_PROFILES: Lazy<HashMap<&'static str, ModelProfile>> = Lazy::new(|| {
    HashMap::from([
        (
            "gemini-2.5-flash",
            ModelProfile { history_window: 10, max_attempts: 1, thinking: true },
        ),
        (
            "gemini-2.5-pro",
            ModelProfile { history_window: 5, max_attempts: 3, thinking: true },
        ),
        (
            "gemini-1.5-flash",
            ModelProfile { history_window: 10, max_attempts: 1, thinking: false },
        ),
        (
            "gemini-1.5-pro",
            ModelProfile { history_window: 5, max_attempts: 3, thinking: false },
        ),
    ])
});

/// Looks up the capability profile for a model id. Ids not in the table fall
/// back to a name heuristic: pro-tier models get the small history window and
/// the retry budget, everything else streams once with the wide window.
pub fn profile_for(model: &str) -> ModelProfile {
    if let Some(profile) = MODEL_PROFILES.get(model) {
        return *profile;
    }
    if model.contains("pro") {
        ModelProfile { history_window: 5, max_attempts: 3, thinking: true }
    } else {
        ModelProfile { history_window: 10, max_attempts: 1, thinking: true }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Full-response generation for the non-streaming chat endpoint.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions
    ) -> Result<String, UpstreamError>;

    /// Opens a streamed generation. Errors returned here mean the stream
    /// never started and the call may be retried; errors yielded by the
    /// stream itself happened mid-response.
    async fn stream_generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions
    ) -> Result<FragmentStream, UpstreamError>;
}
