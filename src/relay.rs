use futures_util::StreamExt;
use log::{ error, info, warn };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::llm::{ profile_for, ChatBackend, GenerationOptions, ModelProfile, UpstreamError };
use crate::models::api::ChatRequest;
use crate::models::chat::ChatMessage;
use crate::models::stream::StreamEvent;
use crate::prompt::build_prompt;

/// Delay before the next attempt: 2s, 4s, 8s for attempts 1 through 3.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt)
}

/// Bridges chat requests to the model backend. Streamed responses are pumped
/// through a channel by a spawned task; a client disconnect does not cancel
/// an in-flight retry wait, and the task stops at the next failed send.
#[derive(Clone)]
pub struct StreamRelay {
    backend: Arc<dyn ChatBackend>,
    default_model: String,
    thinking_budget: Option<i32>,
}

impl StreamRelay {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        default_model: impl Into<String>,
        thinking_budget: Option<i32>
    ) -> Self {
        Self {
            backend,
            default_model: default_model.into(),
            thinking_budget,
        }
    }

    fn resolve(&self, request: &ChatRequest) -> (String, ModelProfile, String) {
        let model = request.model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());
        let profile = profile_for(&model);
        let prompt = build_prompt(
            &request.message,
            &request.history,
            request.system_prompt.as_deref(),
            profile.history_window
        );
        (model, profile, prompt)
    }

    /// Non-streaming completion: one attempt, no thinking trace. Retry and
    /// backoff are a streaming policy only.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage, UpstreamError> {
        let (model, profile, prompt) = self.resolve(request);
        let options = GenerationOptions {
            thinking: false,
            thinking_budget: None,
            ..GenerationOptions::for_profile(&profile, self.thinking_budget)
        };
        let text = self.backend.generate(&model, &prompt, &options).await?;
        Ok(ChatMessage::assistant(text))
    }

    /// Streams the model reply as classified events. The sequence ends with
    /// exactly one `done` event, or one `error` event if the stream could not
    /// be opened within the model's attempt budget or broke mid-response.
    pub fn chat_stream(&self, request: ChatRequest) -> ReceiverStream<StreamEvent> {
        let (model, profile, prompt) = self.resolve(&request);
        let options = GenerationOptions::for_profile(&profile, self.thinking_budget);
        let backend = self.backend.clone();
        let request_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut opened = None;
            let mut last_error: Option<UpstreamError> = None;

            for attempt in 1..=profile.max_attempts {
                match backend.stream_generate(&model, &prompt, &options).await {
                    Ok(stream) => {
                        opened = Some(stream);
                        break;
                    }
                    Err(UpstreamError::MissingApiKey) => {
                        last_error = Some(UpstreamError::MissingApiKey);
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "[{}] attempt {}/{} against {} failed: {}",
                            request_id,
                            attempt,
                            profile.max_attempts,
                            model,
                            e
                        );
                        last_error = Some(e);
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }

            let mut stream = match opened {
                Some(stream) => stream,
                None => {
                    let message = last_error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "upstream call failed".to_string());
                    error!("[{}] giving up on {}: {}", request_id, model, message);
                    let _ = tx.send(StreamEvent::error(message)).await;
                    return;
                }
            };

            info!("[{}] streaming {} response", request_id, model);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(fragment) => {
                        let event = if fragment.thought {
                            StreamEvent::thinking(fragment.text)
                        } else {
                            StreamEvent::content(fragment.text)
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!("[{}] stream from {} broke mid-response: {}", request_id, model, e);
                        let _ = tx.send(StreamEvent::error(e.to_string())).await;
                        return;
                    }
                }
            }
            let _ = tx.send(StreamEvent::done()).await;
        });

        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::gemini::GeminiClient;
    use crate::llm::{ FragmentStream, StreamFragment };
    use crate::models::chat::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    enum Script {
        Fail(&'static str),
        MissingKey,
        Fragments(Vec<Result<StreamFragment, UpstreamError>>),
    }

    struct ScriptedBackend {
        script: Mutex<VecDeque<Script>>,
        seen: Mutex<Vec<(String, String, GenerationOptions)>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn seen(&self, index: usize) -> (String, String, GenerationOptions) {
            self.seen.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn generate(
            &self,
            model: &str,
            prompt: &str,
            options: &GenerationOptions
        ) -> Result<String, UpstreamError> {
            self.seen.lock().unwrap().push((model.to_string(), prompt.to_string(), *options));
            Ok("full response".to_string())
        }

        async fn stream_generate(
            &self,
            model: &str,
            prompt: &str,
            options: &GenerationOptions
        ) -> Result<FragmentStream, UpstreamError> {
            self.seen.lock().unwrap().push((model.to_string(), prompt.to_string(), *options));
            match self.script.lock().unwrap().pop_front() {
                Some(Script::Fail(message)) =>
                    Err(UpstreamError::Api { status: 503, message: message.to_string() }),
                Some(Script::MissingKey) => Err(UpstreamError::MissingApiKey),
                Some(Script::Fragments(items)) => Ok(Box::pin(futures::stream::iter(items))),
                None => Err(UpstreamError::Api { status: 500, message: "unscripted".to_string() }),
            }
        }
    }

    fn request(model: Option<&str>, message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            history: Vec::new(),
            system_prompt: None,
            model: model.map(|m| m.to_string()),
        }
    }

    fn fragment(text: &str, thought: bool) -> Result<StreamFragment, UpstreamError> {
        Ok(StreamFragment { text: text.to_string(), thought })
    }

    #[tokio::test]
    async fn fragments_become_classified_events_with_one_done() {
        let backend = ScriptedBackend::new(
            vec![
                Script::Fragments(
                    vec![fragment("plan", true), fragment("Hello", false), fragment(" world", false)]
                )
            ]
        );
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", None);
        let events: Vec<StreamEvent> = relay
            .chat_stream(request(Some("gemini-2.5-flash"), "hi"))
            .collect().await;
        assert_eq!(events, vec![
            StreamEvent::thinking("plan"),
            StreamEvent::content("Hello"),
            StreamEvent::content(" world"),
            StreamEvent::done()
        ]);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flash_failure_gets_one_attempt_and_one_error() {
        let backend = ScriptedBackend::new(vec![Script::Fail("unavailable")]);
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", None);
        let started = Instant::now();
        let events: Vec<StreamEvent> = relay
            .chat_stream(request(Some("gemini-2.5-flash"), "hi"))
            .collect().await;
        assert_eq!(events, vec![StreamEvent::error("Gemini API Error: unavailable")]);
        assert_eq!(backend.calls(), 1);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn pro_exhaustion_takes_three_attempts_spaced_out() {
        let backend = ScriptedBackend::new(
            vec![Script::Fail("first"), Script::Fail("second"), Script::Fail("third")]
        );
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", None);
        let started = Instant::now();
        let events: Vec<StreamEvent> = relay
            .chat_stream(request(Some("gemini-2.5-pro"), "hi"))
            .collect().await;
        assert_eq!(events, vec![StreamEvent::error("Gemini API Error: third")]);
        assert_eq!(backend.calls(), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(14), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(15), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn pro_recovers_on_a_later_attempt() {
        let backend = ScriptedBackend::new(
            vec![Script::Fail("first"), Script::Fragments(vec![fragment("ok", false)])]
        );
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", None);
        let started = Instant::now();
        let events: Vec<StreamEvent> = relay
            .chat_stream(request(Some("gemini-2.5-pro"), "hi"))
            .collect().await;
        assert_eq!(events, vec![StreamEvent::content("ok"), StreamEvent::done()]);
        assert_eq!(backend.calls(), 2);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(3), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn mid_stream_errors_are_terminal_without_retry() {
        let backend = ScriptedBackend::new(
            vec![
                Script::Fragments(
                    vec![
                        fragment("partial", false),
                        Err(UpstreamError::Api {
                            status: 502,
                            message: "connection reset".to_string(),
                        })
                    ]
                )
            ]
        );
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", None);
        let events: Vec<StreamEvent> = relay
            .chat_stream(request(Some("gemini-2.5-pro"), "hi"))
            .collect().await;
        assert_eq!(events, vec![
            StreamEvent::content("partial"),
            StreamEvent::error("Gemini API Error: connection reset")
        ]);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_never_leak_the_api_key() {
        let backend = Arc::new(
            GeminiClient::new(Some("super-secret-key".to_string()), "http://127.0.0.1:1".to_string())
        );
        let relay = StreamRelay::new(backend, "gemini-2.5-flash", None);
        let events: Vec<StreamEvent> = relay.chat_stream(request(None, "hi")).collect().await;

        assert_eq!(events.len(), 1, "events were {:?}", events);
        match &events[0] {
            StreamEvent::Error { error } => {
                assert!(!error.contains("super-secret-key"), "event was {}", error);
                assert!(!error.contains("key="), "event was {}", error);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_key_fails_fast_even_for_pro_models() {
        let backend = ScriptedBackend::new(vec![Script::MissingKey]);
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", None);
        let started = Instant::now();
        let events: Vec<StreamEvent> = relay
            .chat_stream(request(Some("gemini-2.5-pro"), "hi"))
            .collect().await;
        assert_eq!(events, vec![StreamEvent::error("GOOGLE_AI_API_KEY is not configured")]);
        assert_eq!(backend.calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn requests_without_a_model_use_the_configured_default() {
        let backend = ScriptedBackend::new(vec![Script::Fragments(Vec::new())]);
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", Some(512));
        let events: Vec<StreamEvent> = relay.chat_stream(request(None, "hi")).collect().await;
        assert_eq!(events, vec![StreamEvent::done()]);

        let (model, _, options) = backend.seen(0);
        assert_eq!(model, "gemini-2.5-flash");
        assert!(options.thinking);
        assert_eq!(options.thinking_budget, Some(512));
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.max_output_tokens, 8192);
    }

    #[tokio::test]
    async fn pro_requests_carry_the_narrow_history_window() {
        let history: Vec<ChatMessage> = (1..=10)
            .map(|i| ChatMessage {
                role: Role::User,
                content: format!("turn-{}", i),
                reasoning: None,
                timestamp: 0,
            })
            .collect();
        let backend = ScriptedBackend::new(vec![Script::Fragments(Vec::new())]);
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", None);
        let mut req = request(Some("gemini-2.5-pro"), "hi");
        req.history = history;
        let _events: Vec<StreamEvent> = relay.chat_stream(req).collect().await;

        let (_, prompt, _) = backend.seen(0);
        assert!(!prompt.contains("turn-5\n"));
        assert!(prompt.contains("turn-6\n"));
        assert!(prompt.contains("turn-10\n"));
    }

    #[tokio::test]
    async fn chat_wraps_the_reply_as_an_assistant_message() {
        let backend = ScriptedBackend::new(Vec::new());
        let relay = StreamRelay::new(backend.clone(), "gemini-2.5-flash", Some(512));
        let message = relay.chat(&request(None, "hi")).await.unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "full response");
        assert!(message.reasoning.is_none());
        assert!(message.timestamp > 0);

        let (_, _, options) = backend.seen(0);
        assert!(!options.thinking);
        assert_eq!(options.thinking_budget, None);
    }
}
