//! Completion client: request shaping, dispatch and provider error classification.
//!
//! Neither entry point returns `Err`. Every failure comes back as a
//! [`CompletionResult`] tagged with a [`ProviderError`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::llm::{
    find_model, ChatMessage, ChatRequest, CompletionBackend, LlmError, StreamChunk, Usage,
};
use crate::prompt::system_prompt;

pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Financial news and exchange sites answers are restricted to.
pub const TRUSTED_DOMAINS: &[&str] = &[
    "moneycontrol.com",
    "economictimes.indiatimes.com",
    "livemint.com",
    "business-standard.com",
    "nseindia.com",
    "bseindia.com",
    "screener.in",
    "reuters.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecencyFilter {
    Hour,
    Day,
    #[default]
    Week,
    Month,
}

impl RecencyFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecencyFilter::Hour => "hour",
            RecencyFilter::Day => "day",
            RecencyFilter::Week => "week",
            RecencyFilter::Month => "month",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "hour" => Some(RecencyFilter::Hour),
            "day" => Some(RecencyFilter::Day),
            "week" => Some(RecencyFilter::Week),
            "month" => Some(RecencyFilter::Month),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub recency_filter: RecencyFilter,
    pub domain_filter: Vec<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            recency_filter: RecencyFilter::default(),
            domain_filter: TRUSTED_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// User-facing provider failure categories. `Display` is the text shown in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Authentication failed. Please check the API key configuration.")]
    Authentication,
    #[error("Rate limit exceeded. Please wait a moment before asking again.")]
    RateLimited,
    #[error("The AI service is having trouble right now. Please try again shortly.")]
    Server,
    #[error("Network error. Please check your internet connection and try again.")]
    Network,
    #[error("API error: {0}")]
    Api(String),
}

impl ProviderError {
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => ProviderError::Authentication,
            429 => ProviderError::RateLimited,
            500..=599 => ProviderError::Server,
            _ if message.trim().is_empty() => ProviderError::Api(format!("HTTP {status}")),
            _ => ProviderError::Api(message.trim().to_string()),
        }
    }
}

impl From<&LlmError> for ProviderError {
    fn from(err: &LlmError) -> Self {
        match err {
            LlmError::Api { status, message } => ProviderError::from_status(*status, message),
            LlmError::Http(e) => match e.status() {
                Some(status) => ProviderError::from_status(status.as_u16(), &e.to_string()),
                None if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() => {
                    ProviderError::Network
                }
                None if e.is_decode() => ProviderError::Api(e.to_string()),
                None => ProviderError::Network,
            },
            LlmError::StreamInterrupted(_) => ProviderError::Network,
            LlmError::Parse(message) | LlmError::Provider(message) => {
                ProviderError::Api(message.clone())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResult {
    /// Full text on success; whatever was streamed before a failure otherwise.
    pub content: String,
    pub related_questions: Vec<String>,
    pub usage: Option<Usage>,
    pub error: Option<ProviderError>,
}

impl CompletionResult {
    pub fn success(
        content: impl Into<String>,
        related_questions: Vec<String>,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            content: content.into(),
            related_questions,
            usage,
            error: None,
        }
    }

    pub fn failure(error: ProviderError, partial_content: impl Into<String>) -> Self {
        Self {
            content: partial_content.into(),
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct CompletionClient {
    backend: Box<dyn CompletionBackend>,
}

impl CompletionClient {
    pub fn new(backend: Box<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    fn build_request(
        prompt: &str,
        model_id: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> Result<ChatRequest, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::Api("prompt must not be empty".to_string()));
        }
        if find_model(model_id).is_none() {
            return Err(ProviderError::Api(format!("unknown model '{model_id}'")));
        }
        Ok(ChatRequest {
            messages: vec![ChatMessage::system(system_prompt()), ChatMessage::user(prompt)],
            model: model_id.to_string(),
            stream,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            search_domain_filter: options.domain_filter.clone(),
            search_recency_filter: options.recency_filter.as_str().to_string(),
        })
    }

    pub async fn complete(
        &self,
        prompt: &str,
        model_id: &str,
        options: &CompletionOptions,
    ) -> CompletionResult {
        let request = match Self::build_request(prompt, model_id, options, false) {
            Ok(request) => request,
            Err(e) => return CompletionResult::failure(e, String::new()),
        };
        info!(model = model_id, stream = false, "dispatching completion");

        match self.backend.chat(&request).await {
            Ok(resp) => {
                log_usage(model_id, resp.usage);
                CompletionResult::success(resp.content, resp.related_questions, resp.usage)
            }
            Err(e) => {
                warn!(model = model_id, error = %e, "completion failed");
                CompletionResult::failure(ProviderError::from(&e), String::new())
            }
        }
    }

    /// Each delta reaches `on_delta` in provider order before the next is read.
    pub async fn complete_streaming(
        &self,
        prompt: &str,
        model_id: &str,
        options: &CompletionOptions,
        on_delta: &mut (dyn FnMut(&str) + '_),
    ) -> CompletionResult {
        let request = match Self::build_request(prompt, model_id, options, true) {
            Ok(request) => request,
            Err(e) => return CompletionResult::failure(e, String::new()),
        };
        info!(model = model_id, stream = true, "dispatching completion");

        let mut delivered = String::new();
        let outcome = {
            let mut forward = |chunk: StreamChunk| {
                if !chunk.done && !chunk.delta.is_empty() {
                    delivered.push_str(&chunk.delta);
                    on_delta(&chunk.delta);
                }
            };
            self.backend.chat_stream(&request, &mut forward).await
        };

        match outcome {
            Ok(resp) => {
                log_usage(model_id, resp.usage);
                CompletionResult::success(delivered, resp.related_questions, resp.usage)
            }
            Err(e) => {
                warn!(
                    model = model_id,
                    error = %e,
                    partial_len = delivered.len(),
                    "streamed completion failed"
                );
                CompletionResult::failure(ProviderError::from(&e), delivered)
            }
        }
    }
}

fn log_usage(model_id: &str, usage: Option<Usage>) {
    if let Some(usage) = usage {
        debug!(
            model = model_id,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "completion usage"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend shared by the client and orchestrator tests.

    use super::*;
    use async_trait::async_trait;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use tokio::sync::Notify;

    #[derive(Clone)]
    pub enum Script {
        Reply {
            deltas: Vec<String>,
            related: Vec<String>,
        },
        FailBeforeStream(u16, String),
        FailMidStream {
            deltas: Vec<String>,
        },
        Offline,
    }

    impl Script {
        pub fn reply(deltas: &[&str]) -> Self {
            Script::Reply {
                deltas: deltas.iter().map(|d| d.to_string()).collect(),
                related: Vec::new(),
            }
        }
    }

    /// Deterministic backend: plays back one script, counts calls, optionally
    /// waits on a gate before answering.
    pub struct ScriptedBackend {
        pub script: RefCell<Script>,
        pub calls: Rc<Cell<usize>>,
        pub requests: Rc<RefCell<Vec<ChatRequest>>>,
        pub gate: Option<Rc<Notify>>,
    }

    impl ScriptedBackend {
        pub fn new(script: Script) -> Self {
            Self {
                script: RefCell::new(script),
                calls: Rc::new(Cell::new(0)),
                requests: Rc::new(RefCell::new(Vec::new())),
                gate: None,
            }
        }

        pub fn gated(script: Script, gate: Rc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(script)
            }
        }

        async fn enter(&self, request: &ChatRequest) -> Script {
            self.calls.set(self.calls.get() + 1);
            self.requests.borrow_mut().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.script.borrow().clone()
        }
    }

    #[async_trait(?Send)]
    impl CompletionBackend for ScriptedBackend {
        async fn chat(&self, request: &ChatRequest) -> Result<crate::llm::ChatResponse, LlmError> {
            match self.enter(request).await {
                Script::Reply { deltas, related } => Ok(crate::llm::ChatResponse {
                    content: deltas.concat(),
                    model: request.model.clone(),
                    usage: Some(Usage {
                        prompt_tokens: 1,
                        completion_tokens: deltas.len() as u32,
                        total_tokens: 1 + deltas.len() as u32,
                    }),
                    related_questions: related,
                }),
                Script::FailBeforeStream(status, message) => Err(LlmError::Api { status, message }),
                Script::FailMidStream { .. } => {
                    Err(LlmError::StreamInterrupted("connection reset".into()))
                }
                Script::Offline => Err(LlmError::StreamInterrupted("offline".into())),
            }
        }

        async fn chat_stream(
            &self,
            request: &ChatRequest,
            on_chunk: &mut (dyn FnMut(StreamChunk) + '_),
        ) -> Result<crate::llm::ChatResponse, LlmError> {
            match self.enter(request).await {
                Script::Reply { deltas, related } => {
                    for delta in &deltas {
                        tokio::task::yield_now().await;
                        on_chunk(StreamChunk {
                            delta: delta.clone(),
                            done: false,
                        });
                    }
                    on_chunk(StreamChunk {
                        delta: String::new(),
                        done: true,
                    });
                    Ok(crate::llm::ChatResponse {
                        content: deltas.concat(),
                        model: request.model.clone(),
                        usage: None,
                        related_questions: related,
                    })
                }
                Script::FailBeforeStream(status, message) => Err(LlmError::Api { status, message }),
                Script::FailMidStream { deltas } => {
                    for delta in deltas {
                        on_chunk(StreamChunk { delta, done: false });
                    }
                    Err(LlmError::StreamInterrupted("connection reset".into()))
                }
                Script::Offline => Err(LlmError::StreamInterrupted("offline".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Script, ScriptedBackend};
    use super::*;

    fn client(script: Script) -> (CompletionClient, std::rc::Rc<std::cell::Cell<usize>>) {
        let backend = ScriptedBackend::new(script);
        let calls = backend.calls.clone();
        (CompletionClient::new(Box::new(backend)), calls)
    }

    #[test]
    fn test_default_options() {
        let options = CompletionOptions::default();
        assert_eq!(options.temperature, 0.2);
        assert_eq!(options.max_tokens, 1000);
        assert_eq!(options.recency_filter.as_str(), "week");
        assert_eq!(options.domain_filter.len(), TRUSTED_DOMAINS.len());
    }

    #[test]
    fn test_recency_filter_parse() {
        assert_eq!(RecencyFilter::parse(" Day "), Some(RecencyFilter::Day));
        assert_eq!(RecencyFilter::parse("month"), Some(RecencyFilter::Month));
        assert_eq!(RecencyFilter::parse("year"), None);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderError::from_status(401, "x"), ProviderError::Authentication);
        assert_eq!(ProviderError::from_status(403, "x"), ProviderError::Authentication);
        assert_eq!(ProviderError::from_status(429, "slow down"), ProviderError::RateLimited);
        assert_eq!(ProviderError::from_status(503, "x"), ProviderError::Server);
        assert_eq!(
            ProviderError::from_status(400, "invalid model"),
            ProviderError::Api("invalid model".into())
        );
        assert_eq!(
            ProviderError::from_status(422, " "),
            ProviderError::Api("HTTP 422".into())
        );
        assert_eq!(
            ProviderError::from(&LlmError::StreamInterrupted("eof".into())),
            ProviderError::Network
        );
    }

    #[tokio::test]
    async fn test_complete_returns_content_and_related() {
        let (client, _) = client(Script::Reply {
            deltas: vec!["Buy ".into(), "TCS.".into()],
            related: vec!["TCS dividend history?".into()],
        });
        let result = client
            .complete("Is TCS a buy?", "sonar", &CompletionOptions::default())
            .await;
        assert!(result.is_success());
        assert_eq!(result.content, "Buy TCS.");
        assert_eq!(result.related_questions, vec!["TCS dividend history?"]);
        assert!(result.usage.is_some());
    }

    #[tokio::test]
    async fn test_invalid_inputs_never_reach_provider() {
        let (client, calls) = client(Script::reply(&["unused"]));
        let options = CompletionOptions::default();

        let empty = client.complete("   ", "sonar", &options).await;
        assert!(matches!(empty.error, Some(ProviderError::Api(_))));

        let unknown = client
            .complete_streaming("Is TCS a buy?", "gpt-4o", &options, &mut |_d: &str| {})
            .await;
        assert!(matches!(unknown.error, Some(ProviderError::Api(_))));
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_streaming_matches_single_shot() {
        let script = Script::reply(&["Reliance ", "is a ", "hold."]);
        let options = CompletionOptions::default();
        let (single, _) = client(script.clone());
        let (streaming, _) = client(script);

        let a = single.complete("RELIANCE view?", "sonar-pro", &options).await;
        let mut deltas = Vec::new();
        let b = streaming
            .complete_streaming("RELIANCE view?", "sonar-pro", &options, &mut |d: &str| {
                deltas.push(d.to_string())
            })
            .await;

        assert_eq!(a.content, b.content);
        assert_eq!(deltas, vec!["Reliance ", "is a ", "hold."]);
    }

    #[tokio::test]
    async fn test_streaming_failure_keeps_partial() {
        let (client, _) = client(Script::FailMidStream {
            deltas: vec!["Partial ".into(), "answer".into()],
        });
        let mut seen = String::new();
        let result = client
            .complete_streaming(
                "INFY outlook",
                "sonar",
                &CompletionOptions::default(),
                &mut |d: &str| seen.push_str(d),
            )
            .await;
        assert_eq!(result.error, Some(ProviderError::Network));
        assert_eq!(result.content, "Partial answer");
        assert_eq!(seen, "Partial answer");
    }

    #[tokio::test]
    async fn test_rate_limit_classified() {
        let (client, _) = client(Script::FailBeforeStream(429, "quota".into()));
        let result = client
            .complete("NIFTY outlook", "sonar", &CompletionOptions::default())
            .await;
        assert_eq!(result.error, Some(ProviderError::RateLimited));
        assert!(result.content.is_empty());
    }

    #[tokio::test]
    async fn test_request_carries_system_prompt_and_filters() {
        let backend = ScriptedBackend::new(Script::reply(&["ok"]));
        let requests = backend.requests.clone();
        let client = CompletionClient::new(Box::new(backend));
        client
            .complete("SBIN news", "sonar", &CompletionOptions::default())
            .await;

        let requests = requests.borrow();
        let request = &requests[0];
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, system_prompt());
        assert_eq!(request.messages[1].content, "SBIN news");
        assert_eq!(request.search_recency_filter, "week");
        assert!(!request.stream);
    }
}
