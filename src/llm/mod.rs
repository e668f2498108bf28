//! Chat completion and image generation.
//!
//! The hosted APIs sit behind the [`ChatModel`] and [`ImageModel`] traits so
//! the services below can be tested with in-process stubs. Every service call
//! checks the caller's quota before any request leaves the process.

pub mod history;
pub mod openai;
pub mod quota;
pub mod tools;

pub use history::ChatHistory;
pub use openai::{OpenAiChat, OpenAiImage};
pub use quota::QuotaLimiter;
pub use tools::{ToolRegistry, ToolSpec};

use crate::error::{BotError, Result};
use crate::recorder::{record_best_effort, EventKind, EventRecord, EventRecorder};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Longest message Discord accepts, in characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Maximum number of tool-call rounds before the model must answer.
pub const MAX_TOOL_ROUNDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    /// Calls requested by an assistant turn
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool results; links back to the requesting call
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    fn add(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutput {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub output: CompletionOutput,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    /// Prompt as rewritten by the provider, when it reports one
    pub revised_prompt: Option<String>,
}

/// A hosted chat completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<Completion>;
}

/// A hosted image generation model.
#[async_trait]
pub trait ImageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage>;
}

/// Cut `text` to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Cut `text` to at most `DISCORD_MESSAGE_LIMIT` characters.
pub fn truncate_reply(text: &str) -> String {
    truncate_chars(text, DISCORD_MESSAGE_LIMIT)
}

async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| {
            BotError::Timeout(format!(
                "{} did not answer within {}s",
                what,
                timeout.as_secs()
            ))
        })?
}

/// Shared conversation with the chat model.
pub struct ChatService {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    quota: QuotaLimiter,
    history: Mutex<ChatHistory>,
    recorder: Arc<dyn EventRecorder>,
    timeout: Duration,
}

impl ChatService {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        quota: QuotaLimiter,
        history: ChatHistory,
        recorder: Arc<dyn EventRecorder>,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            tools,
            quota,
            history: Mutex::new(history),
            recorder,
            timeout,
        }
    }

    pub fn quota(&self) -> &QuotaLimiter {
        &self.quota
    }

    /// Send `prompt` to the model and return its answer.
    ///
    /// Tool calls are executed and fed back for at most [`MAX_TOOL_ROUNDS`]
    /// rounds. The exchange is appended to the shared history only when the
    /// model produced an answer.
    ///
    /// # Errors
    ///
    /// [`BotError::QuotaExceeded`] before any request is made, or the
    /// upstream/timeout error of the failing round.
    pub async fn chat(
        &self,
        user_id: u64,
        channel_id: Option<u64>,
        prompt: &str,
    ) -> Result<String> {
        self.quota.try_acquire(user_id)?;

        let mut conversation = self.history.lock().await.messages().to_vec();
        let start = conversation.len();
        conversation.push(ChatMessage::user(prompt));

        let specs = self.tools.specs();
        let mut usage = Usage::default();
        let mut tools_used: Vec<String> = Vec::new();
        let mut answer = None;

        for round in 0..=MAX_TOOL_ROUNDS {
            // The last round offers no tools so the model has to answer
            let offered: &[ToolSpec] = if round < MAX_TOOL_ROUNDS { &specs } else { &[] };
            let completion = with_timeout(
                self.timeout,
                "chat model",
                self.model.complete(&conversation, offered),
            )
            .await?;
            usage.add(completion.usage);

            match completion.output {
                CompletionOutput::Text(text) => {
                    answer = Some(text);
                    break;
                }
                CompletionOutput::ToolCalls(calls) => {
                    tracing::debug!(round, calls = calls.len(), "Model requested tools");
                    conversation.push(ChatMessage::assistant_tool_calls(calls.clone()));
                    for call in calls {
                        let output = with_timeout(self.timeout, &call.name, async {
                            Ok(self.tools.execute(&call.name, &call.arguments).await)
                        })
                        .await
                        .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string());
                        conversation.push(ChatMessage::tool_result(call.id, output));
                        tools_used.push(call.name);
                    }
                }
            }
        }

        let answer = answer.ok_or_else(|| {
            BotError::Upstream("model kept calling tools without answering".to_string())
        })?;
        conversation.push(ChatMessage::assistant(answer.clone()));

        {
            let mut history = self.history.lock().await;
            for message in conversation.into_iter().skip(start) {
                history.push(message);
            }
        }

        let mut event = EventRecord::new(user_id, EventKind::Chat, Utc::now()).with_payload(json!({
            "model": self.model.model_name(),
            "prompt_tokens": usage.prompt_tokens,
            "completion_tokens": usage.completion_tokens,
            "tools": tools_used,
        }));
        if let Some(channel_id) = channel_id {
            event = event.in_channel(channel_id);
        }
        record_best_effort(self.recorder.as_ref(), event).await;

        Ok(truncate_reply(&answer))
    }

    /// Forget the conversation, keeping the system prompt.
    pub async fn clear(&self) {
        self.history.lock().await.clear();
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}

/// Image generation with a per-user quota.
pub struct ImageService {
    model: Arc<dyn ImageModel>,
    quota: QuotaLimiter,
    recorder: Arc<dyn EventRecorder>,
    timeout: Duration,
}

impl ImageService {
    pub fn new(
        model: Arc<dyn ImageModel>,
        quota: QuotaLimiter,
        recorder: Arc<dyn EventRecorder>,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            quota,
            recorder,
            timeout,
        }
    }

    pub fn quota(&self) -> &QuotaLimiter {
        &self.quota
    }

    pub async fn generate(
        &self,
        user_id: u64,
        channel_id: Option<u64>,
        prompt: &str,
    ) -> Result<GeneratedImage> {
        self.quota.try_acquire(user_id)?;

        let image = with_timeout(self.timeout, "image model", self.model.generate(prompt)).await?;

        let mut event = EventRecord::new(user_id, EventKind::Image, Utc::now()).with_payload(json!({
            "model": self.model.model_name(),
            "prompt": prompt,
        }));
        if let Some(channel_id) = channel_id {
            event = event.in_channel(channel_id);
        }
        record_best_effort(self.recorder.as_ref(), event).await;

        Ok(image)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Chat model that replays scripted completions and counts calls.
    #[derive(Default)]
    pub struct ScriptedChat {
        pub calls: AtomicUsize,
        pub script: std::sync::Mutex<VecDeque<Result<Completion>>>,
        pub seen: std::sync::Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedChat {
        pub fn replying(texts: &[&str]) -> Self {
            let chat = Self::default();
            for text in texts {
                chat.push(Ok(Completion {
                    output: CompletionOutput::Text(text.to_string()),
                    usage: Usage { prompt_tokens: 10, completion_tokens: 5 },
                }));
            }
            chat
        }

        pub fn push(&self, completion: Result<Completion>) {
            self.script.lock().unwrap().push_back(completion);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(messages.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Completion {
                    output: CompletionOutput::Text("dude".to_string()),
                    usage: Usage::default(),
                }))
        }
    }

    /// Image model that counts calls.
    #[derive(Default)]
    pub struct CountingImage {
        pub calls: AtomicUsize,
    }

    impl CountingImage {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageModel for CountingImage {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GeneratedImage {
                url: "https://images.example.com/1.png".to_string(),
                revised_prompt: Some(format!("{}, in watercolor", prompt)),
            })
        }
    }

    /// Recorder that drops everything.
    pub struct NullRecorder;

    #[async_trait]
    impl EventRecorder for NullRecorder {
        async fn record(&self, _event: EventRecord) -> Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::QuotaConfig;

    fn quota(max_calls: u32) -> QuotaLimiter {
        QuotaLimiter::new(
            "chat",
            QuotaConfig {
                max_calls,
                window: Duration::from_secs(3600),
            },
        )
    }

    fn chat_service(model: Arc<ScriptedChat>, max_calls: u32) -> ChatService {
        ChatService::new(
            model,
            ToolRegistry::new(reqwest::Client::new(), None),
            quota(max_calls),
            ChatHistory::new("be chill", 20),
            Arc::new(NullRecorder),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_chat_appends_history() {
        let model = Arc::new(ScriptedChat::replying(&["hey", "still here"]));
        let service = chat_service(model.clone(), 10);

        assert_eq!(service.chat(1, None, "hi").await.unwrap(), "hey");
        assert_eq!(service.chat(1, None, "you there?").await.unwrap(), "still here");

        // system + 2 * (user, assistant)
        assert_eq!(service.history_len().await, 5);
        let second_call = &model.seen.lock().unwrap()[1];
        assert_eq!(second_call.len(), 4);
        assert_eq!(second_call[2].content.as_deref(), Some("hey"));

        service.clear().await;
        assert_eq!(service.history_len().await, 1);
    }

    #[tokio::test]
    async fn test_quota_blocks_before_contacting_model() {
        let model = Arc::new(ScriptedChat::default());
        let service = chat_service(model.clone(), 2);

        service.chat(1, None, "one").await.unwrap();
        service.chat(1, None, "two").await.unwrap();
        let err = service.chat(1, None, "three").await.unwrap_err();

        assert!(matches!(err, BotError::QuotaExceeded(_)));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let model = Arc::new(ScriptedChat::default());
        model.push(Ok(Completion {
            output: CompletionOutput::ToolCalls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_todays_date".to_string(),
                arguments: r#"{"timezone":"UTC"}"#.to_string(),
            }]),
            usage: Usage::default(),
        }));
        model.push(Ok(Completion {
            output: CompletionOutput::Text("It's today, bro".to_string()),
            usage: Usage::default(),
        }));
        let service = chat_service(model.clone(), 10);

        assert_eq!(service.chat(1, None, "what day is it").await.unwrap(), "It's today, bro");
        assert_eq!(model.calls(), 2);

        let second_call = model.seen.lock().unwrap()[1].clone();
        let tool_message = second_call.last().unwrap();
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_message.content.as_deref().unwrap().contains("\"today\""));
    }

    #[tokio::test]
    async fn test_tool_loop_is_bounded() {
        let model = Arc::new(ScriptedChat::default());
        for i in 0..10 {
            model.push(Ok(Completion {
                output: CompletionOutput::ToolCalls(vec![ToolCall {
                    id: format!("call_{}", i),
                    name: "get_todays_date".to_string(),
                    arguments: "{}".to_string(),
                }]),
                usage: Usage::default(),
            }));
        }
        let service = chat_service(model.clone(), 10);

        let err = service.chat(1, None, "loop forever").await.unwrap_err();
        assert!(matches!(err, BotError::Upstream(_)));
        assert_eq!(model.calls(), MAX_TOOL_ROUNDS + 1);
        // Failed exchanges leave no trace
        assert_eq!(service.history_len().await, 1);
    }

    #[tokio::test]
    async fn test_long_answers_are_truncated() {
        let long = "a".repeat(2500);
        let model = Arc::new(ScriptedChat::replying(&[&long]));
        let service = chat_service(model, 10);

        assert_eq!(
            service.chat(1, None, "talk").await.unwrap().chars().count(),
            DISCORD_MESSAGE_LIMIT
        );
    }

    #[test]
    fn test_truncate_reply_counts_characters() {
        let text = "é".repeat(2001);
        assert_eq!(truncate_reply(&text).chars().count(), 2000);
        assert_eq!(truncate_reply("short"), "short");
    }

    #[tokio::test]
    async fn test_image_quota() {
        let model = Arc::new(CountingImage::default());
        let service = ImageService::new(
            model.clone(),
            QuotaLimiter::new(
                "image",
                QuotaConfig {
                    max_calls: 1,
                    window: Duration::from_secs(60),
                },
            ),
            Arc::new(NullRecorder),
            Duration::from_secs(5),
        );

        let image = service.generate(1, Some(3), "a cat surfing").await.unwrap();
        assert_eq!(image.revised_prompt.as_deref(), Some("a cat surfing, in watercolor"));
        assert!(matches!(
            service.generate(1, Some(3), "again").await,
            Err(BotError::QuotaExceeded(_))
        ));
        assert_eq!(model.calls(), 1);
    }
}
