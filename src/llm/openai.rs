//! Client for OpenAI-compatible chat completion and image generation APIs.
//!
//! Works against any provider that speaks the `/chat/completions` and
//! `/images/generations` wire format (xAI, OpenAI). Transient failures are
//! retried with exponential backoff; everything else fails immediately.

use super::tools::ToolSpec;
use super::{
    truncate_chars, ChatMessage, ChatModel, Completion, CompletionOutput, GeneratedImage,
    ImageModel, ToolCall, Usage,
};
use crate::config::AdapterConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_retry2::strategy::{jitter, ExponentialBackoff};
use tokio_retry2::{Retry, RetryError};

/// Retries after the first attempt.
const MAX_RETRIES: usize = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);
/// Longest slice of an error body carried into the error message.
const MAX_ERROR_DETAIL: usize = 200;

#[derive(Serialize)]
struct WireMessage<'a> {
    role: super::Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.as_deref(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments },
                }))
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// HTTP plumbing shared by the chat and image clients.
#[derive(Debug, Clone)]
struct ApiClient {
    http_client: reqwest::Client,
    config: AdapterConfig,
    retry_delay: Duration,
}

impl ApiClient {
    fn new(http_client: reqwest::Client, config: AdapterConfig) -> Self {
        Self {
            http_client,
            config,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }

    async fn post_once<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T> {
        let resp = self
            .http_client
            .post(format!("{}/{}", self.config.base_url, path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);
        let message = format!(
            "{} returned {}: {}",
            path,
            status,
            truncate_chars(detail.trim(), MAX_ERROR_DETAIL)
        );

        if status.is_server_error() || status.as_u16() == 429 {
            Err(BotError::Unavailable(message))
        } else {
            Err(BotError::Upstream(message))
        }
    }

    /// POST with retries on transient failures.
    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let base_delay_ms = self.retry_delay.as_millis().max(1) as u64;
        let retry_strategy = ExponentialBackoff::from_millis(base_delay_ms)
            .factor(2)
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .take(MAX_RETRIES);

        Retry::spawn(retry_strategy, || async {
            match self.post_once::<T>(path, &body).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() => {
                    tracing::warn!(path, error = %e, "Transient upstream error, will retry");
                    Err(RetryError::Transient {
                        err: e,
                        retry_after: None,
                    })
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "Upstream request failed");
                    Err(RetryError::Permanent(e))
                }
            }
        })
        .await
    }
}

/// Chat completion client.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    api: ApiClient,
}

impl OpenAiChat {
    pub fn new(http_client: reqwest::Client, config: AdapterConfig) -> Self {
        Self {
            api: ApiClient::new(http_client, config),
        }
    }

    /// Override the first backoff delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.api.retry_delay = delay;
        self
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let messages: Vec<WireMessage<'_>> = messages.iter().map(WireMessage::from).collect();
        let mut body = json!({
            "model": self.api.config.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|tool| json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                }))
                .collect();
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.api.config.model
    }

    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<Completion> {
        let response: ChatResponse = self
            .api
            .post("chat/completions", self.request_body(messages, tools))
            .await?;

        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BotError::Upstream("completion contained no choices".to_string()))?
            .message;

        let output = if !message.tool_calls.is_empty() {
            CompletionOutput::ToolCalls(
                message
                    .tool_calls
                    .into_iter()
                    .map(|call| ToolCall {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect(),
            )
        } else {
            match message.content {
                Some(content) if !content.trim().is_empty() => CompletionOutput::Text(content),
                // Discord rejects empty messages
                _ => return Err(BotError::Upstream("model returned an empty answer".to_string())),
            }
        };

        Ok(Completion { output, usage })
    }
}

/// Image generation client.
#[derive(Debug, Clone)]
pub struct OpenAiImage {
    api: ApiClient,
}

impl OpenAiImage {
    pub fn new(http_client: reqwest::Client, config: AdapterConfig) -> Self {
        Self {
            api: ApiClient::new(http_client, config),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.api.retry_delay = delay;
        self
    }
}

#[async_trait]
impl ImageModel for OpenAiImage {
    fn model_name(&self) -> &str {
        &self.api.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
        let body = json!({
            "model": self.api.config.model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
            "response_format": "url",
        });
        let response: ImageResponse = self.api.post("images/generations", body).await?;

        let image = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BotError::Upstream("image response contained no data".to_string()))?;
        let url = image
            .url
            .ok_or_else(|| BotError::Upstream("image response contained no URL".to_string()))?;

        Ok(GeneratedImage {
            url,
            revised_prompt: image.revised_prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(base_url: String) -> AdapterConfig {
        AdapterConfig {
            api_key: "test-key".to_string(),
            base_url,
            model: "grok-3-mini".to_string(),
        }
    }

    fn chat_client(server: &mockito::Server) -> OpenAiChat {
        OpenAiChat::new(reqwest::Client::new(), config(server.url()))
            .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_text_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "grok-3-mini",
                "messages": [
                    {"role": "system", "content": "be chill"},
                    {"role": "user", "content": "hi"}
                ],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"hey dude"}}],
                "usage":{"prompt_tokens":12,"completion_tokens":3}}"#)
            .create_async()
            .await;

        let completion = chat_client(&server)
            .complete(&[ChatMessage::system("be chill"), ChatMessage::user("hi")], &[])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(completion.output, CompletionOutput::Text("hey dude".to_string()));
        assert_eq!(completion.usage, Usage { prompt_tokens: 12, completion_tokens: 3 });
    }

    #[tokio::test]
    async fn test_tool_call_completion() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "tools": [{"type": "function", "function": {"name": "get_todays_date"}}],
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":null,
                "tool_calls":[{"id":"call_9","type":"function",
                "function":{"name":"get_todays_date","arguments":"{\"timezone\":\"UTC\"}"}}]}}]}"#)
            .create_async()
            .await;

        let tools = vec![super::super::tools::Tool::TodaysDate.spec()];
        let completion = chat_client(&server)
            .complete(&[ChatMessage::user("what day is it")], &tools)
            .await
            .unwrap();

        match completion.output {
            CompletionOutput::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_9");
                assert_eq!(calls[0].arguments, r#"{"timezone":"UTC"}"#);
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body(r#"{"error":{"message":"bad model"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = chat_client(&server).complete(&[ChatMessage::user("hi")], &[]).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, BotError::Upstream(ref msg) if msg.contains("bad model")));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_twice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(1 + MAX_RETRIES)
            .create_async()
            .await;

        let err = chat_client(&server).complete(&[ChatMessage::user("hi")], &[]).await.unwrap_err();

        mock.assert_async().await;
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_long_error_pages_are_clipped() {
        let mut server = mockito::Server::new_async().await;
        let page = format!("<html><body>{}</body></html>", "Bad Gateway ".repeat(420));
        server
            .mock("POST", "/chat/completions")
            .with_status(502)
            .with_header("content-type", "text/html")
            .with_body(page)
            .expect(1 + MAX_RETRIES)
            .create_async()
            .await;

        let err = chat_client(&server)
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(err.to_string().chars().count() < 300);
        let text = crate::commands::Reply::from(err).text().unwrap();
        assert!(text.chars().count() <= crate::llm::DISCORD_MESSAGE_LIMIT);
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_upstream_error() {
        let bodies = [
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
            r#"{"choices":[{"message":{"role":"assistant","content":"  \n "}}]}"#,
        ];

        for body in bodies {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("POST", "/chat/completions")
                .with_status(200)
                .with_body(body)
                .expect(1)
                .create_async()
                .await;

            let err = chat_client(&server)
                .complete(&[ChatMessage::user("hi")], &[])
                .await
                .unwrap_err();

            mock.assert_async().await;
            assert!(matches!(err, BotError::Upstream(ref msg) if msg.contains("empty answer")));
        }
    }

    #[tokio::test]
    async fn test_image_generation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/images/generations")
            .match_body(Matcher::PartialJson(json!({"prompt": "a cat surfing", "n": 1})))
            .with_status(200)
            .with_body(r#"{"created":1,"data":[{"url":"https://img.example.com/cat.png",
                "revised_prompt":"A cat riding a wave"}]}"#)
            .create_async()
            .await;

        let client = OpenAiImage::new(reqwest::Client::new(), config(server.url()))
            .with_retry_delay(Duration::from_millis(1));
        let image = client.generate("a cat surfing").await.unwrap();

        assert_eq!(image.url, "https://img.example.com/cat.png");
        assert_eq!(image.revised_prompt.as_deref(), Some("A cat riding a wave"));
    }
}
