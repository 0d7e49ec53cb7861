//! Language model abstractions and the Gemini client.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{ModelConfig, ToolCallEncoding};
use crate::error::{ChatError, Result};
use crate::marker::{self, MarkerReply};
use crate::message::{Role, ToolCall, Turn};
use crate::tool::ToolDescription;

/// Outcome of one completion request.
///
/// The two tool-call encodings (structured function calling and the
/// marker-text fallback) both decode into this same variant set; the
/// conversation loop never sees which one was in play.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCalls {
        calls: Vec<ToolCall>,
        /// Raw assistant text that accompanied the calls, possibly empty.
        content: String,
    },
}

/// Boundary abstraction over the hosted model.
///
/// `system_prompt` is prepended on every invocation and is never part of the
/// transcript. Implementations must either return a [`ModelReply`] or raise a
/// declared error kind; dropping tool calls silently is not an option.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        tools: &[ToolDescription],
        transcript: &[Turn],
    ) -> Result<ModelReply>;
}

fn status_error(status: reqwest::StatusCode, body: &str) -> ChatError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return ChatError::ModelUnavailable(format!("gemini returned {status}: {body}"));
    }
    ChatError::LanguageModel(format!("gemini request failed with {status}: {body}"))
}

/// Client for the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
    temperature: f32,
    max_output_tokens: u32,
    max_retries: u32,
    encoding: ToolCallEncoding,
}

impl GeminiClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| ChatError::LanguageModel("missing Gemini API key in model config".into()))?;
        let endpoint = cfg
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|err| ChatError::LanguageModel(format!("http client error: {err}")))?,
            model: cfg.model.clone(),
            api_key,
            endpoint,
            temperature: cfg.temperature,
            max_output_tokens: cfg.max_output_tokens,
            max_retries: cfg.max_retries,
            encoding: cfg.tool_call_encoding,
        })
    }

    /// Map transcript turns to Gemini `contents`.
    ///
    /// Tool turns carry only a call id, while `functionResponse` parts need
    /// the function name, so assistant turns feed an id-to-name map as we go.
    fn to_contents(&self, transcript: &[Turn]) -> Vec<Value> {
        let mut call_names: HashMap<String, String> = HashMap::new();
        let mut contents = Vec::new();

        for turn in transcript {
            match turn.role {
                Role::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": turn.content}],
                    }));
                }
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !turn.content.is_empty() {
                        parts.push(json!({"text": turn.content}));
                    }
                    for call in &turn.tool_calls {
                        call_names.insert(call.id.clone(), call.name.clone());
                        if self.encoding == ToolCallEncoding::Structured {
                            parts.push(json!({
                                "functionCall": {"name": call.name, "args": call.arguments},
                            }));
                        }
                    }
                    if parts.is_empty() {
                        parts.push(json!({"text": ""}));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                Role::Tool => {
                    let name = turn
                        .tool_call_id
                        .as_ref()
                        .and_then(|id| call_names.get(id).cloned())
                        .unwrap_or_else(|| "unknown".to_string());
                    let part = match self.encoding {
                        ToolCallEncoding::Structured => {
                            let response: Value = serde_json::from_str(&turn.content)
                                .unwrap_or_else(|_| Value::String(turn.content.clone()));
                            json!({
                                "functionResponse": {
                                    "name": name,
                                    "response": {"content": response},
                                },
                            })
                        }
                        ToolCallEncoding::Marker => {
                            json!({"text": format!("Result of {name}:\n{}", turn.content)})
                        }
                    };
                    contents.push(json!({"role": "user", "parts": [part]}));
                }
            }
        }
        contents
    }

    fn to_tools(&self, tools: &[ToolDescription]) -> Option<Value> {
        if self.encoding != ToolCallEncoding::Structured || tools.is_empty() {
            return None;
        }
        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool
                        .parameters
                        .clone()
                        .unwrap_or_else(|| json!({"type": "object"})),
                })
            })
            .collect();
        Some(json!([{"functionDeclarations": declarations}]))
    }

    fn system_instruction(&self, system_prompt: &str, tools: &[ToolDescription]) -> String {
        match self.encoding {
            ToolCallEncoding::Structured => system_prompt.to_string(),
            ToolCallEncoding::Marker if tools.is_empty() => system_prompt.to_string(),
            ToolCallEncoding::Marker => {
                format!("{system_prompt}\n\n{}", marker::catalog_prompt(tools))
            }
        }
    }

    async fn request_once(
        &self,
        system_prompt: &str,
        tools: &[ToolDescription],
        transcript: &[Turn],
    ) -> Result<ModelReply> {
        let payload = json!({
            "systemInstruction": {
                "parts": [{"text": self.system_instruction(system_prompt, tools)}],
            },
            "contents": self.to_contents(transcript),
            "tools": self.to_tools(tools),
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            },
        });

        let resp = self
            .http
            .post(format!(
                "{}/models/{}:generateContent?key={}",
                self.endpoint, self.model, self.api_key
            ))
            .json(&payload)
            .send()
            .await
            .map_err(|err| ChatError::ModelUnavailable(format!("gemini request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: GeminiResponse = resp
            .json()
            .await
            .map_err(|err| ChatError::LanguageModel(format!("gemini response parse error: {err}")))?;

        let parts = parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| candidate.content.parts)
            .ok_or_else(|| ChatError::LanguageModel("gemini returned no candidates".into()))?;

        let mut content = String::new();
        let mut calls = Vec::new();
        for part in parts {
            if let Some(text) = part.text {
                content.push_str(&text);
            }
            if let Some(call) = part.function_call {
                calls.push(ToolCall {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: call.name,
                    arguments: call.args.unwrap_or_else(|| json!({})),
                });
            }
        }

        if self.encoding == ToolCallEncoding::Marker {
            // The marker grammar carries at most one call; anything that does
            // not match exactly stays plain text.
            return Ok(match marker::parse(&content) {
                MarkerReply::Call { name, arguments } => ModelReply::ToolCalls {
                    calls: vec![ToolCall {
                        id: uuid::Uuid::new_v4().to_string(),
                        name,
                        arguments,
                    }],
                    content,
                },
                MarkerReply::Text => ModelReply::Text(content),
            });
        }

        if calls.is_empty() {
            Ok(ModelReply::Text(content))
        } else {
            Ok(ModelReply::ToolCalls { calls, content })
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        tools: &[ToolDescription],
        transcript: &[Turn],
    ) -> Result<ModelReply> {
        let mut delay = Duration::from_millis(500);
        let mut attempt = 0u32;
        loop {
            match self.request_once(system_prompt, tools, transcript).await {
                Err(ChatError::ModelUnavailable(message)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, max_retries = self.max_retries, %message, "retrying model request");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(8));
                }
                other => return other,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "functionCall", default)]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Option<Value>,
}

/// Scripted model for tests: pops one reply per invocation.
pub struct StubModel {
    replies: Mutex<VecDeque<StubReply>>,
    invocations: AtomicUsize,
}

/// One scripted [`StubModel`] outcome.
pub enum StubReply {
    Reply(ModelReply),
    Unavailable(String),
}

impl StubModel {
    pub fn new(replies: Vec<StubReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            invocations: AtomicUsize::new(0),
        })
    }

    pub fn text(content: impl Into<String>) -> StubReply {
        StubReply::Reply(ModelReply::Text(content.into()))
    }

    pub fn tool_calls(calls: Vec<ToolCall>, content: impl Into<String>) -> StubReply {
        StubReply::Reply(ModelReply::ToolCalls {
            calls,
            content: content.into(),
        })
    }

    /// Number of times `complete` has been called.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _tools: &[ToolDescription],
        _transcript: &[Turn],
    ) -> Result<ModelReply> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .replies
            .lock()
            .expect("stub model poisoned")
            .pop_front()
            .ok_or_else(|| {
                ChatError::LanguageModel("StubModel ran out of scripted replies".into())
            })?;
        match scripted {
            StubReply::Reply(reply) => Ok(reply),
            StubReply::Unavailable(message) => Err(ChatError::ModelUnavailable(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    fn client(encoding: ToolCallEncoding) -> GeminiClient {
        let cfg = ModelConfig {
            api_key: Some("test-key".into()),
            tool_call_encoding: encoding,
            ..ModelConfig::default()
        };
        GeminiClient::from_config(&cfg).unwrap()
    }

    #[test]
    fn from_config_requires_api_key() {
        let cfg = ModelConfig::default();
        assert!(matches!(
            GeminiClient::from_config(&cfg),
            Err(ChatError::LanguageModel(_))
        ));
    }

    #[test]
    fn structured_contents_pair_calls_with_results() {
        let client = client(ToolCallEncoding::Structured);
        let call = ToolCall {
            id: "call-1".into(),
            name: "anime_search".into(),
            arguments: json!({"query": "mecha"}),
        };
        let transcript = vec![
            Turn::user("Recommend a mecha anime"),
            Turn::assistant_with_calls("", vec![call]),
            Turn::tool_result("call-1", r#"{"data":[]}"#),
        ];

        let contents = client.to_contents(&transcript);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(
            contents[1]["parts"][0]["functionCall"]["name"],
            "anime_search"
        );
        // The tool turn resolves its call id back to the function name.
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["name"],
            "anime_search"
        );
    }

    #[test]
    fn marker_contents_render_results_as_text() {
        let client = client(ToolCallEncoding::Marker);
        let call = ToolCall {
            id: "call-1".into(),
            name: "anime_search".into(),
            arguments: json!({"query": "mecha"}),
        };
        let transcript = vec![
            Turn::assistant_with_calls("FUNCTION: anime_search\nPARAMS:\n    query: mecha", vec![call]),
            Turn::tool_result("call-1", "some payload"),
        ];

        let contents = client.to_contents(&transcript);
        let text = contents[1]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("anime_search"));
        assert!(text.contains("some payload"));
    }

    #[test]
    fn marker_encoding_omits_function_declarations() {
        let client = client(ToolCallEncoding::Marker);
        let tools = vec![ToolDescription {
            name: "anime_search".into(),
            description: "Search anime".into(),
            parameters: None,
        }];
        assert!(client.to_tools(&tools).is_none());
        assert!(client
            .system_instruction("base prompt", &tools)
            .contains("FUNCTION: <function name>"));
    }

    #[test]
    fn retryable_statuses_map_to_model_unavailable() {
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down"),
            ChatError::ModelUnavailable(_)
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, ""),
            ChatError::ModelUnavailable(_)
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_REQUEST, "bad schema"),
            ChatError::LanguageModel(_)
        ));
    }
}
