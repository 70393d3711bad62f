//! OpenAI-compatible `/chat/completions` transport.
//!
//! Works against any server speaking the same streaming dialect (OpenAI,
//! Azure-style proxies, local inference servers) via `GLANCE_BASE_URL`.

use super::sse::SseDecoder;
use super::{
    ChatRequest, ChatTransport, CompletionCallback, ContentPart, ResultCallback, StreamDelta,
    TransportError,
};
use crate::error::{AppError, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";

/// Streams chat completions over HTTP with server-sent events.
#[derive(Clone)]
pub struct OpenAiTransport {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl OpenAiTransport {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), api_key, base_url)
    }

    pub fn with_client(
        http: reqwest::Client,
        api_key: &str,
        base_url: Option<&str>,
    ) -> Result<Self> {
        let mut base = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))
            .map_err(|e| AppError::config(format!("Invalid base URL: {}", e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("chat/completions")
            .map_err(|e| AppError::config(format!("Invalid base URL: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The JSON body for `request`.
    pub fn request_body(request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|message| {
                let content: Vec<Value> = message
                    .parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(text) => json!({ "type": "text", "text": text }),
                        ContentPart::ImageUrl { url, detail } => json!({
                            "type": "image_url",
                            "image_url": { "url": url, "detail": detail.as_str() },
                        }),
                    })
                    .collect();
                json!({ "role": message.role.as_str(), "content": content })
            })
            .collect();

        json!({
            "model": request.model,
            "stream": request.stream,
            "messages": messages,
        })
    }

    async fn run(
        self,
        body: Value,
        mut on_result: ResultCallback,
        on_complete: CompletionCallback,
    ) {
        let mut response = match self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                log::error!("HTTP request failed: {}", e);
                on_complete(Some(TransportError(format!("Request failed: {}", e))));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = error_message(&text).unwrap_or(text);
            on_complete(Some(TransportError(format!("{}: {}", status, detail.trim()))));
            return;
        }

        let mut sse = SseDecoder::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    for data in sse.push(&chunk) {
                        match parse_event(&data) {
                            StreamEvent::Done => {
                                on_complete(None);
                                return;
                            }
                            StreamEvent::Delta(delta) => on_result(Ok(delta)),
                            StreamEvent::Error(msg) => on_result(Err(TransportError(msg))),
                            StreamEvent::Ignored => {}
                        }
                    }
                }
                Ok(None) => {
                    if let Some(data) = sse.finish() {
                        if let StreamEvent::Delta(delta) = parse_event(&data) {
                            on_result(Ok(delta));
                        }
                    }
                    // Some compatible servers close without [DONE]
                    on_complete(None);
                    return;
                }
                Err(e) => {
                    on_complete(Some(TransportError(format!("Stream error: {}", e))));
                    return;
                }
            }
        }
    }
}

impl ChatTransport for OpenAiTransport {
    fn chats_stream(
        &self,
        request: ChatRequest,
        on_result: ResultCallback,
        on_complete: CompletionCallback,
    ) {
        let body = Self::request_body(&request);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.clone().run(body, on_result, on_complete));
            }
            Err(_) => on_complete(Some(TransportError::new(
                "chat transport used outside a tokio runtime",
            ))),
        }
    }
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Delta(StreamDelta),
    Error(String),
    Done,
    Ignored,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

fn parse_event(data: &str) -> StreamEvent {
    if data.trim() == "[DONE]" {
        return StreamEvent::Done;
    }
    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(ChunkPayload {
            error: Some(error), ..
        }) => StreamEvent::Error(error.message),
        Ok(payload) => match payload.choices.into_iter().next() {
            Some(choice) => StreamEvent::Delta(StreamDelta {
                content: choice.delta.content,
            }),
            None => StreamEvent::Ignored,
        },
        Err(e) => {
            log::warn!("Skipping unparseable stream event: {}", e);
            StreamEvent::Ignored
        }
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
}
