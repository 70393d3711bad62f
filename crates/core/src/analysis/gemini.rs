use super::{
    ChatRequest, ChatTransport, CompletionCallback, ContentPart, ResultCallback, StreamDelta,
    TransportError, split_data_uri,
};
use crate::error::{AppError, Result};
use futures::StreamExt;
use gemini_rust::{Blob, Content, Gemini, GenerationResponse, Message, Part, Role};
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Streams answers from the Gemini generate-content API.
#[derive(Clone)]
pub struct GeminiTransport {
    client: Arc<Gemini>,
}

impl GeminiTransport {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Result<Self> {
        // Explicit base URL avoids a BadScheme error inside the client
        let base = base_url.unwrap_or(DEFAULT_BASE_URL);
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        let base_url = url::Url::parse(&base)
            .map_err(|e| AppError::config(format!("Invalid base URL: {}", e)))?;

        let model_name = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        let model_url = format!("{}{}", base, model_name);

        let client = Gemini::with_model_and_base_url(api_key, model_url, base_url)
            .map_err(|e| AppError::config(format!("Failed to create Gemini client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Converts the request into Gemini messages, inlining `data:` images.
    fn messages(request: &ChatRequest) -> std::result::Result<Vec<Message>, TransportError> {
        request
            .messages
            .iter()
            .map(|message| {
                let parts = message
                    .parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(text) => Ok(Part::Text {
                            text: text.clone(),
                            thought: None,
                            thought_signature: None,
                        }),
                        ContentPart::ImageUrl { url, .. } => {
                            let (mime_type, data) = split_data_uri(url).ok_or_else(|| {
                                TransportError::new("Gemini only accepts inline base64 images")
                            })?;
                            Ok(Part::InlineData {
                                inline_data: Blob {
                                    mime_type: mime_type.to_string(),
                                    data: data.to_string(),
                                },
                                media_resolution: None,
                            })
                        }
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok(Message {
                    role: Role::User,
                    content: Content {
                        role: Some(Role::User),
                        parts: Some(parts),
                    },
                })
            })
            .collect()
    }

    async fn run(
        self,
        messages: Vec<Message>,
        mut on_result: ResultCallback,
        on_complete: CompletionCallback,
    ) {
        let stream = match self
            .client
            .generate_content()
            .with_messages(messages)
            .execute_stream()
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Gemini request failed: {:?}", e);
                on_complete(Some(TransportError(format!("API request failed: {:?}", e))));
                return;
            }
        };

        let mut stream = Box::pin(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(response) => {
                    let text = answer_text(&response);
                    if !text.is_empty() {
                        on_result(Ok(StreamDelta::text(text)));
                    }
                }
                Err(e) => {
                    on_complete(Some(TransportError(format!("Stream error: {:?}", e))));
                    return;
                }
            }
        }
        on_complete(None);
    }
}

/// Visible text of the first candidate; thought parts are skipped.
fn answer_text(response: &GenerationResponse) -> String {
    let Some(candidate) = response.candidates.first() else {
        return String::new();
    };
    let Some(parts) = &candidate.content.parts else {
        return String::new();
    };

    parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text, thought, .. } if *thought != Some(true) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

impl ChatTransport for GeminiTransport {
    fn chats_stream(
        &self,
        request: ChatRequest,
        on_result: ResultCallback,
        on_complete: CompletionCallback,
    ) {
        let messages = match Self::messages(&request) {
            Ok(messages) => messages,
            Err(e) => return on_complete(Some(e)),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.clone().run(messages, on_result, on_complete));
            }
            Err(_) => on_complete(Some(TransportError::new(
                "chat transport used outside a tokio runtime",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ChatMessage, ImageDetail, Role as ChatRole};

    fn request(url: &str) -> ChatRequest {
        ChatRequest {
            model: "gemini-flash-latest".to_string(),
            stream: true,
            messages: vec![ChatMessage {
                role: ChatRole::User,
                parts: vec![
                    ContentPart::Text("Describe".to_string()),
                    ContentPart::ImageUrl {
                        url: url.to_string(),
                        detail: ImageDetail::Auto,
                    },
                ],
            }],
        }
    }

    #[test]
    fn inlines_data_uri_images() {
        let messages = GeminiTransport::messages(&request("data:image/jpeg;base64,QUJD")).unwrap();
        assert_eq!(messages.len(), 1);

        let parts = messages[0].content.parts.as_ref().unwrap();
        assert!(matches!(&parts[0], Part::Text { text, .. } if text == "Describe"));
        match &parts[1] {
            Part::InlineData { inline_data, .. } => {
                assert_eq!(inline_data.mime_type, "image/jpeg");
                assert_eq!(inline_data.data, "QUJD");
            }
            _ => panic!("expected inline image part"),
        }
    }

    #[test]
    fn rejects_remote_image_urls() {
        let err = GeminiTransport::messages(&request("https://example.com/cat.png")).unwrap_err();
        assert!(err.0.contains("inline"));
    }

    #[test]
    fn accepts_model_with_or_without_prefix() {
        assert!(GeminiTransport::new("key", "gemini-flash-latest", None).is_ok());
        assert!(GeminiTransport::new("key", "models/gemini-flash-latest", None).is_ok());
        assert!(matches!(
            GeminiTransport::new("key", "gemini-flash-latest", Some("::bad")),
            Err(AppError::Config(_))
        ));
    }
}
