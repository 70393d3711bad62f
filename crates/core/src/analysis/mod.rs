//! Streaming vision queries.
//!
//! [`StreamingQueryClient`] sends one image plus a question to a chat
//! transport and relays the answer chunk by chunk. Transports report through
//! two callbacks that may fire from any thread and in any interleaving; the
//! client funnels both through a gate so the caller sees chunks in arrival
//! order, then exactly one final outcome, then nothing.

pub mod gemini;
pub mod openai;
pub mod sse;

pub use gemini::GeminiTransport;
pub use openai::OpenAiTransport;

use crate::config::{Config, Provider};
use crate::error::{AnalysisError, AppError, Result};
use crate::image_processing::{DEFAULT_JPEG_QUALITY, EncodedImage, ImageProcessor};
use image::RgbaImage;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
        }
    }
}

/// Resolution hint for attached images.
///
/// `Low` trades detail for a fixed, small token cost. Gemini ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
    High,
}

impl ImageDetail {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageDetail::Auto => "auto",
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
        }
    }
}

impl FromStr for ImageDetail {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ImageDetail::Auto),
            "low" => Ok(ImageDetail::Low),
            "high" => Ok(ImageDetail::High),
            other => Err(AppError::config(format!(
                "Unknown image detail '{}', expected 'auto', 'low' or 'high'",
                other
            ))),
        }
    }
}

impl fmt::Display for ImageDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// An image by URL; captured regions use a `data:` URI.
    ImageUrl { url: String, detail: ImageDetail },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

/// A provider-neutral chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// One user message holding the question followed by the image.
    pub fn vision(model: &str, query: &str, image: &EncodedImage, detail: ImageDetail) -> Self {
        Self {
            model: model.to_string(),
            stream: true,
            messages: vec![ChatMessage {
                role: Role::User,
                parts: vec![
                    ContentPart::Text(query.to_string()),
                    ContentPart::ImageUrl {
                        url: image.data_uri(),
                        detail,
                    },
                ],
            }],
        }
    }
}

/// Splits `data:<mime>;base64,<payload>` into mime type and payload.
pub fn split_data_uri(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, payload))
}

/// One incremental piece of a streamed answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    pub content: Option<String>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
        }
    }
}

/// A failure described by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Receives each streamed delta, or a mid-stream error.
pub type ResultCallback = Box<dyn FnMut(std::result::Result<StreamDelta, TransportError>) + Send>;

/// Receives the end of the stream: `None` for success.
pub type CompletionCallback = Box<dyn FnOnce(Option<TransportError>) + Send>;

/// A streaming chat endpoint.
///
/// Implementations must return promptly and deliver through the callbacks
/// later, from any thread. Dropping both callbacks without calling
/// `on_complete` is reported to the caller as a failure.
pub trait ChatTransport: Send + Sync {
    fn chats_stream(
        &self,
        request: ChatRequest,
        on_result: ResultCallback,
        on_complete: CompletionCallback,
    );
}

/// Identifies one call to [`StreamingQueryClient::analyze`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

enum GateEvent {
    Chunk(String),
    Finished(std::result::Result<(), AnalysisError>),
}

/// Shared between the transport callbacks of one request.
///
/// `sender` is dropped on resolution, which is what silences everything that
/// arrives afterwards.
struct StreamGate {
    request: RequestId,
    active: Arc<AtomicU64>,
    sender: Option<mpsc::UnboundedSender<GateEvent>>,
}

impl StreamGate {
    fn lock(gate: &Mutex<Self>) -> MutexGuard<'_, Self> {
        gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn forward(gate: &Mutex<Self>, text: String) {
        let gate = Self::lock(gate);
        if gate.active.load(Ordering::Acquire) != gate.request.0 {
            log::debug!("Dropping chunk for superseded request {:?}", gate.request);
            return;
        }
        if let Some(sender) = &gate.sender {
            let _ = sender.send(GateEvent::Chunk(text));
        }
    }

    fn finish(gate: &Mutex<Self>, outcome: std::result::Result<(), AnalysisError>) {
        let mut gate = Self::lock(gate);
        match gate.sender.take() {
            Some(sender) => {
                let _ = sender.send(GateEvent::Finished(outcome));
            }
            None => log::debug!(
                "Ignoring late outcome for request {:?}: {:?}",
                gate.request,
                outcome
            ),
        }
    }
}

/// Sends image questions to a [`ChatTransport`] and streams the answers.
pub struct StreamingQueryClient {
    transport: Arc<dyn ChatTransport>,
    model: String,
    jpeg_quality: f32,
    image_detail: ImageDetail,
    next_request: AtomicU64,
    active: Arc<AtomicU64>,
}

impl StreamingQueryClient {
    pub fn new(transport: Arc<dyn ChatTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            image_detail: ImageDetail::Auto,
            next_request: AtomicU64::new(0),
            active: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Builds the client and transport selected by `config`.
    ///
    /// An empty API key is accepted; the service will reject the request.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.api_key.is_empty() {
            log::warn!("No API key configured for {}; requests will be rejected", config.provider);
        }

        let transport: Arc<dyn ChatTransport> = match config.provider {
            Provider::OpenAi => Arc::new(OpenAiTransport::new(
                &config.api_key,
                config.base_url.as_deref(),
            )?),
            Provider::Gemini => Arc::new(GeminiTransport::new(
                &config.api_key,
                &config.model_name,
                config.base_url.as_deref(),
            )?),
        };
        log::info!("Using {} model {}", config.provider, config.model_name);

        Ok(Self::new(transport, config.model_name.clone())
            .with_jpeg_quality(config.jpeg_quality)
            .with_image_detail(config.image_detail))
    }

    pub fn with_jpeg_quality(mut self, quality: f32) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_image_detail(mut self, detail: ImageDetail) -> Self {
        self.image_detail = detail;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The most recently started request, if any.
    pub fn current_request(&self) -> Option<RequestId> {
        match self.active.load(Ordering::Acquire) {
            0 => None,
            id => Some(RequestId(id)),
        }
    }

    fn begin_request(&self) -> RequestId {
        let id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed) + 1);
        self.active.store(id.0, Ordering::Release);
        id
    }

    /// Asks `query` about `image`, calling `on_chunk` with each piece of the
    /// answer in order.
    ///
    /// Resolves once, after the last delivered chunk. Starting another
    /// request on the same client supersedes this one: chunks arriving for
    /// it after that point are discarded.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::InvalidImageData`] before anything is sent
    /// - [`AnalysisError::ApiError`] for transport failures; chunks already
    ///   delivered stay delivered
    pub async fn analyze<F>(
        &self,
        image: &EncodedImage,
        query: &str,
        mut on_chunk: F,
    ) -> std::result::Result<(), AnalysisError>
    where
        F: FnMut(&str),
    {
        ImageProcessor::validate(image)?;

        let request = self.begin_request();
        let (sender, mut events) = mpsc::unbounded_channel();
        let gate = Arc::new(Mutex::new(StreamGate {
            request,
            active: self.active.clone(),
            sender: Some(sender),
        }));

        let on_result: ResultCallback = {
            let gate = gate.clone();
            Box::new(move |result| match result {
                Ok(StreamDelta { content: Some(text) }) if !text.is_empty() => {
                    StreamGate::forward(&gate, text)
                }
                Ok(_) => {}
                Err(e) => StreamGate::finish(&gate, Err(AnalysisError::api(e.0))),
            })
        };
        let on_complete: CompletionCallback = Box::new(move |error| {
            StreamGate::finish(&gate, error.map_or(Ok(()), |e| Err(AnalysisError::api(e.0))))
        });

        log::debug!(
            "Starting request {:?} with {} ({} byte image)",
            request,
            self.model,
            image.len()
        );
        let request_body = ChatRequest::vision(&self.model, query, image, self.image_detail);
        self.transport.chats_stream(request_body, on_result, on_complete);

        let mut delivered = 0usize;
        while let Some(event) = events.recv().await {
            match event {
                GateEvent::Chunk(text) => {
                    delivered += 1;
                    on_chunk(&text);
                }
                GateEvent::Finished(outcome) => {
                    match &outcome {
                        Ok(()) => {
                            log::info!("Request {:?} finished after {} chunks", request, delivered)
                        }
                        Err(e) => log::error!(
                            "Request {:?} failed after {} chunks: {}",
                            request,
                            delivered,
                            e
                        ),
                    }
                    return outcome;
                }
            }
        }

        log::error!("Transport dropped request {:?} without completing it", request);
        Err(AnalysisError::api("stream ended without completion"))
    }

    /// Encodes `image` as JPEG and runs [`analyze`](Self::analyze).
    pub async fn analyze_image<F>(
        &self,
        image: &RgbaImage,
        query: &str,
        on_chunk: F,
    ) -> std::result::Result<(), AnalysisError>
    where
        F: FnMut(&str),
    {
        let encoded = ImageProcessor::encode(image, self.jpeg_quality)?;
        self.analyze(&encoded, query, on_chunk).await
    }
}
