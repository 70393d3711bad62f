//! Region capture and analysis through the public API, against a fake
//! two-display desktop and a scripted chat transport.

use futures::FutureExt;
use futures::future::BoxFuture;
use glance_core::analysis::{
    ChatRequest, ChatTransport, CompletionCallback, ContentPart, ResultCallback, StreamDelta,
};
use glance_core::capture::{
    CaptureBackend, CaptureStream, CapturedFrame, DisplayInfo, FrameHandler, SessionState,
    StreamConfig,
};
use glance_core::{AppError, CaptureError, Config, Glance, Rect, StreamingQueryClient};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A 100x50 point primary display at 2x and an 80x60 secondary to its right.
struct FakeDesktop {
    sessions: AtomicUsize,
}

impl FakeDesktop {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: AtomicUsize::new(0),
        })
    }
}

/// Delivers one frame where pixel (x, y) of display `id` is `[x, y, id, 255]`.
struct FakeStream {
    config: StreamConfig,
    handler: Arc<dyn FrameHandler>,
    state: SessionState,
}

impl CaptureStream for FakeStream {
    fn start(&mut self) -> BoxFuture<'_, Result<(), String>> {
        async move {
            let (width, height) = (self.config.pixel_size.width, self.config.pixel_size.height);
            let id = self.config.display.id as u8;
            let mut data = Vec::with_capacity((width * height * 4) as usize);
            for y in 0..height {
                for x in 0..width {
                    data.extend_from_slice(&[x as u8, y as u8, id, 255]);
                }
            }
            self.handler.on_frame(CapturedFrame::from_rgba(width, height, data));
            self.state = SessionState::Capturing;
            Ok(())
        }
        .boxed()
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), String>> {
        async move {
            self.state = SessionState::Stopped;
            Ok(())
        }
        .boxed()
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

impl CaptureBackend for FakeDesktop {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        Ok(vec![
            DisplayInfo {
                id: 1,
                frame: Rect::new(0.0, 0.0, 100.0, 50.0),
                scale_factor: 2.0,
                is_primary: true,
            },
            DisplayInfo {
                id: 2,
                frame: Rect::new(100.0, 0.0, 80.0, 60.0),
                scale_factor: 1.0,
                is_primary: false,
            },
        ])
    }

    fn open_stream(
        &self,
        config: StreamConfig,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            config,
            handler,
            state: SessionState::Idle,
        }))
    }
}

/// Answers every request with fixed chunks and records what it was sent.
#[derive(Default)]
struct CannedTransport {
    requests: Mutex<Vec<ChatRequest>>,
}

impl ChatTransport for CannedTransport {
    fn chats_stream(
        &self,
        request: ChatRequest,
        mut on_result: ResultCallback,
        on_complete: CompletionCallback,
    ) {
        self.requests.lock().unwrap().push(request);
        std::thread::spawn(move || {
            for text in ["A ", "gradient", "."] {
                on_result(Ok(StreamDelta::text(text)));
            }
            on_complete(None);
        });
    }
}

fn glance(backend: Arc<FakeDesktop>, transport: Arc<CannedTransport>) -> Glance {
    let config = Config::builder()
        .with_settle_delay(Duration::ZERO)
        .with_frame_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    Glance::from_parts(config, backend, StreamingQueryClient::new(transport, "test-model"))
}

#[tokio::test]
async fn captures_region_at_native_resolution() {
    let desktop = FakeDesktop::new();
    let app = glance(desktop.clone(), Arc::default());

    let image = app
        .capture_region(1, Rect::new(10.0, 10.0, 20.0, 10.0))
        .await
        .unwrap()
        .expect("region should produce an image");

    // 2x display: 20x10 points are 40x20 pixels starting at (20, 20)
    assert_eq!(image.dimensions(), (40, 20));
    assert_eq!(image.get_pixel(0, 0).0, [20, 20, 1, 255]);
    assert_eq!(image.get_pixel(39, 19).0, [59, 39, 1, 255]);
    assert_eq!(desktop.sessions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn captures_from_secondary_display() {
    let app = glance(FakeDesktop::new(), Arc::default());

    let image = app
        .capture_region(2, Rect::new(5.0, 5.0, 10.0, 10.0))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(image.dimensions(), (10, 10));
    assert_eq!(image.get_pixel(0, 0).0, [5, 5, 2, 255]);
}

#[tokio::test]
async fn region_partly_off_display_is_clamped() {
    let app = glance(FakeDesktop::new(), Arc::default());

    let image = app
        .capture_region(2, Rect::new(70.0, 50.0, 40.0, 40.0))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(image.dimensions(), (10, 10));
    assert_eq!(image.get_pixel(0, 0).0, [70, 50, 2, 255]);
}

#[tokio::test]
async fn zero_area_region_yields_no_image() {
    let app = glance(FakeDesktop::new(), Arc::default());
    let image = app.capture_region(1, Rect::new(10.0, 10.0, 0.0, 0.0)).await.unwrap();
    assert!(image.is_none());
}

#[tokio::test]
async fn unknown_display_is_an_error() {
    let desktop = FakeDesktop::new();
    let app = glance(desktop.clone(), Arc::default());

    let err = app.capture_region(9, Rect::new(0.0, 0.0, 5.0, 5.0)).await.unwrap_err();

    assert!(matches!(err, AppError::Capture(CaptureError::NoMatchingDisplay(9))));
    assert_eq!(desktop.sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn captured_region_streams_an_answer() {
    let transport = Arc::new(CannedTransport::default());
    let app = glance(FakeDesktop::new(), transport.clone());

    let image = app
        .capture_region(1, Rect::new(0.0, 0.0, 16.0, 16.0))
        .await
        .unwrap()
        .unwrap();

    let mut chunks = Vec::new();
    app.analyze(&image, "What is this?", |c| chunks.push(c.to_string()))
        .await
        .unwrap();

    assert_eq!(chunks, ["A ", "gradient", "."]);

    let requests = transport.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let parts = &requests[0].messages[0].parts;
    assert_eq!(parts[0], ContentPart::Text("What is this?".to_string()));
    assert!(matches!(
        &parts[1],
        ContentPart::ImageUrl { url, .. } if url.starts_with("data:image/jpeg;base64,")
    ));
}
