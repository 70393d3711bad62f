//! The fullscreen selection overlay.
//!
//! [`OverlayApp`] implements `eframe::App` for a transparent, borderless,
//! always-on-top window. Drags drive a [`SelectionSession`]; captures and
//! analysis requests run on an owned tokio runtime and report back through a
//! channel that the UI thread drains every frame.
//!
//! [`SelectionSession`]: crate::selection::SelectionSession

use super::rendering::{
    calculate_popup_position, draw_backdrop, draw_selection_border, to_egui_rect, to_point, to_rect,
};
use super::selection::{DragEvent, read_drag};
use super::state::{Answer, DEFAULT_QUERY, Review, UiEvent, UiState};
use crate::analysis::StreamingQueryClient;
use crate::capture::FrameCaptureBridge;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::geometry::{AxisOrientation, Point, Rect};
use crate::image_processing::ImageProcessor;
use crate::selection::{OverlayHost, SelectionCompletion, SelectionController};
use eframe::egui;
use egui_commonmark::{CommonMarkCache, CommonMarkViewer};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

/// egui-backed [`OverlayHost`]: visibility flags read by the renderer.
pub struct EguiHost {
    ctx: egui::Context,
    selection_visible: bool,
    backdrop_visible: bool,
    fallback_frame: Rect,
}

impl EguiHost {
    pub fn new(ctx: egui::Context, fallback_frame: Rect) -> Self {
        Self {
            ctx,
            selection_visible: true,
            backdrop_visible: true,
            fallback_frame,
        }
    }

    pub fn selection_visible(&self) -> bool {
        self.selection_visible
    }

    pub fn backdrop_visible(&self) -> bool {
        self.backdrop_visible
    }
}

impl OverlayHost for EguiHost {
    fn set_selection_visible(&mut self, visible: bool) {
        self.selection_visible = visible;
        self.ctx.request_repaint();
    }

    fn set_backdrop_visible(&mut self, visible: bool) {
        self.backdrop_visible = visible;
        self.ctx.request_repaint();
    }

    fn window_frame(&self) -> Rect {
        self.ctx
            .input(|i| i.viewport().inner_rect)
            .map(to_rect)
            .unwrap_or(self.fallback_frame)
    }
}

/// The overlay application.
pub struct OverlayApp {
    runtime: tokio::runtime::Runtime,
    bridge: Arc<FrameCaptureBridge>,
    client: Arc<StreamingQueryClient>,
    config: Config,

    host: EguiHost,
    controller: SelectionController,
    state: UiState,
    /// Frozen rectangle of the capture in flight.
    released: Option<egui::Rect>,

    tx: Sender<UiEvent>,
    rx: Receiver<UiEvent>,

    query: String,
    next_request: u64,
    preview: Option<egui::TextureHandle>,
    markdown_cache: CommonMarkCache,
}

impl OverlayApp {
    pub fn new(
        ctx: egui::Context,
        bridge: Arc<FrameCaptureBridge>,
        client: Arc<StreamingQueryClient>,
        config: Config,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("glance-worker")
            .enable_all()
            .build()
            .map_err(|e| AppError::ui(format!("Failed to create async runtime: {}", e)))?;

        // Used until the viewport reports its own position
        let fallback_frame = bridge
            .displays()
            .ok()
            .and_then(|displays| {
                let primary = displays.iter().find(|d| d.is_primary).or(displays.first());
                primary.map(|d| d.frame)
            })
            .unwrap_or_default();

        let (tx, rx) = channel();
        Ok(Self {
            runtime,
            bridge,
            client,
            config,
            host: EguiHost::new(ctx, fallback_frame),
            controller: SelectionController::new(),
            state: UiState::Selecting,
            released: None,
            tx,
            rx,
            query: String::new(),
            next_request: 0,
            preview: None,
            markdown_cache: CommonMarkCache::default(),
        })
    }

    fn start_selection(&mut self, response: &egui::Response, origin: Point) {
        self.state = UiState::Selecting;
        self.preview = None;

        let tx = self.tx.clone();
        let completion: SelectionCompletion = Box::new(move |image| {
            let _ = tx.send(UiEvent::Selected(image));
        });
        self.controller.open(completion, &mut self.host);

        if let Some(session) = self.controller.session_mut() {
            session.mouse_down(origin);
            if let Some(pos) = response.interact_pointer_pos() {
                session.mouse_dragged(to_point(pos));
            }
        }
    }

    /// Hides the overlay and starts the capture task.
    fn release_selection(&mut self) {
        let Some(id) = self.controller.current_id() else {
            return;
        };
        let Some(session) = self.controller.session_mut() else {
            return;
        };
        let Some(pending) = session.mouse_up(&mut self.host) else {
            return;
        };
        self.state = UiState::Capturing;
        self.released = Some(to_egui_rect(pending.selection));

        let bridge = self.bridge.clone();
        let tx = self.tx.clone();
        let ctx = self.host.ctx.clone();
        let settle_delay = self.config.settle_delay;
        self.runtime.spawn(async move {
            let settled = tx.clone();
            let image = pending
                .execute(&bridge, settle_delay, AxisOrientation::TopDown, move || {
                    let _ = settled.send(UiEvent::Settled { session: id });
                })
                .await;
            let _ = tx.send(UiEvent::Captured { session: id, image });
            ctx.request_repaint();
        });
    }

    fn submit_query(&mut self) {
        let UiState::Review(review) = &mut self.state else {
            return;
        };
        let Some(encoded) = review.encoded.clone() else {
            return;
        };

        self.next_request += 1;
        let request = self.next_request;
        review.begin(request);

        let query = match self.query.trim() {
            "" => DEFAULT_QUERY.to_string(),
            q => q.to_string(),
        };
        let client = self.client.clone();
        let tx = self.tx.clone();
        let ctx = self.host.ctx.clone();
        self.runtime.spawn(async move {
            let outcome = client
                .analyze(&encoded, &query, |text| {
                    let _ = tx.send(UiEvent::Chunk {
                        request,
                        text: text.to_string(),
                    });
                    ctx.request_repaint();
                })
                .await;
            let _ = tx.send(UiEvent::Finished {
                request,
                error: outcome.err().map(|e| e.to_string()),
            });
            ctx.request_repaint();
        });
    }

    fn process_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                UiEvent::Settled { session } => {
                    self.controller.settled(session);
                }
                UiEvent::Captured { session, image } => {
                    self.controller.complete(session, image, &mut self.host);
                }
                UiEvent::Selected(image) => self.show_review(ctx, image),
                event => {
                    if let UiState::Review(review) = &mut self.state {
                        if review.apply(&event) {
                            ctx.request_repaint();
                        }
                    }
                }
            }
        }
    }

    fn show_review(&mut self, ctx: &egui::Context, image: Option<image::RgbaImage>) {
        // Cancelled sessions also report here; only a running capture counts
        if !matches!(self.state, UiState::Capturing) {
            return;
        }
        let Some(image) = image else {
            log::info!("Selection produced no image");
            self.released = None;
            self.state = UiState::Selecting;
            return;
        };

        let selection = self.released.take().unwrap_or(egui::Rect::NOTHING);

        let encoded = match ImageProcessor::encode(&image, self.config.jpeg_quality) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                log::error!("Failed to encode selection: {}", e);
                None
            }
        };

        let size = [image.width() as usize, image.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());
        let texture = ctx.load_texture("selection", color_image, egui::TextureOptions::LINEAR);
        self.preview = Some(texture);

        self.query.clear();
        self.state = UiState::Review(Review::new(selection, image, encoded));
    }

    fn render_review_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let UiState::Review(review) = &self.state else {
            return;
        };
        let can_ask = review.encoded.is_some() && !review.answer.is_streaming();
        let streaming = review.answer.is_streaming();
        let text = review.answer.text();

        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.query)
                    .desired_width(ui.available_width() - 40.0)
                    .hint_text("What do you want?"),
            );
            let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if (ui.add_enabled(can_ask, egui::Button::new("➤")).clicked() || enter) && can_ask {
                self.submit_query();
            }
        });

        if streaming && text.is_empty() {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Thinking...");
            });
        }

        if !text.is_empty() {
            ui.separator();
            egui::ScrollArea::vertical().max_height(300.0).show(ui, |ui| {
                CommonMarkViewer::new().show(ui, &mut self.markdown_cache, &text);
            });
        }

        ui.separator();
        ui.horizontal(|ui| {
            let answer_ready = matches!(
                &self.state,
                UiState::Review(Review {
                    answer: Answer::Complete(_),
                    ..
                })
            );
            if ui.add_enabled(answer_ready, egui::Button::new("Copy")).clicked() {
                match arboard::Clipboard::new().and_then(|mut c| c.set_text(text.clone())) {
                    Ok(()) => log::debug!("Copied {} characters", text.len()),
                    Err(e) => log::warn!("Failed to copy answer: {}", e),
                }
            }
            if ui.button("New selection").clicked() {
                self.state = UiState::Selecting;
                self.preview = None;
            }
            if ui.button("Close").clicked() {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        });
    }
}

impl eframe::App for OverlayApp {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        // Fully transparent so the desktop shows through when hidden
        [0.0, 0.0, 0.0, 0.0]
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(egui::Visuals::dark());
        self.process_events(ctx);

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.controller.close(&mut self.host);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::default())
            .show(ctx, |ui| {
                let screen_rect = ui.max_rect();

                let response =
                    ui.interact(screen_rect, ui.id().with("overlay"), egui::Sense::drag());
                if !matches!(self.state, UiState::Capturing) {
                    match read_drag(&response) {
                        DragEvent::Started(origin) => {
                            self.start_selection(&response, origin);
                            if response.drag_stopped() {
                                self.release_selection();
                            }
                        }
                        DragEvent::Moved(p) => {
                            if let Some(session) = self.controller.session_mut() {
                                session.mouse_dragged(p);
                            }
                        }
                        DragEvent::Released => self.release_selection(),
                        DragEvent::None => {}
                    }
                }

                let painter = ui.painter();
                match &self.state {
                    UiState::Capturing => {}
                    UiState::Selecting => {
                        let selection = self
                            .controller
                            .session()
                            .filter(|s| !s.is_completed() && !s.rect().is_empty())
                            .map(|s| to_egui_rect(s.rect()));
                        if self.host.backdrop_visible() {
                            draw_backdrop(painter, screen_rect, selection);
                        }
                        let outlined = selection.filter(|_| self.host.selection_visible());
                        if let Some(selection) = outlined {
                            draw_selection_border(painter, selection);
                        }
                    }
                    UiState::Review(review) => {
                        draw_backdrop(painter, screen_rect, Some(review.selection));
                        if let Some(texture) = &self.preview {
                            painter.image(
                                texture.id(),
                                review.selection,
                                egui::Rect::from_min_max(egui::Pos2::ZERO, egui::pos2(1.0, 1.0)),
                                egui::Color32::WHITE,
                            );
                        }
                        draw_selection_border(painter, review.selection);
                    }
                }

                let reviewed = match &self.state {
                    UiState::Review(review) => Some(review.selection),
                    _ => None,
                };
                if let Some(selection) = reviewed {
                    // responsive width: 30% of screen width, clamped between 400 and 800
                    let panel_width = (screen_rect.width() * 0.3).clamp(400.0, 800.0);
                    let (pos, pivot) =
                        calculate_popup_position(selection, screen_rect, panel_width, 10.0, 400.0);
                    egui::Area::new(egui::Id::new("review_panel"))
                        .fixed_pos(pos)
                        .pivot(pivot)
                        .show(ctx, |ui| {
                            egui::Frame::popup(ui.style())
                                .fill(egui::Color32::from_rgb(30, 30, 30))
                                .stroke(egui::Stroke::new(1.0, egui::Color32::GRAY))
                                .inner_margin(10.0)
                                .show(ui, |ui| {
                                    ui.set_width(panel_width);
                                    self.render_review_panel(ui, ctx);
                                });
                        });
                }
            });
    }
}

/// Opens the overlay and blocks until it is closed.
pub fn run(
    config: Config,
    bridge: Arc<FrameCaptureBridge>,
    client: Arc<StreamingQueryClient>,
) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_fullscreen(true)
            .with_decorations(false)
            .with_transparent(true)
            .with_always_on_top(),
        ..Default::default()
    };

    let displays = bridge.displays()?;
    log::info!(
        "Opening overlay across {} display(s), settle delay {}ms",
        displays.len(),
        config.settle_delay.as_millis()
    );

    eframe::run_native(
        "Glance",
        options,
        Box::new(move |cc| {
            let app = OverlayApp::new(cc.egui_ctx.clone(), bridge, client, config)?;
            Ok(Box::new(app) as Box<dyn eframe::App>)
        }),
    )
    .map_err(|e| AppError::ui(format!("Failed to run UI: {}", e)))
}

impl Drop for OverlayApp {
    fn drop(&mut self) {
        self.controller.close(&mut self.host);
    }
}
