//! UI state types and event definitions.

use crate::image_processing::EncodedImage;
use eframe::egui;
use image::RgbaImage;

/// Shown when the user submits an empty question.
pub const DEFAULT_QUERY: &str = "Explain what is in this image in detail.";

/// Current state of the overlay.
///
/// `Selecting` -> `Capturing` (overlay hidden) -> `Review`, or back to
/// `Selecting` when the capture produced nothing.
#[derive(Debug)]
pub enum UiState {
    /// Backdrop visible, waiting for or tracking a drag.
    Selecting,
    /// Overlay hidden while the frame is taken.
    Capturing,
    /// A captured region is on screen together with its answer.
    Review(Review),
}

/// The answer area of the review panel.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Answer {
    /// Nothing asked yet.
    #[default]
    Empty,
    /// Chunks received so far; more may follow.
    Streaming(String),
    Complete(String),
    /// Replaces whatever was streamed.
    Failed(String),
}

impl Answer {
    /// Text to render as markdown.
    pub fn text(&self) -> String {
        match self {
            Answer::Empty => String::new(),
            Answer::Streaming(text) | Answer::Complete(text) => text.clone(),
            Answer::Failed(message) => format!("Error: {}", message),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Answer::Streaming(_))
    }
}

/// A captured selection under review.
pub struct Review {
    /// Where the region sits in the overlay, in window points.
    pub selection: egui::Rect,
    pub image: RgbaImage,
    /// The image as sent to the model; `None` if encoding failed.
    pub encoded: Option<EncodedImage>,
    pub answer: Answer,
    /// Tag of the request whose output `answer` shows.
    pub request: u64,
}

impl std::fmt::Debug for Review {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Review")
            .field("selection", &self.selection)
            .field("image", &self.image.dimensions())
            .field("answer", &self.answer)
            .field("request", &self.request)
            .finish()
    }
}

impl Review {
    pub fn new(selection: egui::Rect, image: RgbaImage, encoded: Option<EncodedImage>) -> Self {
        let answer = match &encoded {
            Some(_) => Answer::Empty,
            None => Answer::Failed(crate::error::AnalysisError::ImageConversionFailed.to_string()),
        };
        Self {
            selection,
            image,
            encoded,
            answer,
            request: 0,
        }
    }

    /// Clears the answer for a new request tagged `request`.
    pub fn begin(&mut self, request: u64) {
        self.request = request;
        self.answer = Answer::Streaming(String::new());
    }

    /// Applies a stream event. Events for any other request are ignored.
    ///
    /// Returns whether the answer changed.
    pub fn apply(&mut self, event: &UiEvent) -> bool {
        match event {
            UiEvent::Chunk { request, text } if *request == self.request => {
                match &mut self.answer {
                    Answer::Streaming(current) => current.push_str(text),
                    _ => return false,
                }
                true
            }
            UiEvent::Finished { request, error } if *request == self.request => {
                let Answer::Streaming(text) = &mut self.answer else {
                    return false;
                };
                self.answer = match error {
                    Some(message) => Answer::Failed(message.clone()),
                    None => Answer::Complete(std::mem::take(text)),
                };
                true
            }
            _ => false,
        }
    }
}

/// Messages from background tasks to the UI thread.
#[derive(Debug)]
pub enum UiEvent {
    /// The settle delay of `session` elapsed; the screen is about to be
    /// sampled.
    Settled { session: crate::selection::SessionId },
    /// The capture task finished for the session it was started for.
    Captured {
        session: crate::selection::SessionId,
        image: Option<RgbaImage>,
    },
    /// A selection session completed, with or without an image.
    Selected(Option<RgbaImage>),
    /// A piece of the answer to request `request`.
    Chunk { request: u64, text: String },
    /// Request `request` ended.
    Finished { request: u64, error: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn review() -> Review {
        let image = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let encoded = crate::image_processing::ImageProcessor::encode(&image, 0.8).unwrap();
        Review::new(
            egui::Rect::from_min_size(egui::pos2(10.0, 10.0), egui::vec2(2.0, 2.0)),
            image,
            Some(encoded),
        )
    }

    fn chunk(request: u64, text: &str) -> UiEvent {
        UiEvent::Chunk {
            request,
            text: text.to_string(),
        }
    }

    #[test]
    fn accumulates_chunks_for_current_request() {
        let mut review = review();
        review.begin(1);
        assert!(review.apply(&chunk(1, "The")));
        assert!(review.apply(&chunk(1, " cat")));
        assert!(review.apply(&UiEvent::Finished {
            request: 1,
            error: None
        }));

        assert_eq!(review.answer, Answer::Complete("The cat".to_string()));
    }

    #[test]
    fn stale_request_is_ignored() {
        let mut review = review();
        review.begin(1);
        review.apply(&chunk(1, "old"));
        review.begin(2);

        assert!(!review.apply(&chunk(1, " late")));
        assert!(!review.apply(&UiEvent::Finished {
            request: 1,
            error: Some("boom".to_string())
        }));
        assert!(review.apply(&chunk(2, "new")));
        assert_eq!(review.answer, Answer::Streaming("new".to_string()));
    }

    #[test]
    fn failure_replaces_text_with_error() {
        let mut review = review();
        review.begin(3);
        review.apply(&chunk(3, "partial"));
        review.apply(&UiEvent::Finished {
            request: 3,
            error: Some("API Error: 401 Unauthorized".to_string()),
        });

        assert_eq!(review.answer.text(), "Error: API Error: 401 Unauthorized");
        assert!(!review.answer.is_streaming());
    }

    #[test]
    fn missing_encoding_is_reported_up_front() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let review = Review::new(egui::Rect::NOTHING, image, None);
        assert_eq!(review.answer.text(), "Error: Failed to convert image to required format");
    }
}
