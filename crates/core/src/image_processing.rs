//! Cropping captured frames and encoding them for transport.
//!
//! # Coordinate Mapping
//!
//! Selections arrive monitor-relative in display points. A frame may be at a
//! different resolution (e.g. a 1440x900 point display captured at 2880x1800),
//! so the region is scaled by the frame/display ratio after the optional
//! vertical flip. The flip always uses the target display's own height.

use crate::capture::{BYTES_PER_PIXEL, CapturedFrame, DisplayInfo};
use crate::error::AnalysisError;
use crate::geometry::{AxisOrientation, Rect, to_flipped_image_space};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader, Rgb, RgbImage, RgbaImage};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// Quality factor used when nothing else is configured.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.8;

/// How an [`EncodedImage`] travels to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEncoding {
    /// `data:<mime>;base64,<payload>` inside the request body.
    InlineBase64,
}

/// A compressed, immutable image ready to be attached to a request.
///
/// Cloning shares the underlying bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
    mime_type: &'static str,
    encoding: TransportEncoding,
}

impl EncodedImage {
    pub fn from_parts(bytes: Vec<u8>, mime_type: &'static str, width: u32, height: u32) -> Self {
        Self {
            bytes: bytes.into(),
            width,
            height,
            mime_type,
            encoding: TransportEncoding::InlineBase64,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn encoding(&self) -> TransportEncoding {
        self.encoding
    }

    /// The bare base64 payload.
    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// The self-describing form sent to chat endpoints.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Image processing for the selection workflow.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Crops `frame` to a monitor-relative selection.
    ///
    /// Returns `None` for the defined empty cases: the region has no area,
    /// lies entirely outside the frame, or the frame buffer is malformed.
    /// Regions that overlap the frame partially are clamped to it.
    pub fn crop(
        frame: &CapturedFrame,
        region: Rect,
        display: &DisplayInfo,
        orientation: AxisOrientation,
    ) -> Option<RgbaImage> {
        if !frame.is_well_formed() {
            log::warn!("Discarding malformed frame {:?}", frame);
            return None;
        }

        let region = match orientation {
            AxisOrientation::TopDown => region,
            AxisOrientation::BottomUp => to_flipped_image_space(region, display.frame.height),
        };
        let (x, y, width, height) =
            Self::pixel_region(region, display.frame, frame.width(), frame.height())?;

        let mut pixels = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        let start = x as usize * BYTES_PER_PIXEL;
        let end = start + width as usize * BYTES_PER_PIXEL;
        for row in y..y + height {
            pixels.extend_from_slice(&frame.row(row)?[start..end]);
        }
        RgbaImage::from_raw(width, height, pixels)
    }

    /// Maps a region in display points onto whole frame pixels, clamped to
    /// the frame.
    fn pixel_region(
        region: Rect,
        display_frame: Rect,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        if region.is_empty() {
            return None;
        }

        // Calculate scaling factors between display points and frame pixels
        let scale_x = if display_frame.width > 0.0 {
            f64::from(frame_width) / display_frame.width
        } else {
            1.0
        };
        let scale_y = if display_frame.height > 0.0 {
            f64::from(frame_height) / display_frame.height
        } else {
            1.0
        };

        let bounds = Rect::new(0.0, 0.0, f64::from(frame_width), f64::from(frame_height));
        let clipped = region.scaled(scale_x, scale_y).intersection(&bounds)?;

        let x0 = clipped.x.round() as u32;
        let y0 = clipped.y.round() as u32;
        let x1 = (clipped.max_x().round() as u32).min(frame_width);
        let y1 = (clipped.max_y().round() as u32).min(frame_height);

        let (width, height) = (x1.saturating_sub(x0), y1.saturating_sub(y0));
        (width > 0 && height > 0).then_some((x0, y0, width, height))
    }

    /// Re-encodes an image as JPEG at `quality` (0 to 1).
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::ImageConversionFailed`] for zero-size images
    /// or when the encoder fails.
    pub fn encode(image: &RgbaImage, quality: f32) -> Result<EncodedImage, AnalysisError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(AnalysisError::ImageConversionFailed);
        }

        // JPEG has no alpha channel
        let rgb = RgbImage::from_fn(width, height, |x, y| {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            Rgb([r, g, b])
        });

        let mut buffer: Vec<u8> = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, Self::jpeg_quality(quality))
            .encode_image(&rgb)
            .map_err(|e| {
                log::error!("Failed to encode image: {}", e);
                AnalysisError::ImageConversionFailed
            })?;

        log::debug!(
            "Encoded {}x{} region as JPEG ({} bytes)",
            width,
            height,
            buffer.len()
        );
        Ok(EncodedImage::from_parts(buffer, "image/jpeg", width, height))
    }

    /// Checks that the encoded bytes decode as the declared format.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidImageData`] otherwise.
    pub fn validate(encoded: &EncodedImage) -> Result<(), AnalysisError> {
        if encoded.is_empty() {
            return Err(AnalysisError::InvalidImageData);
        }

        let reader = ImageReader::new(Cursor::new(encoded.bytes()))
            .with_guessed_format()
            .map_err(|_| AnalysisError::InvalidImageData)?;
        if reader.format() != ImageFormat::from_mime_type(encoded.mime_type()) {
            return Err(AnalysisError::InvalidImageData);
        }
        reader
            .into_dimensions()
            .map(|_| ())
            .map_err(|_| AnalysisError::InvalidImageData)
    }

    /// Maps a 0 to 1 factor onto the encoder's 1-100 scale.
    fn jpeg_quality(quality: f32) -> u8 {
        let quality = if quality.is_finite() {
            quality
        } else {
            DEFAULT_JPEG_QUALITY
        };
        (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A frame whose every pixel encodes its own row in the red channel and
    /// its column in the green channel.
    fn gradient_frame(width: u32, height: u32) -> CapturedFrame {
        let mut data = Vec::with_capacity((width * height) as usize * 4);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[y as u8, x as u8, 0, 255]);
            }
        }
        CapturedFrame::from_rgba(width, height, data)
    }

    fn display(width: f64, height: f64) -> DisplayInfo {
        DisplayInfo {
            id: 1,
            frame: Rect::new(0.0, 0.0, width, height),
            scale_factor: 1.0,
            is_primary: true,
        }
    }

    #[test]
    fn crop_inside_bounds_has_requested_size() {
        let frame = gradient_frame(100, 80);
        let cropped = ImageProcessor::crop(
            &frame,
            Rect::new(10.0, 20.0, 30.0, 40.0),
            &display(100.0, 80.0),
            AxisOrientation::TopDown,
        )
        .unwrap();

        assert_eq!(cropped.dimensions(), (30, 40));
        assert_eq!(cropped.get_pixel(0, 0).0, [20, 10, 0, 255]);
        assert_eq!(cropped.get_pixel(29, 39).0, [59, 39, 0, 255]);
    }

    #[test]
    fn bottom_up_regions_are_flipped_against_display_height() {
        let frame = gradient_frame(8, 8);
        // The bottom row in a bottom-up system is the last buffer row.
        let cropped = ImageProcessor::crop(
            &frame,
            Rect::new(0.0, 0.0, 8.0, 1.0),
            &display(8.0, 8.0),
            AxisOrientation::BottomUp,
        )
        .unwrap();

        assert_eq!(cropped.dimensions(), (8, 1));
        assert_eq!(cropped.get_pixel(3, 0).0, [7, 3, 0, 255]);
    }

    #[test]
    fn hidpi_frames_scale_points_to_pixels() {
        let frame = gradient_frame(100, 100);
        let cropped = ImageProcessor::crop(
            &frame,
            Rect::new(10.0, 10.0, 20.0, 5.0),
            &display(50.0, 50.0),
            AxisOrientation::TopDown,
        )
        .unwrap();

        assert_eq!(cropped.dimensions(), (40, 10));
        assert_eq!(cropped.get_pixel(0, 0).0, [20, 20, 0, 255]);
    }

    #[test]
    fn partial_overlap_is_clamped() {
        let frame = gradient_frame(50, 50);
        let cropped = ImageProcessor::crop(
            &frame,
            Rect::new(40.0, -5.0, 30.0, 15.0),
            &display(50.0, 50.0),
            AxisOrientation::TopDown,
        )
        .unwrap();

        assert_eq!(cropped.dimensions(), (10, 10));
    }

    #[test]
    fn empty_results_are_none() {
        let frame = gradient_frame(50, 50);
        let d = display(50.0, 50.0);

        let zero_area = Rect::new(10.0, 10.0, 0.0, 25.0);
        assert!(ImageProcessor::crop(&frame, zero_area, &d, AxisOrientation::TopDown).is_none());

        let outside = Rect::new(60.0, 60.0, 10.0, 10.0);
        assert!(ImageProcessor::crop(&frame, outside, &d, AxisOrientation::TopDown).is_none());

        let malformed = CapturedFrame::from_rgba(50, 50, vec![0; 16]);
        let inside = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(ImageProcessor::crop(&malformed, inside, &d, AxisOrientation::TopDown).is_none());
    }

    #[test]
    fn encode_produces_jpeg_data_uri() {
        let image = RgbaImage::from_pixel(16, 12, image::Rgba([200, 30, 30, 255]));
        let encoded = ImageProcessor::encode(&image, DEFAULT_JPEG_QUALITY).unwrap();

        assert_eq!(&encoded.bytes()[..2], &[0xFF, 0xD8]);
        assert_eq!((encoded.width(), encoded.height()), (16, 12));
        assert_eq!(encoded.encoding(), TransportEncoding::InlineBase64);
        assert!(encoded.data_uri().starts_with("data:image/jpeg;base64,/9j/"));
        assert!(ImageProcessor::validate(&encoded).is_ok());
    }

    #[test]
    fn encode_rejects_zero_size() {
        let image = RgbaImage::new(0, 10);
        assert_eq!(
            ImageProcessor::encode(&image, 0.5),
            Err(AnalysisError::ImageConversionFailed)
        );
    }

    #[test]
    fn validate_rejects_garbage() {
        let empty = EncodedImage::from_parts(Vec::new(), "image/jpeg", 0, 0);
        assert_eq!(ImageProcessor::validate(&empty), Err(AnalysisError::InvalidImageData));

        let garbage = EncodedImage::from_parts(b"not an image".to_vec(), "image/jpeg", 1, 1);
        assert_eq!(ImageProcessor::validate(&garbage), Err(AnalysisError::InvalidImageData));
    }

    #[test]
    fn quality_maps_onto_encoder_scale() {
        assert_eq!(ImageProcessor::jpeg_quality(0.8), 80);
        assert_eq!(ImageProcessor::jpeg_quality(0.0), 1);
        assert_eq!(ImageProcessor::jpeg_quality(7.0), 100);
        assert_eq!(ImageProcessor::jpeg_quality(f32::NAN), 80);
    }
}
