// THEORY:
// Two image representations flow through the pipeline:
//
// 1.  `RgbaFrame`: a raw, row-major RGBA raster. This is what the camera path
//     produces and what the face guard and preprocessor consume.
// 2.  `EncodedImage`: a self-describing `data:` URL. This is the classifier's
//     input type on both acquisition paths, so a real inference engine only has
//     to understand one format.

use std::fmt;
use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("raster holds {actual} bytes but {width}x{height} RGBA needs {expected}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("not a base64 data URL")]
    NotADataUrl,
}

/// A row-major RGBA raster.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl fmt::Debug for RgbaFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbaFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// A zero-sized frame.
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    /// A frame where every pixel is `pixel`.
    pub fn filled(width: u32, height: u32, pixel: Pixel) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * CHANNELS];
        for out in data.chunks_exact_mut(CHANNELS) {
            pixel.write_to(out);
        }
        Self { width, height, data }
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            data: rgba.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the pixel at (`x`, `y`), or `None` outside the raster.
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some(Pixel::from(&self.data[start..start + CHANNELS]))
    }

    /// Paints an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, pixel: Pixel) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for row in y..y_end {
            for col in x..x_end {
                let start = (row as usize * self.width as usize + col as usize) * CHANNELS;
                pixel.write_to(&mut self.data[start..start + CHANNELS]);
            }
        }
    }
}

/// An image serialized as a `data:<media type>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// The URL a canvas produces for a zero-sized raster.
    pub const EMPTY: &'static str = "data:,";

    pub fn empty() -> Self {
        Self(Self::EMPTY.to_string())
    }

    /// Wraps raw file bytes without decoding them.
    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{media_type};base64,{}", STANDARD.encode(bytes)))
    }

    /// Encodes an RGBA raster as PNG.
    pub fn encode_png(width: u32, height: u32, raster: &[u8]) -> Result<Self, FrameError> {
        let mut buffer = Cursor::new(Vec::new());
        image::codecs::png::PngEncoder::new(&mut buffer).write_image(
            raster,
            width,
            height,
            ExtendedColorType::Rgba8,
        )?;
        Ok(Self::from_bytes("image/png", buffer.get_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == Self::EMPTY
    }

    /// The media type declared in the URL header, if any.
    pub fn media_type(&self) -> Option<&str> {
        let header = self.0.strip_prefix("data:")?.split(',').next()?;
        let media_type = header.split(';').next()?;
        (!media_type.is_empty()).then_some(media_type)
    }

    /// Decodes the base64 payload back to the original bytes.
    pub fn decode_payload(&self) -> Result<Vec<u8>, FrameError> {
        let (header, payload) = self
            .0
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or(FrameError::NotADataUrl)?;
        if !header.ends_with(";base64") {
            return Err(FrameError::NotADataUrl);
        }
        Ok(STANDARD.decode(payload)?)
    }

    /// Decodes the payload as an image.
    pub fn decode_frame(&self) -> Result<RgbaFrame, FrameError> {
        let bytes = self.decode_payload()?;
        let image = image::load_from_memory(&bytes)?;
        Ok(RgbaFrame::from_image(&image))
    }
}

impl fmt::Display for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
