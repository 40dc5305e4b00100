// THEORY:
// The preprocessor is the deterministic step between a captured frame and the
// classifier. It applies a flat brightness/contrast boost (colour channels
// ×1.1, saturating at 255, alpha untouched) and encodes the result as a PNG
// data URL, the classifier's input format.
//
// It is pure: the input frame is never modified and no state is kept between
// calls. A zero-sized frame yields the empty sentinel instead of an error.

pub mod preprocessor {
    use tracing::warn;

    use crate::core_modules::frame::{EncodedImage, RgbaFrame};
    use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};

    pub const BOOST_FACTOR: f64 = 1.1;

    /// Boosts every RGBA pixel of `raster` in place.
    pub fn boost_pixels(raster: &mut [u8]) {
        for bytes in raster.chunks_exact_mut(CHANNELS) {
            Pixel::from(&*bytes).boosted(BOOST_FACTOR).write_to(bytes);
        }
    }

    /// Returns a boosted copy of `frame`.
    pub fn boosted_frame(frame: &RgbaFrame) -> RgbaFrame {
        let mut raster = frame.as_bytes().to_vec();
        boost_pixels(&mut raster);
        RgbaFrame::new(frame.width(), frame.height(), raster).unwrap_or_else(|_| RgbaFrame::empty())
    }

    pub fn preprocess(frame: &RgbaFrame) -> EncodedImage {
        if frame.is_empty() {
            return EncodedImage::empty();
        }
        let boosted = boosted_frame(frame);
        match EncodedImage::encode_png(boosted.width(), boosted.height(), boosted.as_bytes()) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "failed to encode preprocessed frame");
                EncodedImage::empty()
            }
        }
    }
}
