// THEORY:
// The `Pixel` module is the smallest unit of the pipeline. It is a "dumb" data
// container for a single RGBA pixel plus the few single-pixel transforms the
// upper layers need:
//
// 1.  **Brightness boost**: the preprocessor scales the colour channels by a
//     constant factor and clamps them to the byte range. Alpha is never touched.
// 2.  **YCbCr projection**: the skin-region face detector classifies pixels in
//     YCbCr space, where skin tones cluster tightly in the chroma plane
//     regardless of brightness.
//
// Anything that needs a neighbour (regions, grids) lives in higher modules.

pub mod pixel {
    pub type Channel = u8;
    pub type Luma = f32;
    pub type Chroma = f32;

    /// Number of bytes per pixel in every raster handled by the pipeline.
    pub const CHANNELS: usize = 4;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl From<&[u8]> for Pixel {
        /// Reads the first four bytes of `bytes` as R, G, B, A.
        /// Missing trailing channels read as zero, except alpha which reads as opaque.
        fn from(bytes: &[u8]) -> Self {
            Pixel {
                red: bytes.first().copied().unwrap_or_default(),
                green: bytes.get(1).copied().unwrap_or_default(),
                blue: bytes.get(2).copied().unwrap_or_default(),
                alpha: bytes.get(3).copied().unwrap_or(u8::MAX),
            }
        }
    }

    impl Pixel {
        pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self { red, green, blue, alpha }
        }

        pub const fn opaque(red: Channel, green: Channel, blue: Channel) -> Self {
            Self::new(red, green, blue, u8::MAX)
        }

        /// Scales R, G and B by `factor`, clamped to 255. Alpha passes through.
        pub fn boosted(&self, factor: f64) -> Pixel {
            Pixel {
                red: scale_channel(self.red, factor),
                green: scale_channel(self.green, factor),
                blue: scale_channel(self.blue, factor),
                alpha: self.alpha,
            }
        }

        /// Writes the pixel into the first four bytes of `out`.
        pub fn write_to(&self, out: &mut [u8]) {
            out[0] = self.red;
            out[1] = self.green;
            out[2] = self.blue;
            out[3] = self.alpha;
        }

        /// JPEG-style (BT.601 full range) YCbCr projection of the colour channels.
        pub fn to_ycbcr(&self) -> (Luma, Chroma, Chroma) {
            let r = self.red as f32;
            let g = self.green as f32;
            let b = self.blue as f32;
            let y = 0.299 * r + 0.587 * g + 0.114 * b;
            let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
            let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
            (y, cb, cr)
        }
    }

    /// Clamped-byte conversion: values above 255 saturate, fractions round half to even.
    fn scale_channel(channel: Channel, factor: f64) -> Channel {
        (channel as f64 * factor).clamp(0.0, 255.0).round_ties_even() as Channel
    }
}
