// THEORY:
// `SkinRegionDetector` is the loadable model behind the `FaceGuard`. It is a
// lightweight, parametric detector rather than a neural network: its weights
// are a handful of thresholds read from `face_detector.json` in the model
// directory.
//
// Algorithm steps:
// 1.  **Chunk grid**: the frame is sliced into square chunks. Each chunk counts
//     how many of its pixels fall inside the YCbCr skin window, which pools out
//     single-pixel noise the same way a grid of averages does.
// 2.  **Skin mask**: a chunk is "skin" when its skin-pixel ratio passes
//     `min_chunk_skin_ratio`.
// 3.  **Region growing**: connected skin chunks (8-neighbourhood) are grown into
//     regions with a breadth-first flood fill.
// 4.  **Shape filtering**: a region is reported as a face when it is big enough,
//     not so big that it is the whole scene, roughly face-shaped, and densely
//     filled inside its bounding box.
//
// Green leaf tissue sits far below the skin window on the Cr axis, so a frame
// full of foliage produces an empty mask.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core_modules::face_guard::{FaceBounds, FaceDetectionError, FaceDetector, FaceModelError};
use crate::core_modules::frame::RgbaFrame;
use crate::core_modules::pixel::pixel::Pixel;

/// File name of the model parameters inside the model directory.
pub const MODEL_FILE_NAME: &str = "face_detector.json";

/// Tunable parameters of the skin-region model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinModelParams {
    /// Side length of a grid chunk, in pixels.
    pub chunk_size: u32,
    /// Inclusive Cb window for skin pixels.
    pub cb_range: (f32, f32),
    /// Inclusive Cr window for skin pixels.
    pub cr_range: (f32, f32),
    /// Pixels darker than this luma are never skin.
    pub min_luma: f32,
    /// Fraction of skin pixels a chunk needs to count as skin.
    pub min_chunk_skin_ratio: f32,
    /// Smallest region, in chunks, that can be a face.
    pub min_region_chunks: usize,
    /// Regions covering more than this fraction of the grid are scenery, not faces.
    pub max_region_fraction: f32,
    /// Allowed bounding-box width / height ratio.
    pub aspect_range: (f32, f32),
    /// Minimum share of the bounding box the region must fill.
    pub min_fill: f32,
}

impl Default for SkinModelParams {
    fn default() -> Self {
        Self {
            chunk_size: 8,
            cb_range: (77.0, 127.0),
            cr_range: (133.0, 173.0),
            min_luma: 40.0,
            min_chunk_skin_ratio: 0.6,
            min_region_chunks: 6,
            max_region_fraction: 0.6,
            aspect_range: (0.5, 1.6),
            min_fill: 0.45,
        }
    }
}

impl SkinModelParams {
    fn validate(&self) -> Result<(), FaceModelError> {
        let invalid = |msg: &str| Err(FaceModelError::Invalid(msg.to_string()));
        if self.chunk_size == 0 {
            return invalid("chunk_size must be positive");
        }
        if self.cb_range.0 > self.cb_range.1 || self.cr_range.0 > self.cr_range.1 {
            return invalid("chroma ranges must be ordered low to high");
        }
        if self.aspect_range.0 <= 0.0 || self.aspect_range.0 > self.aspect_range.1 {
            return invalid("aspect_range must be positive and ordered");
        }
        for (name, value) in [
            ("min_chunk_skin_ratio", self.min_chunk_skin_ratio),
            ("max_region_fraction", self.max_region_fraction),
            ("min_fill", self.min_fill),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(FaceModelError::Invalid(format!("{name} must be in (0, 1]")));
            }
        }
        if self.min_region_chunks == 0 {
            return invalid("min_region_chunks must be positive");
        }
        Ok(())
    }
}

/// A connected group of skin chunks, in grid coordinates.
struct SkinRegion {
    chunks: Vec<(u32, u32)>,
    skin_ratio_sum: f32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl SkinRegion {
    fn grid_width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn grid_height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn fill(&self) -> f32 {
        self.chunks.len() as f32 / (self.grid_width() * self.grid_height()) as f32
    }

    fn mean_skin_ratio(&self) -> f32 {
        self.skin_ratio_sum / self.chunks.len() as f32
    }
}

/// Per-chunk skin ratios over a `grid_width` × `grid_height` grid.
struct SkinGrid {
    grid_width: u32,
    grid_height: u32,
    ratios: Vec<f32>,
}

impl SkinGrid {
    fn ratio(&self, x: u32, y: u32) -> f32 {
        self.ratios[(y * self.grid_width + x) as usize]
    }
}

pub struct SkinRegionDetector {
    params: SkinModelParams,
}

impl SkinRegionDetector {
    pub fn new(params: SkinModelParams) -> Result<Self, FaceModelError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Reads `MODEL_FILE_NAME` from `model_dir`.
    pub async fn load(model_dir: impl AsRef<Path>) -> Result<Self, FaceModelError> {
        let path = model_dir.as_ref().join(MODEL_FILE_NAME);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => FaceModelError::Missing(path.clone()),
            _ => FaceModelError::Io(e),
        })?;
        let params: SkinModelParams = serde_json::from_str(&raw)?;
        Self::new(params)
    }

    pub fn params(&self) -> &SkinModelParams {
        &self.params
    }

    fn is_skin(&self, pixel: &Pixel) -> bool {
        let (y, cb, cr) = pixel.to_ycbcr();
        y >= self.params.min_luma
            && (self.params.cb_range.0..=self.params.cb_range.1).contains(&cb)
            && (self.params.cr_range.0..=self.params.cr_range.1).contains(&cr)
    }

    fn skin_grid(&self, frame: &RgbaFrame) -> SkinGrid {
        let chunk = self.params.chunk_size;
        let grid_width = frame.width() / chunk;
        let grid_height = frame.height() / chunk;
        let mut ratios = Vec::with_capacity((grid_width * grid_height) as usize);

        for gy in 0..grid_height {
            for gx in 0..grid_width {
                let mut skin = 0u32;
                for y in gy * chunk..(gy + 1) * chunk {
                    for x in gx * chunk..(gx + 1) * chunk {
                        if frame.pixel_at(x, y).is_some_and(|p| self.is_skin(&p)) {
                            skin += 1;
                        }
                    }
                }
                ratios.push(skin as f32 / (chunk * chunk) as f32);
            }
        }

        SkinGrid {
            grid_width,
            grid_height,
            ratios,
        }
    }

    fn grow_regions(&self, grid: &SkinGrid) -> Vec<SkinRegion> {
        let is_seed = |x: u32, y: u32| grid.ratio(x, y) >= self.params.min_chunk_skin_ratio;
        let mut visited = vec![false; grid.ratios.len()];
        let mut regions = Vec::new();

        for y in 0..grid.grid_height {
            for x in 0..grid.grid_width {
                let idx = (y * grid.grid_width + x) as usize;
                if visited[idx] || !is_seed(x, y) {
                    continue;
                }

                visited[idx] = true;
                let mut region = SkinRegion {
                    chunks: Vec::new(),
                    skin_ratio_sum: 0.0,
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                };
                let mut queue = VecDeque::from([(x, y)]);

                while let Some((cx, cy)) = queue.pop_front() {
                    region.chunks.push((cx, cy));
                    region.skin_ratio_sum += grid.ratio(cx, cy);
                    region.min_x = region.min_x.min(cx);
                    region.min_y = region.min_y.min(cy);
                    region.max_x = region.max_x.max(cx);
                    region.max_y = region.max_y.max(cy);

                    for dy in -1i64..=1 {
                        for dx in -1i64..=1 {
                            if dx == 0 && dy == 0 {
                                continue;
                            }
                            let nx = cx as i64 + dx;
                            let ny = cy as i64 + dy;
                            if nx < 0 || ny < 0 || nx >= grid.grid_width as i64 || ny >= grid.grid_height as i64 {
                                continue;
                            }
                            let (nx, ny) = (nx as u32, ny as u32);
                            let n_idx = (ny * grid.grid_width + nx) as usize;
                            if !visited[n_idx] && is_seed(nx, ny) {
                                visited[n_idx] = true;
                                queue.push_back((nx, ny));
                            }
                        }
                    }
                }

                regions.push(region);
            }
        }

        regions
    }

    fn is_face_shaped(&self, region: &SkinRegion, total_chunks: usize) -> bool {
        let size = region.chunks.len();
        let aspect = region.grid_width() as f32 / region.grid_height() as f32;
        size >= self.params.min_region_chunks
            && (size as f32 / total_chunks as f32) <= self.params.max_region_fraction
            && (self.params.aspect_range.0..=self.params.aspect_range.1).contains(&aspect)
            && region.fill() >= self.params.min_fill
    }
}

impl FaceDetector for SkinRegionDetector {
    fn detect_faces(&self, frame: &RgbaFrame) -> Result<Vec<FaceBounds>, FaceDetectionError> {
        let grid = self.skin_grid(frame);
        if grid.ratios.is_empty() {
            return Ok(Vec::new());
        }

        let chunk = self.params.chunk_size;
        let faces = self
            .grow_regions(&grid)
            .into_iter()
            .filter(|region| self.is_face_shaped(region, grid.ratios.len()))
            .map(|region| FaceBounds {
                x: region.min_x * chunk,
                y: region.min_y * chunk,
                width: region.grid_width() * chunk,
                height: region.grid_height() * chunk,
                confidence: (region.fill() * region.mean_skin_ratio()).clamp(0.0, 1.0),
            })
            .collect();
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAF: Pixel = Pixel::opaque(40, 140, 50);
    const SKIN: Pixel = Pixel::opaque(224, 172, 140);

    fn detector() -> SkinRegionDetector {
        SkinRegionDetector::new(SkinModelParams::default()).unwrap()
    }

    #[test]
    fn leaf_tones_are_not_skin() {
        assert!(!detector().is_skin(&LEAF));
        assert!(detector().is_skin(&SKIN));
        assert!(!detector().is_skin(&Pixel::opaque(20, 14, 11)));
    }

    #[test]
    fn plain_leaf_frame_has_no_faces() {
        let frame = RgbaFrame::filled(64, 64, LEAF);
        assert!(detector().detect_faces(&frame).unwrap().is_empty());
    }

    #[test]
    fn face_sized_skin_patch_is_detected() {
        let mut frame = RgbaFrame::filled(64, 64, LEAF);
        frame.fill_rect(16, 16, 24, 32, SKIN);
        let faces = detector().detect_faces(&frame).unwrap();
        assert_eq!(faces.len(), 1);
        let face = faces[0];
        assert_eq!((face.x, face.y, face.width, face.height), (16, 16, 24, 32));
        assert!(face.confidence > 0.9);
    }

    #[test]
    fn tiny_or_elongated_patches_are_ignored() {
        let mut frame = RgbaFrame::filled(64, 64, LEAF);
        frame.fill_rect(0, 0, 8, 8, SKIN);
        frame.fill_rect(0, 40, 64, 8, SKIN);
        assert!(detector().detect_faces(&frame).unwrap().is_empty());
    }

    #[test]
    fn whole_frame_skin_is_scenery() {
        let frame = RgbaFrame::filled(64, 64, SKIN);
        assert!(detector().detect_faces(&frame).unwrap().is_empty());
    }

    #[test]
    fn frames_smaller_than_a_chunk_are_ignored() {
        let frame = RgbaFrame::filled(4, 4, SKIN);
        assert!(detector().detect_faces(&frame).unwrap().is_empty());
        assert!(detector().detect_faces(&RgbaFrame::empty()).unwrap().is_empty());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let params = SkinModelParams {
            chunk_size: 0,
            ..SkinModelParams::default()
        };
        assert!(matches!(SkinRegionDetector::new(params), Err(FaceModelError::Invalid(_))));
        let params = SkinModelParams {
            min_fill: 1.5,
            ..SkinModelParams::default()
        };
        assert!(matches!(SkinRegionDetector::new(params), Err(FaceModelError::Invalid(_))));
    }

    #[tokio::test]
    async fn loads_parameters_from_the_model_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MODEL_FILE_NAME), r#"{ "chunk_size": 4, "min_region_chunks": 2 }"#).unwrap();
        let detector = SkinRegionDetector::load(dir.path()).await.unwrap();
        assert_eq!(detector.params().chunk_size, 4);
        assert_eq!(detector.params().min_region_chunks, 2);
        assert_eq!(detector.params().min_fill, SkinModelParams::default().min_fill);
    }

    #[tokio::test]
    async fn missing_model_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(SkinRegionDetector::load(dir.path()).await, Err(FaceModelError::Missing(_))));
    }
}
