//! Per-frame and per-container metadata as delivered by the MCRAW reader.

/// Physical orientation of the device while the frame was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenOrientation {
    Portrait,
    ReversePortrait,
    Landscape,
    ReverseLandscape,
}

/// Metadata attached to a single frame in the container.
#[derive(Debug, Clone)]
pub struct CameraFrameMetadata {
    pub iso: u32,
    /// Exposure time in nanoseconds.
    pub exposure_time_ns: u64,
    pub as_shot_neutral: [f32; 3],
    pub dynamic_black_level: [f32; 4],
    pub dynamic_white_level: f32,
    /// Per-channel gain planes, row-major. Usually four planes for Bayer.
    pub lens_shading_map: Vec<Vec<f32>>,
    pub lens_shading_map_width: usize,
    pub lens_shading_map_height: usize,
    /// Full sensor dimensions, before any in-camera crop.
    pub original_width: u32,
    pub original_height: u32,
    /// Dimensions of the payload actually stored for this frame.
    pub width: u32,
    pub height: u32,
    pub orientation: ScreenOrientation,
    pub need_remosaic: bool,
    /// Capture timestamp in nanoseconds.
    pub timestamp_ns: i64,
}

impl CameraFrameMetadata {
    /// True when the shading map carries at least one plane with data.
    pub fn has_shading_map(&self) -> bool {
        !self.lens_shading_map.is_empty()
            && self.lens_shading_map_width > 0
            && self.lens_shading_map_height > 0
            && !self.lens_shading_map[0].is_empty()
    }
}

/// Settings the capture app baked into the container.
#[derive(Debug, Clone, Default)]
pub struct PostProcessSettings {
    pub flipped: bool,
    /// Device build model, used as the fallback UniqueCameraModel.
    pub build_model: String,
}

/// Container-wide camera description, constant for a mount.
#[derive(Debug, Clone)]
pub struct CameraConfiguration {
    /// Bayer layout as a lowercase string: "rggb", "bggr", "grbg" or "gbrg".
    pub sensor_arrangement: String,
    pub black_level: [f32; 4],
    pub white_level: f32,
    pub color_matrix1: [f32; 9],
    pub color_matrix2: [f32; 9],
    pub forward_matrix1: [f32; 9],
    pub forward_matrix2: [f32; 9],
    /// Illuminant names as stored by the capture app ("d65", "standarda", ...).
    pub color_illuminant1: String,
    pub color_illuminant2: String,
    pub post_process: PostProcessSettings,
}

/// PCM audio payload carried alongside the frames.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    /// Interleaved little-endian 16-bit PCM samples.
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}
