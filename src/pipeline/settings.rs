//! Render settings: the option domain that fingerprints a produced DNG.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bitflags::bitflags;

use crate::container::{CameraConfiguration, CameraFrameMetadata};

bitflags! {
    /// Feature toggles applied per mount.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderOptions: u32 {
        const DRAFT                     = 1 << 0;
        const APPLY_VIGNETTE_CORRECTION = 1 << 1;
        const NORMALIZE_SHADING_MAP     = 1 << 2;
        const DEBUG_SHADING_MAP         = 1 << 3;
        const VIGNETTE_ONLY_COLOR       = 1 << 4;
        const NORMALIZE_EXPOSURE        = 1 << 5;
        const FRAMERATE_CONVERSION      = 1 << 6;
        const CROPPING                  = 1 << 7;
        const CAMMODEL_OVERRIDE         = 1 << 8;
        const LOG_TRANSFORM             = 1 << 9;
        const INTERPRET_AS_QUAD_BAYER   = 1 << 10;
    }
}

/// How quad-Bayer frames are presented to the DNG reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuadBayerMode {
    Remosaic,
    WrongCfaMetadata,
    CorrectQbCfaMetadata,
}

/// Log tone-mapping variants; the `ReduceBy*` flavors trade bit depth for
/// highlight headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTransform {
    Disabled,
    KeepInput,
    ReduceBy2Bit,
    ReduceBy4Bit,
    ReduceBy6Bit,
    ReduceBy8Bit,
}

/// Target selection for constant-frame-rate conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CfrMode {
    PreferInteger,
    PreferDropFrame,
    MedianSlowMotion,
    AverageTesting,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfrTarget {
    pub mode: CfrMode,
    /// Only consulted when `mode` is [`CfrMode::Custom`].
    pub custom_value: f64,
}

impl Default for CfrTarget {
    fn default() -> Self {
        Self {
            mode: CfrMode::PreferDropFrame,
            custom_value: 0.0,
        }
    }
}

/// Everything that influences the bytes of a produced DNG.
///
/// Two settings values with equal [`fingerprint`](Self::fingerprint)s yield
/// byte-identical artifacts for the same source frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub options: RenderOptions,
    /// Integer downscale factor; forced even when greater than one.
    pub draft_scale: u32,
    pub cfr_target: CfrTarget,
    /// `"WxH"` or empty for no crop.
    pub crop_target: String,
    pub camera_model: String,
    /// `"Dynamic"`, `"Static"`, or `"WHITE/BLACK[,B,B,B]"`.
    pub levels: String,
    pub log_transform: LogTransform,
    /// A float followed by "ev", e.g. `"+1.5ev"`.
    pub exposure_compensation: String,
    pub quad_bayer: QuadBayerMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            options: RenderOptions::empty(),
            draft_scale: 1,
            cfr_target: CfrTarget::default(),
            crop_target: String::new(),
            camera_model: "Panasonic".to_string(),
            levels: "Dynamic".to_string(),
            log_transform: LogTransform::KeepInput,
            exposure_compensation: "0ev".to_string(),
            quad_bayer: QuadBayerMode::Remosaic,
        }
    }
}

impl RenderSettings {
    /// Stable in-process summary used as part of cache keys.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.options.bits().hash(&mut hasher);
        self.draft_scale.hash(&mut hasher);
        (self.cfr_target.mode as u8).hash(&mut hasher);
        self.cfr_target.custom_value.to_bits().hash(&mut hasher);
        self.crop_target.hash(&mut hasher);
        self.camera_model.hash(&mut hasher);
        self.levels.hash(&mut hasher);
        self.log_transform.hash(&mut hasher);
        self.exposure_compensation.hash(&mut hasher);
        self.quad_bayer.hash(&mut hasher);
        hasher.finish()
    }

    /// The downscale factor actually applied: even, at least 2, only in
    /// draft mode.
    pub fn effective_scale(&self) -> u32 {
        if self.options.contains(RenderOptions::DRAFT) {
            ((self.draft_scale / 2) * 2).max(2)
        } else {
            1
        }
    }

    /// The log transform in effect, honoring the LOG_TRANSFORM flag.
    pub fn effective_log_transform(&self) -> LogTransform {
        if self.options.contains(RenderOptions::LOG_TRANSFORM) {
            self.log_transform
        } else {
            LogTransform::Disabled
        }
    }

    /// Exposure offset in EV: the camera-model bias plus the parsed
    /// compensation string. Unparsable compensation contributes zero.
    pub fn exposure_offset(&self) -> f64 {
        let base = if self.camera_model == "Panasonic" {
            -2.0
        } else {
            0.0
        };
        base + parse_ev(&self.exposure_compensation).unwrap_or(0.0)
    }
}

/// Parse `"1.5ev"` / `"-2ev"` / `"0.3"` into an EV float.
fn parse_ev(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    let numeric = trimmed
        .strip_suffix("ev")
        .or_else(|| trimmed.strip_suffix("EV"))
        .unwrap_or(trimmed);
    numeric.trim().parse::<f64>().ok()
}

/// Parse a `"WxH"` crop target. Malformed input yields `None`, which callers
/// treat as "no crop".
pub fn parse_crop_target(input: &str) -> Option<(u32, u32)> {
    let (w, h) = input.split_once('x')?;
    let width = w.trim().parse::<u32>().ok()?;
    let height = h.trim().parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Resolve the black/white levels the processor linearizes against.
///
/// `"Dynamic"` (and anything unparsable) picks the per-frame levels,
/// `"Static"` the container-wide calibration, and `"WHITE/BLACK"` an explicit
/// override where black may be one value or up to four comma-separated ones.
pub fn resolve_levels(
    levels: &str,
    metadata: &CameraFrameMetadata,
    configuration: &CameraConfiguration,
) -> ([f32; 4], f32) {
    let mut black = metadata.dynamic_black_level;
    let mut white = metadata.dynamic_white_level;

    if levels == "Static" {
        black = configuration.black_level;
        white = configuration.white_level;
    } else if !levels.is_empty() && levels != "Dynamic" {
        if let Some((white_str, black_str)) = levels.split_once('/') {
            if let Ok(parsed_white) = white_str.trim().parse::<f32>() {
                let mut parsed_black = [0.0f32; 4];
                let mut ok = true;

                if black_str.contains(',') {
                    // Up to four per-channel values; unspecified channels stay 0.
                    let mut count = 0;
                    for (i, part) in black_str.split(',').take(4).enumerate() {
                        match part.trim().parse::<f32>() {
                            Ok(v) => {
                                parsed_black[i] = v;
                                count = i + 1;
                            }
                            Err(_) => {
                                ok = false;
                                break;
                            }
                        }
                    }
                    ok = ok && count > 0;
                } else {
                    match black_str.trim().parse::<f32>() {
                        Ok(v) => parsed_black = [v; 4],
                        Err(_) => ok = false,
                    }
                }

                if ok {
                    white = parsed_white;
                    black = parsed_black;
                }
            }
        }
    }

    (black, white)
}
