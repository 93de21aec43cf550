//! Radiometric and geometric frame processing.
//!
//! Takes one raw Bayer payload and produces the remapped 16-bit image the
//! encoder packs and wraps: black/white level remap, optional shading-map
//! bake-in, optional log tone mapping with deterministic dither, optional
//! integer downscale, optional centered crop, and quad-Bayer layouts.

use tracing::debug;

use crate::container::{CameraConfiguration, CameraFrameMetadata};
use crate::pipeline::dng::opcodes::{lens_shading_gain_map, GainMap};
use crate::pipeline::error::{RenderError, Result};
use crate::pipeline::pack::bits_needed;
use crate::pipeline::settings::{
    parse_crop_target, resolve_levels, LogTransform, RenderOptions, RenderSettings,
};
use crate::pipeline::shading::ShadingMap;

/// CFA channel indices (0 = R, 1 = G, 2 = B) for a 2x2 Bayer tile.
pub fn cfa_pattern(sensor_arrangement: &str) -> Result<[u8; 4]> {
    match sensor_arrangement {
        "rggb" => Ok([0, 1, 1, 2]),
        "bggr" => Ok([2, 1, 1, 0]),
        "grbg" => Ok([1, 0, 2, 1]),
        "gbrg" => Ok([1, 2, 0, 1]),
        other => Err(RenderError::UnsupportedSensorArrangement(other.to_string())),
    }
}

/// Output of [`process`]: remapped samples plus the levels and opcode data
/// the DNG encoder needs.
#[derive(Debug)]
pub struct ProcessedFrame {
    /// Little-endian 16-bit samples, `width * height` of them.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub black_level: [u16; 4],
    pub white_level: u16,
    pub cfa: [u8; 4],
    /// True when the frame keeps its 4x4 quad-Bayer layout.
    pub quad_bayer: bool,
    /// Shading map forwarded as a GainMap opcode instead of baked in.
    pub gain_map: Option<GainMap>,
}

/// Triangular dither in [-0.5, 0.5], deterministic per pixel position.
#[inline]
fn triangular_dither(x: u32, y: u32, i: usize) -> f32 {
    let px = x.wrapping_add((i & 1) as u32);
    let py = y.wrapping_add((i >> 1) as u32);
    let mut seed =
        (px.wrapping_mul(1664525)).wrapping_add(py.wrapping_mul(1013904223)) ^ 0xdeadbeef;
    seed ^= seed >> 16;
    seed = seed.wrapping_mul(0x85ebca6b);
    seed ^= seed >> 13;
    seed = seed.wrapping_mul(0xc2b2ae35);
    seed ^= seed >> 16;
    let r1 = (seed & 0xffff) as f32 / 65535.0;
    let r2 = ((seed >> 16) & 0xffff) as f32 / 65535.0;
    (r1 + r2 - 1.0) * 0.5
}

/// The forward log curve: maps a linearized sample in [0, 1] onto the
/// destination range, with dither to decorrelate quantization.
#[inline]
fn log_encode(linearized: f32, dst_white: f32, x: u32, y: u32, i: usize) -> f32 {
    let log_value = (1.0 + 60.0 * linearized.max(0.0)).log2() / 61.0f32.log2();
    log_value * dst_white + triangular_dither(x, y, i)
}

#[inline]
fn read_sample(data: &[u8], index: usize) -> u16 {
    u16::from_le_bytes([data[2 * index], data[2 * index + 1]])
}

#[inline]
fn write_sample(data: &mut [u8], index: usize, value: u16) {
    data[2 * index..2 * index + 2].copy_from_slice(&value.to_le_bytes());
}

/// Resolve destination levels per the active options. Whenever the shading
/// map is baked in or a log variant is active the output is rescaled to a
/// power-of-two range with black at zero.
fn resolve_levels_mapping(
    src_black: [f32; 4],
    src_white: f32,
    apply_shading: bool,
    normalize_shading: bool,
    log_transform: LogTransform,
) -> ([f32; 4], f32) {
    let src_bits = bits_needed(src_white.round().clamp(0.0, 65535.0) as u16);

    let use_bits = if apply_shading || log_transform != LogTransform::Disabled {
        let bits = if normalize_shading && apply_shading {
            src_bits + 4
        } else {
            match log_transform {
                LogTransform::KeepInput => src_bits,
                LogTransform::ReduceBy2Bit => src_bits.saturating_sub(2),
                LogTransform::ReduceBy4Bit => src_bits.saturating_sub(4),
                LogTransform::ReduceBy6Bit => src_bits.saturating_sub(6),
                LogTransform::ReduceBy8Bit => src_bits.saturating_sub(8),
                LogTransform::Disabled => src_bits + 2,
            }
        };
        Some(bits.clamp(1, 16))
    } else {
        None
    };

    match use_bits {
        Some(bits) => ([0.0; 4], (1u32 << bits) as f32 - 1.0),
        None => (src_black, src_white),
    }
}

/// Run the full per-frame remap. `raw` holds little-endian 16-bit samples,
/// `metadata.width * metadata.height` of them.
pub fn process(
    raw: &[u8],
    metadata: &CameraFrameMetadata,
    configuration: &CameraConfiguration,
    settings: &RenderSettings,
) -> Result<ProcessedFrame> {
    let cfa = cfa_pattern(&configuration.sensor_arrangement)?;

    let src_width = metadata.width;
    let src_height = metadata.height;

    let needed = src_width as usize * src_height as usize * 2;
    if raw.len() < needed {
        return Err(RenderError::TruncatedFrame {
            got: raw.len(),
            need: needed,
        });
    }

    let options = settings.options;
    let apply_shading = options.contains(RenderOptions::APPLY_VIGNETTE_CORRECTION);
    let vignette_only_color = options.contains(RenderOptions::VIGNETTE_ONLY_COLOR);
    let normalize_shading = options.contains(RenderOptions::NORMALIZE_SHADING_MAP);
    let debug_shading = options.contains(RenderOptions::DEBUG_SHADING_MAP);
    let quad_bayer =
        metadata.need_remosaic || options.contains(RenderOptions::INTERPRET_AS_QUAD_BAYER);
    let log_transform = settings.effective_log_transform();

    let scale = settings.effective_scale();
    let cfa_size: u32 = if quad_bayer { 2 } else { 1 };

    // A crop only applies when the flag is on, parses, and fits the frame.
    let crop = if options.contains(RenderOptions::CROPPING) {
        parse_crop_target(&settings.crop_target)
            .filter(|&(w, h)| w <= src_width && h <= src_height)
    } else {
        None
    };

    let (base_width, base_height) = crop.unwrap_or((src_width, src_height));
    let mut out_width = base_width / scale;
    let mut out_height = base_height / scale;
    // Bayer tiles plus the 4-sample packing groups both want multiples of 4.
    out_width = (out_width / 4) * 4;
    out_height = (out_height / 4) * 4;

    if out_width == 0 || out_height == 0 {
        return Err(RenderError::DegenerateFrame {
            width: out_width,
            height: out_height,
        });
    }

    let (mut src_black, mut src_white) =
        resolve_levels(&settings.levels, metadata, configuration);

    // Downscaled quad-Bayer sums each 2x2 quadrant, quadrupling the range.
    if cfa_size > 1 && scale == 2 {
        src_white *= 4.0;
        for level in src_black.iter_mut() {
            *level *= 4.0;
        }
    }

    let (dst_black, dst_white) = resolve_levels_mapping(
        src_black,
        src_white,
        apply_shading,
        normalize_shading,
        log_transform,
    );

    let linear: [f32; 4] = std::array::from_fn(|i| 1.0 / (src_white - src_black[i]).max(1.0));

    // Sensor-relative offsets of the active area, used to sample the shading
    // map in original-sensor coordinates.
    let full_width = metadata.original_width.max(src_width);
    let full_height = metadata.original_height.max(src_height);
    let (left, top) = match crop {
        Some((crop_w, crop_h)) => ((full_width - crop_w) / 2, (full_height - crop_h) / 2),
        None => ((full_width - src_width) / 2, (full_height - src_height) / 2),
    };
    let map_scale_x = 1.0 / full_width as f32;
    let map_scale_y = 1.0 / full_height as f32;

    let mut shading = ShadingMap::new(
        metadata.lens_shading_map.clone(),
        metadata.lens_shading_map_width,
        metadata.lens_shading_map_height,
    );
    if apply_shading {
        if vignette_only_color {
            shading.retain_color_only();
        }
        if normalize_shading {
            shading.normalize();
        } else if debug_shading {
            shading.invert();
        }
    }

    // Shading map forwarded as an opcode only when it is not baked in.
    let gain_map = if !apply_shading {
        lens_shading_gain_map(metadata, out_width, out_height, left, top)
    } else {
        None
    };

    debug!(
        out_width,
        out_height,
        dst_white,
        scale,
        quad_bayer,
        "processing frame"
    );

    let mut dst = vec![0u8; out_width as usize * out_height as usize * 2];
    let row = out_width as usize;

    let block = 2 * if scale < 2 { cfa_size } else { 1 };
    let mut y = 0u32;
    while y < out_height {
        let mut x = 0u32;
        while x < out_width {
            let src_x = x * scale;
            let src_y = y * scale;

            if cfa_size < 2 || scale > 1 {
                process_bayer_block(
                    raw, &mut dst, src_width, row, src_x, src_y, x, y, scale, cfa_size, &cfa,
                    apply_shading, debug_shading, log_transform, &shading, &linear, &src_black,
                    src_white, &dst_black, dst_white, left, top, map_scale_x, map_scale_y,
                );
            } else {
                process_quad_block(
                    raw, &mut dst, src_width, row, src_x, src_y, x, y, apply_shading,
                    log_transform, &shading, &linear, &src_black, &dst_black, dst_white, left,
                    top, map_scale_x, map_scale_y,
                );
            }

            x += block;
        }
        y += block;
    }

    let black_level: [u16; 4] =
        std::array::from_fn(|i| dst_black[i].round().clamp(0.0, 65535.0) as u16);

    Ok(ProcessedFrame {
        data: dst,
        width: out_width,
        height: out_height,
        black_level,
        white_level: dst_white.round().clamp(0.0, 65535.0) as u16,
        cfa,
        quad_bayer,
        gain_map,
    })
}

/// Remap one 2x2 output tile (standard Bayer, or quad-Bayer once downscaled).
#[allow(clippy::too_many_arguments)]
fn process_bayer_block(
    raw: &[u8],
    dst: &mut [u8],
    src_width: u32,
    row: usize,
    src_x: u32,
    src_y: u32,
    x: u32,
    y: u32,
    scale: u32,
    cfa_size: u32,
    cfa: &[u8; 4],
    apply_shading: bool,
    debug_shading: bool,
    log_transform: LogTransform,
    shading: &ShadingMap,
    linear: &[f32; 4],
    src_black: &[f32; 4],
    src_white: f32,
    dst_black: &[f32; 4],
    dst_white: f32,
    left: u32,
    top: u32,
    map_scale_x: f32,
    map_scale_y: f32,
) {
    let stride = src_width as usize;
    let sx = src_x as usize;
    let sy = src_y as usize;

    let mut s = [0u16; 4];
    if cfa_size == 2 && scale == 2 {
        // Sum each same-color 2x2 quadrant of the 4x4 quad tile.
        for (slot, (qx, qy)) in [(0usize, 0usize), (2, 0), (0, 2), (2, 2)].iter().enumerate() {
            let mut sum = 0u32;
            for dy in 0..2 {
                for dx in 0..2 {
                    sum += read_sample(raw, (sy + qy + dy) * stride + sx + qx + dx) as u32;
                }
            }
            s[slot] = sum as u16;
        }
    } else {
        let step = cfa_size as usize;
        s[0] = read_sample(raw, sy * stride + sx);
        s[1] = read_sample(raw, sy * stride + sx + step);
        s[2] = read_sample(raw, (sy + step) * stride + sx);
        s[3] = read_sample(raw, (sy + step) * stride + sx + step);
    }

    let mut gains = [1.0f32; 4];
    if apply_shading {
        for i in 0..4 {
            let dx = if i & 1 == 1 { scale } else { 0 };
            let dy = if i >> 1 == 1 { scale } else { 0 };
            gains[i] = shading.sample(
                (src_x + left + dx) as f32 * map_scale_x,
                (src_y + top + dy) as f32 * map_scale_y,
                cfa[i] as usize,
            );
        }
    }

    let mut p = [0.0f32; 4];
    if debug_shading {
        // Render the gains themselves as a flat field.
        for i in 0..4 {
            p[i] = (linear[i] * (src_white - src_black[i]) * gains[i]).max(0.0)
                * (dst_white - dst_black[i]);
        }
    } else if log_transform == LogTransform::Disabled {
        for i in 0..4 {
            p[i] = (linear[i] * (s[i] as f32 - src_black[i]) * gains[i]).max(0.0)
                * (dst_white - dst_black[i]);
        }
    } else {
        for i in 0..4 {
            let linearized = (linear[i] * (s[i] as f32 - src_black[i]) * gains[i]).max(0.0);
            p[i] = log_encode(linearized, dst_white, x, y, i);
        }
    }

    for i in 0..4 {
        s[i] = (p[i] + dst_black[i]).round().clamp(0.0, dst_white) as u16;
    }

    let base = y as usize * row + x as usize;
    write_sample(dst, base, s[0]);
    write_sample(dst, base + 1, s[1]);
    write_sample(dst, base + row, s[2]);
    write_sample(dst, base + row + 1, s[3]);
}

/// Remap one full-resolution 4x4 quad-Bayer tile, preserving its layout.
#[allow(clippy::too_many_arguments)]
fn process_quad_block(
    raw: &[u8],
    dst: &mut [u8],
    src_width: u32,
    row: usize,
    src_x: u32,
    src_y: u32,
    x: u32,
    y: u32,
    apply_shading: bool,
    log_transform: LogTransform,
    shading: &ShadingMap,
    linear: &[f32; 4],
    src_black: &[f32; 4],
    dst_black: &[f32; 4],
    dst_white: f32,
    left: u32,
    top: u32,
    map_scale_x: f32,
    map_scale_y: f32,
) {
    let stride = src_width as usize;
    let sx = src_x as usize;
    let sy = src_y as usize;

    // Quadrant-major read order: each group of four samples is one
    // same-color 2x2 quadrant of the 4x4 tile.
    const QUAD_OFFSETS: [(usize, usize); 16] = [
        (0, 0), (1, 0), (0, 1), (1, 1),
        (2, 0), (3, 0), (2, 1), (3, 1),
        (0, 2), (1, 2), (0, 3), (1, 3),
        (2, 2), (3, 2), (2, 3), (3, 3),
    ];

    let mut s = [0u16; 16];
    for (i, (dx, dy)) in QUAD_OFFSETS.iter().enumerate() {
        s[i] = read_sample(raw, (sy + dy) * stride + sx + dx);
    }

    let mut gains = [1.0f32; 16];
    if apply_shading {
        for (i, (dx, dy)) in QUAD_OFFSETS.iter().enumerate() {
            gains[i] = shading.sample(
                (src_x + left + *dx as u32) as f32 * map_scale_x,
                (src_y + top + *dy as u32) as f32 * map_scale_y,
                (i / 4) as usize,
            );
        }
    }

    let mut p = [0.0f32; 16];
    for i in 0..16 {
        p[i] = linear[i % 4] * (s[i] as f32 - src_black[i % 4]) * gains[i];
    }

    if log_transform == LogTransform::Disabled {
        for i in 0..16 {
            p[i] = (p[i] * (dst_white - dst_black[i % 4])).max(0.0);
        }
    } else {
        for i in 0..16 {
            p[i] = log_encode(p[i].max(0.0), dst_white, x, y, i);
        }
    }

    for i in 0..16 {
        s[i] = (p[i] + dst_black[i % 4]).round().clamp(0.0, dst_white) as u16;
    }

    // Write back in raster order so the tile stays contiguous for a 4x4
    // CFA repeat pattern.
    let base = y as usize * row + x as usize;
    for (i, (dx, dy)) in QUAD_OFFSETS.iter().enumerate() {
        write_sample(dst, base + dy * row + dx, s[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{PostProcessSettings, ScreenOrientation};
    use crate::pipeline::settings::RenderOptions;

    fn metadata(width: u32, height: u32) -> CameraFrameMetadata {
        CameraFrameMetadata {
            iso: 100,
            exposure_time_ns: 10_000_000,
            as_shot_neutral: [0.5, 1.0, 0.6],
            dynamic_black_level: [64.0; 4],
            dynamic_white_level: 1023.0,
            lens_shading_map: vec![vec![1.0; 4]; 4],
            lens_shading_map_width: 2,
            lens_shading_map_height: 2,
            original_width: width,
            original_height: height,
            width,
            height,
            orientation: ScreenOrientation::Landscape,
            need_remosaic: false,
            timestamp_ns: 0,
        }
    }

    fn configuration() -> CameraConfiguration {
        CameraConfiguration {
            sensor_arrangement: "rggb".to_string(),
            black_level: [64.0; 4],
            white_level: 1023.0,
            color_matrix1: [0.0; 9],
            color_matrix2: [0.0; 9],
            forward_matrix1: [0.0; 9],
            forward_matrix2: [0.0; 9],
            color_illuminant1: String::new(),
            color_illuminant2: String::new(),
            post_process: PostProcessSettings::default(),
        }
    }

    fn flat_frame(width: u32, height: u32, value: u16) -> Vec<u8> {
        std::iter::repeat(value.to_le_bytes())
            .take((width * height) as usize)
            .flatten()
            .collect()
    }

    #[test]
    fn identity_when_everything_is_off() {
        let width = 16;
        let height = 8;
        let raw = flat_frame(width, height, 600);
        let frame = process(
            &raw,
            &metadata(width, height),
            &configuration(),
            &RenderSettings::default(),
        )
        .unwrap();

        assert_eq!(frame.width, width);
        assert_eq!(frame.height, height);
        assert_eq!(frame.white_level, 1023);
        assert_eq!(frame.black_level, [64; 4]);
        assert_eq!(frame.cfa, [0, 1, 1, 2]);
        assert!(!frame.quad_bayer);
        // With unity gains and matching levels the remap is the identity.
        assert_eq!(read_sample(&frame.data, 0), 600);
        assert_eq!(
            read_sample(&frame.data, frame.data.len() / 2 - 1),
            600
        );
    }

    #[test]
    fn unknown_arrangement_is_fatal() {
        let err = cfa_pattern("xyz").unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedSensorArrangement(_)));
    }

    #[test]
    fn draft_scale_dims_align_to_four() {
        let width = 1920;
        let height = 1080;
        let raw = flat_frame(width, height, 500);
        let mut settings = RenderSettings::default();
        settings.options |= RenderOptions::DRAFT;
        settings.draft_scale = 5;

        let frame = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();

        // Effective scale 4: 1920/4 = 480, 1080/4 = 270 -> floored to 268.
        assert_eq!(frame.width, 480);
        assert_eq!(frame.height, 268);
    }

    #[test]
    fn crop_reduces_output_and_is_ignored_when_malformed() {
        let width = 64;
        let height = 32;
        let raw = flat_frame(width, height, 500);
        let mut settings = RenderSettings::default();
        settings.options |= RenderOptions::CROPPING;
        settings.crop_target = "32x16".to_string();

        let frame = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        assert_eq!((frame.width, frame.height), (32, 16));

        settings.crop_target = "bogus".to_string();
        let frame = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        assert_eq!((frame.width, frame.height), (64, 32));

        // Oversized crops fall back to the full frame as well.
        settings.crop_target = "128x128".to_string();
        let frame = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        assert_eq!((frame.width, frame.height), (64, 32));
    }

    #[test]
    fn keep_input_log_maps_white_to_white_and_black_near_zero() {
        let width = 16;
        let height = 8;
        let mut settings = RenderSettings::default();
        settings.options |= RenderOptions::LOG_TRANSFORM;
        settings.log_transform = LogTransform::KeepInput;

        let white_frame = flat_frame(width, height, 1023);
        let frame = process(
            &white_frame,
            &metadata(width, height),
            &configuration(),
            &settings,
        )
        .unwrap();
        assert_eq!(frame.white_level, 1023);
        assert_eq!(frame.black_level, [0; 4]);
        for i in 0..(width * height) as usize {
            assert_eq!(read_sample(&frame.data, i), 1023, "sample {i}");
        }

        let black_frame = flat_frame(width, height, 64);
        let frame = process(
            &black_frame,
            &metadata(width, height),
            &configuration(),
            &settings,
        )
        .unwrap();
        for i in 0..(width * height) as usize {
            // Dither can push an exact black up by at most one code.
            assert!(read_sample(&frame.data, i) <= 1, "sample {i}");
        }
    }

    #[test]
    fn log_reduction_shrinks_white_level() {
        let width = 16;
        let height = 8;
        let raw = flat_frame(width, height, 1000);
        let mut settings = RenderSettings::default();
        settings.options |= RenderOptions::LOG_TRANSFORM;
        settings.log_transform = LogTransform::ReduceBy4Bit;

        let frame = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        // 10-bit source minus 4 -> 6-bit range.
        assert_eq!(frame.white_level, 63);
        assert_eq!(frame.black_level, [0; 4]);
    }

    #[test]
    fn shading_bake_in_rescales_and_drops_opcode() {
        let width = 16;
        let height = 8;
        let raw = flat_frame(width, height, 1023);
        let mut settings = RenderSettings::default();
        settings.options |=
            RenderOptions::APPLY_VIGNETTE_CORRECTION | RenderOptions::NORMALIZE_SHADING_MAP;

        let frame = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        // 10 source bits plus 4 headroom bits.
        assert_eq!(frame.white_level, (1 << 14) - 1);
        assert_eq!(frame.black_level, [0; 4]);
        assert!(frame.gain_map.is_none());
    }

    #[test]
    fn shading_forwarded_as_gain_map_when_not_applied() {
        let width = 16;
        let height = 8;
        let raw = flat_frame(width, height, 500);
        let frame = process(
            &raw,
            &metadata(width, height),
            &configuration(),
            &RenderSettings::default(),
        )
        .unwrap();

        let gain_map = frame.gain_map.expect("gain map should be forwarded");
        assert_eq!(gain_map.points_h, 2);
        assert_eq!(gain_map.points_v, 2);
        assert_eq!(gain_map.map_planes, 4);
    }

    #[test]
    fn quad_bayer_full_resolution_keeps_dimensions() {
        let width = 16;
        let height = 16;
        let raw = flat_frame(width, height, 700);
        let mut settings = RenderSettings::default();
        settings.options |= RenderOptions::INTERPRET_AS_QUAD_BAYER;

        let frame = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        assert!(frame.quad_bayer);
        assert_eq!((frame.width, frame.height), (16, 16));
        assert_eq!(read_sample(&frame.data, 0), 700);
    }

    #[test]
    fn quad_bayer_draft_two_sums_quadrants() {
        let width = 16;
        let height = 16;
        // Every source sample is 100; each output sample sums four of them.
        let raw = flat_frame(width, height, 100);
        let mut settings = RenderSettings::default();
        settings.options |= RenderOptions::INTERPRET_AS_QUAD_BAYER | RenderOptions::DRAFT;
        settings.draft_scale = 2;

        let frame = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        assert_eq!((frame.width, frame.height), (8, 8));
        // Levels quadruple alongside the summed samples.
        assert_eq!(frame.white_level, 4092);
        assert_eq!(frame.black_level, [256; 4]);
        assert_eq!(read_sample(&frame.data, 0), 400);
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let width = 32;
        let height = 16;
        let raw: Vec<u8> = (0..width * height)
            .flat_map(|i| (((i * 13) % 1024) as u16).to_le_bytes())
            .collect();
        let mut settings = RenderSettings::default();
        settings.options |= RenderOptions::LOG_TRANSFORM;
        settings.log_transform = LogTransform::ReduceBy2Bit;

        let a = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        let b = process(&raw, &metadata(width, height), &configuration(), &settings).unwrap();
        assert_eq!(a.data, b.data);
    }
}
