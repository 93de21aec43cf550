//! DNG OpcodeList2 GainMap construction.
//!
//! When the shading map is not baked into pixel values it travels with the
//! file as a GainMap opcode, letting the raw developer apply it instead.

use crate::container::CameraFrameMetadata;

const OPCODE_ID_GAIN_MAP: u32 = 9;

/// One GainMap opcode: a per-channel gain grid over the active image area.
#[derive(Debug, Clone, PartialEq)]
pub struct GainMap {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
    pub plane: u32,
    pub planes: u32,
    pub row_pitch: u32,
    pub col_pitch: u32,
    pub points_v: u32,
    pub points_h: u32,
    pub spacing_v: f64,
    pub spacing_h: f64,
    pub origin_v: f64,
    pub origin_h: f64,
    pub map_planes: u32,
    /// Gains in plane-major, row-major order.
    pub gains: Vec<f32>,
}

/// Build the GainMap for a frame's lens-shading grid, or `None` when the
/// metadata carries no usable map.
pub fn lens_shading_gain_map(
    metadata: &CameraFrameMetadata,
    image_width: u32,
    image_height: u32,
    left: u32,
    top: u32,
) -> Option<GainMap> {
    if !metadata.has_shading_map() {
        return None;
    }

    let points_v = metadata.lens_shading_map_height as u32;
    let points_h = metadata.lens_shading_map_width as u32;

    let available_planes = metadata.lens_shading_map.len() as u32;
    let planes = match available_planes {
        0 => return None,
        1 | 2 => 1,
        3 => 3,
        _ => 4,
    };

    let row_pitch = if points_v > 1 {
        ((image_height - 1) / (points_v - 1)).max(1)
    } else {
        image_height
    };
    let col_pitch = if points_h > 1 {
        ((image_width - 1) / (points_h - 1)).max(1)
    } else {
        image_width
    };

    let spacing_v = row_pitch as f64 / image_height as f64;
    let spacing_h = col_pitch as f64 / image_width as f64;
    let origin_v = top as f64 / image_height as f64;
    let origin_h = left as f64 / image_width as f64;

    let per_plane = points_v as usize * points_h as usize;
    let expected = per_plane * planes as usize;

    let mut gains = Vec::with_capacity(expected);
    for plane in 0..planes as usize {
        let source = if plane < metadata.lens_shading_map.len() {
            &metadata.lens_shading_map[plane]
        } else {
            &metadata.lens_shading_map[0]
        };
        for index in 0..per_plane {
            let gain = source.get(index).copied().unwrap_or(1.0);
            let gain = if !gain.is_finite() || gain <= 0.0 {
                1.0
            } else {
                gain.min(16.0)
            };
            gains.push(gain);
        }
    }

    if gains.len() != expected {
        return None;
    }

    Some(GainMap {
        top,
        left,
        bottom: top + image_height,
        right: left + image_width,
        plane: 0,
        planes,
        row_pitch,
        col_pitch,
        points_v,
        points_h,
        spacing_v,
        spacing_h,
        origin_v,
        origin_h,
        map_planes: planes,
        gains,
    })
}

impl GainMap {
    /// Opcode parameter block: everything after the opcode header, big-endian
    /// per the DNG opcode encoding.
    fn parameter_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(76 + self.gains.len() * 4);
        for value in [
            self.top,
            self.left,
            self.bottom,
            self.right,
            self.plane,
            self.planes,
            self.row_pitch,
            self.col_pitch,
            self.points_v,
            self.points_h,
        ] {
            out.extend_from_slice(&value.to_be_bytes());
        }
        for value in [self.spacing_v, self.spacing_h, self.origin_v, self.origin_h] {
            out.extend_from_slice(&value.to_be_bytes());
        }
        out.extend_from_slice(&self.map_planes.to_be_bytes());
        for gain in &self.gains {
            out.extend_from_slice(&gain.to_be_bytes());
        }
        out
    }
}

/// Serialize an OpcodeList2 tag value from the given gain maps.
pub fn serialize_opcode_list(maps: &[GainMap]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(maps.len() as u32).to_be_bytes());
    for map in maps {
        let parameters = map.parameter_bytes();
        out.extend_from_slice(&OPCODE_ID_GAIN_MAP.to_be_bytes());
        // Minimum DNG version that understands GainMap.
        out.extend_from_slice(&[1, 3, 0, 0]);
        // Flags: not optional, no preview skip.
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(parameters.len() as u32).to_be_bytes());
        out.extend_from_slice(&parameters);
    }
    out
}
