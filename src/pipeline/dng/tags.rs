//! TIFF/DNG tag numbers, field types, and small tag-value builders.

use crate::container::ScreenOrientation;

pub const NEW_SUBFILE_TYPE: u16 = 254;
pub const IMAGE_WIDTH: u16 = 256;
pub const IMAGE_LENGTH: u16 = 257;
pub const BITS_PER_SAMPLE: u16 = 258;
pub const COMPRESSION: u16 = 259;
pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
pub const MAKE: u16 = 271;
pub const MODEL: u16 = 272;
pub const STRIP_OFFSETS: u16 = 273;
pub const ORIENTATION: u16 = 274;
pub const SAMPLES_PER_PIXEL: u16 = 277;
pub const ROWS_PER_STRIP: u16 = 278;
pub const STRIP_BYTE_COUNTS: u16 = 279;
pub const X_RESOLUTION: u16 = 282;
pub const Y_RESOLUTION: u16 = 283;
pub const PLANAR_CONFIGURATION: u16 = 284;
pub const RESOLUTION_UNIT: u16 = 296;
pub const SOFTWARE: u16 = 305;
pub const EXPOSURE_TIME: u16 = 33434;
pub const CFA_REPEAT_PATTERN_DIM: u16 = 33421;
pub const CFA_PATTERN: u16 = 33422;
pub const ISO_SPEED_RATINGS: u16 = 34855;
pub const DNG_VERSION: u16 = 50706;
pub const DNG_BACKWARD_VERSION: u16 = 50707;
pub const UNIQUE_CAMERA_MODEL: u16 = 50708;
pub const CFA_LAYOUT: u16 = 50711;
pub const LINEARIZATION_TABLE: u16 = 50712;
pub const BLACK_LEVEL_REPEAT_DIM: u16 = 50713;
pub const BLACK_LEVEL: u16 = 50714;
pub const WHITE_LEVEL: u16 = 50717;
pub const COLOR_MATRIX_1: u16 = 50721;
pub const COLOR_MATRIX_2: u16 = 50722;
pub const CAMERA_CALIBRATION_1: u16 = 50723;
pub const CAMERA_CALIBRATION_2: u16 = 50724;
pub const AS_SHOT_NEUTRAL: u16 = 50728;
pub const BASELINE_EXPOSURE: u16 = 50730;
pub const CALIBRATION_ILLUMINANT_1: u16 = 50778;
pub const CALIBRATION_ILLUMINANT_2: u16 = 50779;
pub const ACTIVE_AREA: u16 = 50829;
pub const FORWARD_MATRIX_1: u16 = 50964;
pub const FORWARD_MATRIX_2: u16 = 50965;
pub const OPCODE_LIST_2: u16 = 51009;
pub const TIME_CODES: u16 = 51043;
pub const FRAME_RATE: u16 = 51044;

pub const TYPE_BYTE: u16 = 1;
pub const TYPE_ASCII: u16 = 2;
pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_RATIONAL: u16 = 5;
pub const TYPE_UNDEFINED: u16 = 7;
pub const TYPE_SRATIONAL: u16 = 10;

pub const PHOTOMETRIC_CFA: u16 = 32803;
pub const COMPRESSION_NONE: u16 = 1;

/// DNG orientation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DngOrientation {
    Normal = 1,
    Mirror = 2,
    Rotate180 = 3,
    Mirror180 = 4,
    Mirror90Ccw = 5,
    Rotate90Cw = 6,
    Mirror90Cw = 7,
    Rotate90Ccw = 8,
}

/// Orientation tag for a capture orientation, honoring the container's
/// front-camera flip.
pub fn orientation_tag(orientation: ScreenOrientation, flipped: bool) -> DngOrientation {
    match orientation {
        ScreenOrientation::Portrait => {
            if flipped {
                DngOrientation::Mirror90Cw
            } else {
                DngOrientation::Rotate90Cw
            }
        }
        ScreenOrientation::ReversePortrait => {
            if flipped {
                DngOrientation::Mirror90Ccw
            } else {
                DngOrientation::Rotate90Ccw
            }
        }
        ScreenOrientation::ReverseLandscape => {
            if flipped {
                DngOrientation::Mirror180
            } else {
                DngOrientation::Rotate180
            }
        }
        ScreenOrientation::Landscape => {
            if flipped {
                DngOrientation::Mirror
            } else {
                DngOrientation::Normal
            }
        }
    }
}

/// EXIF LightSource code for the container's illuminant name.
pub fn illuminant_code(name: &str) -> u16 {
    match name {
        "standarda" => 17,
        "standardb" => 18,
        "standardc" => 19,
        "d50" => 23,
        "d55" => 20,
        "d65" => 21,
        "d75" => 22,
        _ => 0,
    }
}

fn to_bcd(value: u32) -> u8 {
    (((value / 10) << 4) | (value % 10)) as u8
}

/// SMPTE timecode bytes for an output frame at the mount's frame rate.
pub fn smpte_timecode(frame_number: u32, fps: f64) -> [u8; 8] {
    let time = frame_number as f64 / fps;

    let hours = (time / 3600.0).floor() as u32;
    let minutes = ((time / 60.0).floor() as u32) % 60;
    let seconds = (time.floor() as u32) % 60;
    let frames = if fps > 1.0 {
        frame_number % (fps.round() as u32)
    } else {
        0
    };

    let mut code = [0u8; 8];
    code[0] = to_bcd(frames) & 0x3F;
    code[1] = to_bcd(seconds) & 0x7F;
    code[2] = to_bcd(minutes) & 0x7F;
    code[3] = to_bcd(hours) & 0x3F;
    code
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

/// Frame rate as a signed rational over base 1001, so broadcast fractional
/// rates come out exact (29.97 -> 30000/1001).
pub fn fps_to_fraction(fps: f64) -> (i32, i32) {
    if fps <= 0.0 {
        return (0, 1);
    }
    let numerator = (fps * 1001.0).round() as u64;
    let divisor = gcd(numerator, 1001);
    ((numerator / divisor) as i32, (1001 / divisor) as i32)
}

/// Closest unsigned rational with a bounded denominator.
pub fn to_rational(value: f64) -> (u32, u32) {
    if value <= 0.0 {
        return (0, 1);
    }
    let numerator = (value * 1_000_000.0).round() as u64;
    let divisor = gcd(numerator, 1_000_000);
    ((numerator / divisor) as u32, (1_000_000 / divisor) as u32)
}

/// Closest signed rational with a bounded denominator.
pub fn to_srational(value: f64) -> (i32, i32) {
    let negative = value < 0.0;
    let (num, den) = to_rational(value.abs());
    if negative {
        (-(num as i32), den as i32)
    } else {
        (num as i32, den as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_table_matches_capture_states() {
        use ScreenOrientation::*;
        let cases = [
            (Portrait, false, DngOrientation::Rotate90Cw),
            (Portrait, true, DngOrientation::Mirror90Cw),
            (ReversePortrait, false, DngOrientation::Rotate90Ccw),
            (ReversePortrait, true, DngOrientation::Mirror90Ccw),
            (ReverseLandscape, false, DngOrientation::Rotate180),
            (ReverseLandscape, true, DngOrientation::Mirror180),
            (Landscape, false, DngOrientation::Normal),
            (Landscape, true, DngOrientation::Mirror),
        ];
        for (orientation, flipped, expected) in cases {
            assert_eq!(orientation_tag(orientation, flipped), expected);
        }
    }

    #[test]
    fn illuminants_map_to_exif_codes() {
        assert_eq!(illuminant_code("standarda"), 17);
        assert_eq!(illuminant_code("d65"), 21);
        assert_eq!(illuminant_code("d50"), 23);
        assert_eq!(illuminant_code("halogen"), 0);
    }

    #[test]
    fn timecode_packs_bcd_fields() {
        // Frame 95 at 24 fps: 3 seconds + 23 frames.
        let code = smpte_timecode(95, 24.0);
        assert_eq!(code[0], 0x23);
        assert_eq!(code[1], 0x03);
        assert_eq!(code[2], 0x00);
        assert_eq!(code[3], 0x00);

        // One hour, one minute, one second in.
        let fps = 25.0;
        let frame = (3661.0 * fps) as u32;
        let code = smpte_timecode(frame, fps);
        assert_eq!(code[3], 0x01);
        assert_eq!(code[2], 0x01);
        assert_eq!(code[1], 0x01);
    }

    #[test]
    fn broadcast_rates_become_exact_fractions() {
        assert_eq!(fps_to_fraction(29.97), (30000, 1001));
        assert_eq!(fps_to_fraction(23.976), (24000, 1001));
        assert_eq!(fps_to_fraction(30.0), (30, 1));
        assert_eq!(fps_to_fraction(25.0), (25, 1));
    }

    #[test]
    fn rational_round_trip_is_close() {
        let (num, den) = to_rational(0.0333);
        assert!((num as f64 / den as f64 - 0.0333).abs() < 1e-9);

        let (num, den) = to_srational(-1.5);
        assert_eq!((num, den), (-3, 2));
    }
}
