//! One-frame DNG materialization: process, pack, and wrap in a TIFF IFD.

use tracing::debug;

use crate::container::{CameraConfiguration, CameraFrameMetadata};
use crate::pipeline::dng::opcodes::serialize_opcode_list;
use crate::pipeline::dng::tags::{
    self, fps_to_fraction, illuminant_code, orientation_tag, smpte_timecode, to_rational,
    to_srational,
};
use crate::pipeline::dng::DngEncoder;
use crate::pipeline::error::Result;
use crate::pipeline::pack::{bits_needed, pack_in_place, target_bits};
use crate::pipeline::process::process;
use crate::pipeline::settings::{LogTransform, QuadBayerMode, RenderOptions, RenderSettings};

const SOFTWARE_NAME: &str = "MotionCam Tools";

const IDENTITY_MATRIX: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

fn is_zero_matrix(matrix: &[f32; 9]) -> bool {
    matrix.iter().all(|&v| v == 0.0)
}

/// Quad-Bayer 4x4 repeat pattern for a 2x2 CFA tile.
fn quad_cfa_pattern(cfa: [u8; 4]) -> [u8; 16] {
    let mut pattern = [0u8; 16];
    for y in 0..4 {
        for x in 0..4 {
            pattern[y * 4 + x] = cfa[(y / 2) * 2 + x / 2];
        }
    }
    pattern
}

/// The UniqueCameraModel string (plus optional Make/Model pair) for a
/// camera-model override.
fn camera_model_tags(model: &str) -> (String, Option<(&'static str, &'static str)>) {
    match model {
        "Panasonic" => ("Panasonic Varicam RAW".to_string(), None),
        "Blackmagic" => ("Blackmagic Pocket Cinema Camera 4K".to_string(), None),
        "Fujifilm" | "Fujifilm X-T5" => ("Fujifilm X-T5".to_string(), Some(("Fujifilm", "X-T5"))),
        other => (other.to_string(), None),
    }
}

/// Build the complete DNG for one output frame.
///
/// `fps` is the mount's target frame rate, `frame_number` the output index,
/// and `baseline_exposure_value` the mount-wide median of iso times exposure
/// used for exposure normalization.
pub fn render_dng(
    raw: &[u8],
    metadata: &CameraFrameMetadata,
    configuration: &CameraConfiguration,
    fps: f64,
    frame_number: u32,
    baseline_exposure_value: f64,
    settings: &RenderSettings,
) -> Result<Vec<u8>> {
    let frame = process(raw, metadata, configuration, settings)?;

    let significant = bits_needed(frame.white_level);
    let encode_bits = target_bits(significant);

    let mut data = frame.data;
    pack_in_place(&mut data, frame.width, frame.height, encode_bits);

    debug!(
        width = frame.width,
        height = frame.height,
        encode_bits,
        white_level = frame.white_level,
        "packed frame"
    );

    let mut dng = DngEncoder::new(data);

    dng.set_bytes(tags::DNG_VERSION, &[1, 4, 0, 0]);
    dng.set_bytes(tags::DNG_BACKWARD_VERSION, &[1, 1, 0, 0]);
    dng.set_long(tags::NEW_SUBFILE_TYPE, 0);
    dng.set_long(tags::IMAGE_WIDTH, frame.width);
    dng.set_long(tags::IMAGE_LENGTH, frame.height);
    dng.set_short(tags::BITS_PER_SAMPLE, encode_bits);
    dng.set_short(tags::COMPRESSION, tags::COMPRESSION_NONE);
    dng.set_short(tags::PHOTOMETRIC_INTERPRETATION, tags::PHOTOMETRIC_CFA);
    dng.set_short(tags::SAMPLES_PER_PIXEL, 1);
    dng.set_long(tags::ROWS_PER_STRIP, frame.height);
    dng.set_short(tags::PLANAR_CONFIGURATION, 1);
    dng.set_rational(tags::X_RESOLUTION, 300, 1);
    dng.set_rational(tags::Y_RESOLUTION, 300, 1);
    dng.set_short(tags::RESOLUTION_UNIT, 2);
    dng.set_ascii(tags::SOFTWARE, SOFTWARE_NAME);

    dng.set_short(
        tags::ORIENTATION,
        orientation_tag(metadata.orientation, configuration.post_process.flipped) as u16,
    );

    // Quad-Bayer layouts advertise the true 4x4 pattern only when asked to.
    let correct_quad_metadata = frame.quad_bayer
        && settings.effective_scale() == 1
        && settings.quad_bayer == QuadBayerMode::CorrectQbCfaMetadata;
    if correct_quad_metadata {
        dng.set_shorts(tags::CFA_REPEAT_PATTERN_DIM, &[4, 4]);
        dng.set_bytes(tags::CFA_PATTERN, &quad_cfa_pattern(frame.cfa));
    } else {
        dng.set_shorts(tags::CFA_REPEAT_PATTERN_DIM, &[2, 2]);
        dng.set_bytes(tags::CFA_PATTERN, &frame.cfa);
    }
    dng.set_short(tags::CFA_LAYOUT, 1);

    dng.set_shorts(tags::BLACK_LEVEL_REPEAT_DIM, &[2, 2]);

    dng.set_short(tags::ISO_SPEED_RATINGS, metadata.iso.min(u16::MAX as u32) as u16);
    let (exp_num, exp_den) = to_rational(metadata.exposure_time_ns as f64 / 1e9);
    dng.set_rational(tags::EXPOSURE_TIME, exp_num, exp_den);

    let exposure_offset = settings.exposure_offset();
    let baseline = if settings.options.contains(RenderOptions::NORMALIZE_EXPOSURE) {
        let frame_exposure = metadata.iso as f64 * metadata.exposure_time_ns as f64;
        (baseline_exposure_value / frame_exposure).log2() + exposure_offset
    } else {
        exposure_offset
    };
    let (baseline_num, baseline_den) = to_srational(baseline);
    dng.set_srational(tags::BASELINE_EXPOSURE, baseline_num, baseline_den);

    let timecode = smpte_timecode(frame_number, fps);
    dng.set_bytes(tags::TIME_CODES, &timecode);
    let (fps_num, fps_den) = fps_to_fraction(fps);
    dng.set_srational(tags::FRAME_RATE, fps_num, fps_den);

    if !is_zero_matrix(&configuration.color_matrix1) {
        dng.set_matrix(tags::COLOR_MATRIX_1, &configuration.color_matrix1);
    }
    if !is_zero_matrix(&configuration.color_matrix2) {
        dng.set_matrix(tags::COLOR_MATRIX_2, &configuration.color_matrix2);
    }
    if !is_zero_matrix(&configuration.forward_matrix1) {
        dng.set_matrix(tags::FORWARD_MATRIX_1, &configuration.forward_matrix1);
    }
    if !is_zero_matrix(&configuration.forward_matrix2) {
        dng.set_matrix(tags::FORWARD_MATRIX_2, &configuration.forward_matrix2);
    }
    dng.set_matrix(tags::CAMERA_CALIBRATION_1, &IDENTITY_MATRIX);
    dng.set_matrix(tags::CAMERA_CALIBRATION_2, &IDENTITY_MATRIX);

    let neutral: Vec<(u32, u32)> = metadata
        .as_shot_neutral
        .iter()
        .map(|&v| to_rational(v as f64))
        .collect();
    dng.set_rationals(tags::AS_SHOT_NEUTRAL, &neutral);

    dng.set_short(
        tags::CALIBRATION_ILLUMINANT_1,
        illuminant_code(&configuration.color_illuminant1),
    );
    dng.set_short(
        tags::CALIBRATION_ILLUMINANT_2,
        illuminant_code(&configuration.color_illuminant2),
    );

    let model_override = settings.options.contains(RenderOptions::CAMMODEL_OVERRIDE)
        && !settings.camera_model.is_empty();
    if model_override {
        let (unique_model, make_model) = camera_model_tags(&settings.camera_model);
        dng.set_ascii(tags::UNIQUE_CAMERA_MODEL, &unique_model);
        if let Some((make, model)) = make_model {
            dng.set_ascii(tags::MAKE, make);
            dng.set_ascii(tags::MODEL, model);
        }
    } else {
        dng.set_ascii(
            tags::UNIQUE_CAMERA_MODEL,
            &configuration.post_process.build_model,
        );
    }

    if let Some(gain_map) = &frame.gain_map {
        dng.set_undefined(
            tags::OPCODE_LIST_2,
            &serialize_opcode_list(std::slice::from_ref(gain_map)),
        );
    }

    dng.set_longs(
        tags::ACTIVE_AREA,
        &[0, 0, frame.height, frame.width],
    );

    // The log curve ships with its inverse as a linearization table, except
    // for KeepInput without shading correction, which is already linear in
    // its own range.
    let log_transform = settings.effective_log_transform();
    let apply_shading = settings
        .options
        .contains(RenderOptions::APPLY_VIGNETTE_CORRECTION);
    let needs_table = log_transform != LogTransform::Disabled
        && !(log_transform == LogTransform::KeepInput && !apply_shading);

    if needs_table {
        let table = linearization_table(frame.white_level);
        dng.set_shorts(tags::LINEARIZATION_TABLE, &table);
        dng.set_shorts(tags::BLACK_LEVEL, &[0, 0, 0, 0]);
        dng.set_long(tags::WHITE_LEVEL, 65534);
    } else {
        dng.set_shorts(tags::BLACK_LEVEL, &frame.black_level);
        dng.set_long(tags::WHITE_LEVEL, frame.white_level as u32);
    }

    dng.encode()
}

/// Inverse of the forward log curve, tabulated over the stored range and
/// scaled to 16 bits. The endpoints are pinned exactly.
fn linearization_table(white_level: u16) -> Vec<u16> {
    let size = white_level as usize + 1;
    let mut table = vec![0u16; size];
    let k = 60.0f32;
    let log_range = (1.0 + k).log2();

    for (i, entry) in table.iter_mut().enumerate() {
        let linear = if i == 0 {
            0.0
        } else if i == size - 1 {
            1.0
        } else {
            let normalized = i as f32 / white_level as f32;
            (((normalized * log_range).exp2() - 1.0) / k).clamp(0.0, 1.0)
        };
        *entry = (linear * 65535.0) as u16;
    }

    table
}
