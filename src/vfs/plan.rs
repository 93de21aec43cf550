//! Frame-rate planning: derive a constant output rate from the container's
//! variable capture cadence and map output slots to source frames.

use tracing::debug;

use crate::pipeline::settings::{CfrMode, CfrTarget};
use crate::vfs::error::{Result, VfsError};

const BROADCAST_RATES: [f64; 8] = [23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 59.94, 60.0];

/// The per-mount conversion plan from capture cadence to output slots.
#[derive(Debug, Clone)]
pub struct FrameRatePlan {
    pub med_fps: f64,
    pub avg_fps: f64,
    pub target_fps: f64,
    pub total_frames: usize,
    pub dropped_frames: usize,
    pub duplicated_frames: usize,
    /// Median of iso times exposure across the mount, the reference for
    /// exposure normalization.
    pub baseline_exposure_value: f64,
    /// `mapping[output_index]` is the source frame shown in that slot.
    pub mapping: Vec<usize>,
}

impl FrameRatePlan {
    pub fn output_frames(&self) -> usize {
        self.mapping.len()
    }

    pub fn source_frame(&self, output_index: usize) -> Option<usize> {
        self.mapping.get(output_index).copied()
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Target rate selection for the CFR modes.
fn select_target(med_fps: f64, avg_fps: f64, target: &CfrTarget) -> f64 {
    match target.mode {
        CfrMode::PreferInteger => med_fps.round(),
        CfrMode::PreferDropFrame => {
            let nearest_int = med_fps.round();
            // Rates just under 24/30/60 are NTSC-style pulldown captures.
            if (nearest_int == 24.0 || nearest_int == 30.0 || nearest_int == 60.0)
                && med_fps < nearest_int
            {
                return match nearest_int as u32 {
                    24 => 23.976,
                    30 => 29.97,
                    _ => 59.94,
                };
            }
            BROADCAST_RATES
                .iter()
                .copied()
                .min_by(|a, b| (a - med_fps).abs().total_cmp(&(b - med_fps).abs()))
                .unwrap_or(med_fps)
        }
        CfrMode::MedianSlowMotion => med_fps.floor(),
        CfrMode::AverageTesting => avg_fps,
        CfrMode::Custom => {
            if target.custom_value > 0.0 {
                target.custom_value
            } else {
                med_fps
            }
        }
    }
}

/// Build the plan from capture timestamps (nanoseconds) and per-frame
/// exposure products (`iso * exposure_time_ns`).
///
/// `cfr_target` is `None` when frame-rate conversion is off; the target then
/// stays at the median rate.
pub fn build_plan(
    timestamps: &[i64],
    exposure_products: &[f64],
    cfr_target: Option<&CfrTarget>,
) -> Result<FrameRatePlan> {
    if timestamps.len() < 2 {
        return Err(VfsError::InvalidContainer(format!(
            "need at least 2 frames, got {}",
            timestamps.len()
        )));
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    if sorted.windows(2).any(|w| w[0] >= w[1]) {
        return Err(VfsError::InvalidContainer(
            "timestamps are not strictly increasing".to_string(),
        ));
    }

    let deltas: Vec<f64> = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 / 1e9)
        .collect();

    let mut sorted_deltas = deltas.clone();
    sorted_deltas.sort_by(f64::total_cmp);
    let med_delta = median(&sorted_deltas);
    let avg_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;

    let med_fps = 1.0 / med_delta;
    let avg_fps = 1.0 / avg_delta;

    let target_fps = match cfr_target {
        Some(target) => select_target(med_fps, avg_fps, target),
        None => med_fps,
    };

    // One output slot per target-rate tick across the capture, including the
    // final frame's display interval.
    let first = sorted[0];
    let duration = timestamps.len() as f64 / med_fps;
    let slot_count = (duration * target_fps - 1e-6).ceil().max(1.0) as usize;

    let mut mapping = Vec::with_capacity(slot_count);
    let mut cursor = 0usize;
    for slot in 0..slot_count {
        let slot_time = first as f64 / 1e9 + slot as f64 / target_fps;
        // Timestamps ascend, so the closest source frame only moves forward.
        while cursor + 1 < sorted.len() {
            let here = (sorted[cursor] as f64 / 1e9 - slot_time).abs();
            let next = (sorted[cursor + 1] as f64 / 1e9 - slot_time).abs();
            if next < here {
                cursor += 1;
            } else {
                break;
            }
        }
        mapping.push(cursor);
    }

    let duplicated_frames = mapping.windows(2).filter(|w| w[0] == w[1]).count();
    let mut used = vec![false; timestamps.len()];
    for &source in &mapping {
        used[source] = true;
    }
    let dropped_frames = used.iter().filter(|&&u| !u).count();

    let baseline_exposure_value = if exposure_products.is_empty() {
        0.0
    } else {
        let mut products = exposure_products.to_vec();
        products.sort_by(f64::total_cmp);
        median(&products)
    };

    debug!(
        med_fps,
        avg_fps,
        target_fps,
        slots = mapping.len(),
        dropped_frames,
        duplicated_frames,
        "built frame-rate plan"
    );

    Ok(FrameRatePlan {
        med_fps,
        avg_fps,
        target_fps,
        total_frames: timestamps.len(),
        dropped_frames,
        duplicated_frames,
        baseline_exposure_value,
        mapping,
    })
}
