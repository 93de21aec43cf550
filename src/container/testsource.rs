//! Synthetic in-memory container used across the test suites.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::container::metadata::{
    AudioTrack, CameraConfiguration, CameraFrameMetadata, PostProcessSettings, ScreenOrientation,
};
use crate::container::reader::{ContainerError, FrameSource, Result};

pub struct SyntheticSource {
    pub width: u32,
    pub height: u32,
    pub frames: usize,
    pub fps: f64,
    pub configuration: CameraConfiguration,
    pub audio: Option<AudioTrack>,
    /// Counts `read_frame` calls, for single-flight assertions.
    pub reads: AtomicUsize,
    pub fail_reads: std::sync::atomic::AtomicBool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, frames: usize, fps: f64) -> Self {
        Self {
            width,
            height,
            frames,
            fps,
            configuration: CameraConfiguration {
                sensor_arrangement: "rggb".to_string(),
                black_level: [64.0; 4],
                white_level: 1023.0,
                color_matrix1: [0.8, 0.1, 0.0, 0.0, 1.0, 0.0, 0.1, 0.0, 0.9],
                color_matrix2: [0.0; 9],
                forward_matrix1: [0.0; 9],
                forward_matrix2: [0.0; 9],
                color_illuminant1: "standarda".to_string(),
                color_illuminant2: "d65".to_string(),
                post_process: PostProcessSettings {
                    flipped: false,
                    build_model: "Test Phone".to_string(),
                },
            },
            audio: None,
            reads: AtomicUsize::new(0),
            fail_reads: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn with_audio(mut self, samples: usize) -> Self {
        self.audio = Some(AudioTrack {
            data: (0..samples * 2).map(|i| i as u8).collect(),
            sample_rate: 48_000,
            channels: 2,
        });
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl FrameSource for SyntheticSource {
    fn frame_count(&self) -> usize {
        self.frames
    }

    fn frame_metadata(&self, index: usize) -> Result<CameraFrameMetadata> {
        if index >= self.frames {
            return Err(ContainerError::FrameOutOfRange(index));
        }
        Ok(CameraFrameMetadata {
            iso: 100,
            exposure_time_ns: 10_000_000,
            as_shot_neutral: [0.5, 1.0, 0.6],
            dynamic_black_level: [64.0; 4],
            dynamic_white_level: 1023.0,
            lens_shading_map: vec![vec![1.2; 6]; 4],
            lens_shading_map_width: 3,
            lens_shading_map_height: 2,
            original_width: self.width,
            original_height: self.height,
            width: self.width,
            height: self.height,
            orientation: ScreenOrientation::Landscape,
            need_remosaic: false,
            timestamp_ns: (index as f64 / self.fps * 1e9) as i64,
        })
    }

    fn read_frame(&self, index: usize) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ContainerError::Io(std::io::Error::other("synthetic failure")));
        }
        if index >= self.frames {
            return Err(ContainerError::FrameOutOfRange(index));
        }
        // Frame content varies per index so artifacts differ across frames.
        let data = (0..self.width as usize * self.height as usize)
            .flat_map(|i| ((((i + index * 7) % 960) as u16 + 64).to_le_bytes()))
            .collect();
        Ok(data)
    }

    fn configuration(&self) -> &CameraConfiguration {
        &self.configuration
    }

    fn timestamps(&self) -> Vec<i64> {
        (0..self.frames)
            .map(|i| (i as f64 / self.fps * 1e9) as i64)
            .collect()
    }

    fn audio(&self) -> Option<AudioTrack> {
        self.audio.clone()
    }
}
