use thiserror::Error;

use crate::container::metadata::{AudioTrack, CameraConfiguration, CameraFrameMetadata};

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    #[error("frame index {0} out of range")]
    FrameOutOfRange(usize),

    #[error("container read failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContainerError>;

/// Read access to a parsed MCRAW container.
///
/// Implementations decode on demand; the core never asks for the same frame
/// concurrently on one mount, so no internal locking is required beyond what
/// the decoder itself needs.
pub trait FrameSource: Send + Sync {
    fn frame_count(&self) -> usize;

    fn frame_metadata(&self, index: usize) -> Result<CameraFrameMetadata>;

    /// Raw Bayer payload for one frame: little-endian 16-bit samples,
    /// `width * height` of them, row-major.
    fn read_frame(&self, index: usize) -> Result<Vec<u8>>;

    fn configuration(&self) -> &CameraConfiguration;

    /// Capture timestamps for every frame, in container order (nanoseconds).
    fn timestamps(&self) -> Vec<i64>;

    /// The container's audio track, if one was recorded.
    fn audio(&self) -> Option<AudioTrack> {
        None
    }
}
