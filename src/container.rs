//! The consumed container-reader interface.
//!
//! The MCRAW parser itself lives outside this crate; the core only requires
//! something that can hand over raw Bayer payloads and per-frame metadata.
//! [`FrameSource`] is that seam.

pub mod metadata;
pub mod reader;

#[cfg(test)]
pub(crate) mod testsource;

pub use metadata::{
    AudioTrack, CameraConfiguration, CameraFrameMetadata, PostProcessSettings, ScreenOrientation,
};
pub use reader::{ContainerError, FrameSource, Result};
