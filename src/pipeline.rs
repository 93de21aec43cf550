//! The per-frame DNG materialization pipeline: settings, processing,
//! packing, and encoding.

pub mod dng;
pub mod error;
pub mod pack;
pub mod process;
pub mod render;
pub mod settings;
pub mod shading;

pub use dng::{DngEncoder, GainMap};
pub use error::{RenderError, Result};
pub use process::{process, ProcessedFrame};
pub use render::render_dng;
pub use settings::{
    CfrMode, CfrTarget, LogTransform, QuadBayerMode, RenderOptions, RenderSettings,
};
