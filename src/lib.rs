//! mcraw-vfs presents an MCRAW video container as a mountable directory of
//! per-frame DNG files plus an audio WAV, materialized on demand.
//!
//! The filesystem bridge hands logical `(entry, offset, length)` reads to
//! [`vfs::MountRegistry::read_file`]; on a cache miss the matching source
//! frame is decoded, processed ([`pipeline::process`]), bit-packed, wrapped
//! in a DNG ([`pipeline::render_dng`]), cached, and the requested byte range
//! copied out. The container parser and the OS mount binding live outside
//! this crate, behind [`container::FrameSource`] and the registry's public
//! surface respectively.

pub mod container;
pub mod logger;
pub mod pipeline;
pub mod vfs;

pub use container::FrameSource;
pub use pipeline::{RenderOptions, RenderSettings};
pub use vfs::{MountId, MountRegistry};
