//! Single-IFD DNG/TIFF emission.
//!
//! DNG needs CFA photometrics, opcode lists and linearization tables that
//! general-purpose TIFF encoders do not expose, so the IFD is assembled by
//! hand here. Everything is little-endian except opcode payloads, which the
//! DNG specification keeps big-endian.

pub mod opcodes;
pub mod tags;
pub mod writer;

pub use opcodes::{lens_shading_gain_map, GainMap};
pub use writer::DngEncoder;

#[cfg(test)]
pub(crate) mod testutil;
