use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unsupported sensor arrangement: {0:?}")]
    UnsupportedSensorArrangement(String),

    #[error("frame payload truncated: got {got} bytes, need {need}")]
    TruncatedFrame { got: usize, need: usize },

    #[error("frame too small to process: {width}x{height}")]
    DegenerateFrame { width: u32, height: u32 },

    #[error("failed to encode DNG: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
