use thiserror::Error;

use crate::container::ContainerError;
use crate::pipeline::RenderError;

/// Completion status codes delivered alongside read callbacks.
pub mod status {
    pub const OK: i32 = 0;
    pub const INVALID_CONTAINER: i32 = -1;
    pub const INVALID_ARGUMENT: i32 = -2;
    pub const NOT_FOUND: i32 = -3;
    pub const CANCELLED: i32 = -4;
    pub const IO: i32 = -5;
    pub const RENDER: i32 = -6;
}

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("unknown mount {0}")]
    UnknownMount(u32),

    #[error("build cancelled by unmount")]
    CancelledByUnmount,

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl VfsError {
    /// The negative status code surfaced through read completions.
    pub fn status(&self) -> i32 {
        match self {
            VfsError::InvalidContainer(_) => status::INVALID_CONTAINER,
            VfsError::InvalidArgument(_) => status::INVALID_ARGUMENT,
            VfsError::NotFound(_) | VfsError::UnknownMount(_) => status::NOT_FOUND,
            VfsError::CancelledByUnmount => status::CANCELLED,
            VfsError::Container(ContainerError::InvalidContainer(_)) => status::INVALID_CONTAINER,
            VfsError::Container(_) => status::IO,
            VfsError::Render(RenderError::UnsupportedSensorArrangement(_)) => {
                status::INVALID_ARGUMENT
            }
            VfsError::Render(_) => status::RENDER,
        }
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;
