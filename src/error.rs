use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("misaligned scratchpad access at {addr:#x}")]
    Misaligned { addr: usize },
    #[error("scratchpad access at {addr:#x} out of bounds (size {size})")]
    OutOfBounds { addr: usize, size: usize },
    #[error("scratchpad corruption: {0}")]
    Corruption(&'static str),
}
