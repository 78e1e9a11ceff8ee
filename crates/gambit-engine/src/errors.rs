use gambit_vision::{InputError, VisionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error(transparent)]
    Input(#[from] InputError),
}
