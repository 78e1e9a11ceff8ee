use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("recognition failed: {0}")]
    Recognition(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input injection failed: {0}")]
    Injection(String),
}
