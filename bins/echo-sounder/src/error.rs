use echo_core::{ConfigError, ControllerError};

#[derive(Debug, thiserror::Error)]
pub enum SounderError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Invalid(#[from] ConfigError),

    #[error("{0}")]
    Controller(#[from] ControllerError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
