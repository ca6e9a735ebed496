use thiserror::Error;

/// Fatal errors for a whole parse pass.
///
/// Malformed log content never ends up here: bad lines are recorded as
/// [`crate::parser::ParseError`] and the pass keeps going.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read combat log: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pipeline config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("parse worker failed: {0}")]
    Worker(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
