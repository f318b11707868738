pub mod camera;
pub mod config;
pub mod runtime;

pub use camera::*;
pub use config::*;
pub use runtime::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Input contract violation: {0}")]
    InputContract(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Numeric error: {0}")]
    Numeric(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn input_contract(msg: impl Into<String>) -> Self {
        Self::InputContract(msg.into())
    }
}
