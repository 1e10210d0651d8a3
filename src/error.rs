//! Errors raised by container runtime adapters.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("container {0} has no usable identity")]
    MissingIdentity(String),
}
