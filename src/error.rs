use std::io;

use thiserror::Error;

/// Failures raised by the rewrite filter.
///
/// The filter is a forward-only, write-only sink: the random-access side of
/// the stream interface is permanently disabled rather than conditionally
/// unavailable.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("RewriteFilter::{0} is not supported")]
    NotSupported(&'static str),

    #[error("RewriteFilter::{0} called after dispose")]
    Disposed(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<FilterError> for io::Error {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Unsupported, other),
        }
    }
}

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: {value:?}")]
    InvalidAddr { var: &'static str, value: String },

    #[error("{var} is not a positive integer: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}
