mod stream;
mod tools;
mod transfer;

pub use stream::{OpenMode, UriStream, UriStreamOptions};
pub use tools::copy_to_path;
pub use transfer::{TransferDriver, TransferSession};

use thiserror::Error;

#[macro_use]
extern crate log;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("open failed: {0}")]
    OpenFailure(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("read failed: {0}")]
    ReadFailure(String),
    #[error("offset too large: {0}")]
    OffsetTooLarge(String),
    #[error("invalid param: {0}")]
    InvalidParam(String),
}

impl StreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StreamError::NotFound(_))
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StreamError::NotFound(err.to_string()),
            std::io::ErrorKind::InvalidInput => StreamError::InvalidParam(err.to_string()),
            _ => StreamError::ReadFailure(err.to_string()),
        }
    }
}

impl From<StreamError> for std::io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match &err {
            StreamError::NotFound(_) => std::io::ErrorKind::NotFound,
            StreamError::InvalidParam(_) => std::io::ErrorKind::InvalidInput,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err.to_string())
    }
}
