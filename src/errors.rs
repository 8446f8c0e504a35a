use std::{io, str::Utf8Error};

use quick_xml::events::attributes::AttrError;
use thiserror::Error;

use crate::etl::schema::ValidationFailure;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed document: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed document at byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("validation failed: {0}")]
    Validation(ValidationFailure),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }

    /// Structural failures of the source document, as opposed to output or config problems.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Xml(_) | Error::Parse { .. })
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error::parse(0, value.to_string())
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::parse(0, value.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(value: regex::Error) -> Self {
        Error::Config(value.to_string())
    }
}

impl From<ValidationFailure> for Error {
    fn from(value: ValidationFailure) -> Self {
        Error::Validation(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Message(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Message(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
