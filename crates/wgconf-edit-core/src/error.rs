use std::io;
use thiserror::Error;

use crate::keys::KeyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    NotFound = 1,
    InvalidArguments = 3,
    Io = 4,
    InvalidContent = 5,
    Validation = 6,
}

impl ExitCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::NotFound),
            3 => Some(Self::InvalidArguments),
            4 => Some(Self::Io),
            5 => Some(Self::InvalidContent),
            6 => Some(Self::Validation),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("malformed key material: {0}")]
    MalformedKey(#[from] KeyError),
}

impl EditError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::NotFound(_) => ExitCode::NotFound,
            Self::InvalidArguments(_) => ExitCode::InvalidArguments,
            Self::Io(_) => ExitCode::Io,
            Self::InvalidContent(_) => ExitCode::InvalidContent,
            Self::Validation(_) | Self::MalformedKey(_) => ExitCode::Validation,
        }
    }
}

pub type EditResult<T> = Result<T, EditError>;
