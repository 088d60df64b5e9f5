use std::fmt;

use crate::types::ClientErrorType;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Json(serde_json::Error),
    Signing(String),
    Encoding(String),
    ObjectMapping,
    Remote {
        code: i64,
        kind: Option<ClientErrorType>,
    },
    Config(String),
    Observer(String),
}

impl Error {
    /// Build a vendor error, resolving the code against the known error table.
    pub fn remote(code: i64) -> Self {
        Error::Remote {
            code,
            kind: ClientErrorType::from_code(code),
        }
    }

    /// Vendor error code carried by this error, if any.
    pub fn error_code(&self) -> Option<i64> {
        match self {
            Error::Remote { code, .. } => Some(*code),
            Error::ObjectMapping => Some(ClientErrorType::ObjectMappingError.code()),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Signing(msg) => write!(f, "bad private key: {msg}"),
            Error::Encoding(msg) => write!(f, "encoding error: {msg}"),
            Error::ObjectMapping => write!(f, "response did not match the expected schema"),
            Error::Remote { code, kind: Some(kind) } => {
                write!(f, "Adax reported error code {code}: {kind:?}")
            }
            Error::Remote { code, kind: None } => write!(f, "Adax reported error code {code}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Observer(msg) => write!(f, "observer update failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
