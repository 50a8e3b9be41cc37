use crate::template::TemplateError;
use std::fmt;

#[derive(Debug)]
pub enum WalkerError {
    Http(reqwest::Error),
    Status { url: String, status: u16 },
    Decode(serde_json::Error),
    Template(TemplateError),
    Shell(askama::Error),
    MissingElement(String),
}

impl WalkerError {
    pub fn missing(selector: impl Into<String>) -> Self {
        WalkerError::MissingElement(selector.into())
    }
}

impl fmt::Display for WalkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkerError::Http(err) => write!(f, "http error: {err}"),
            WalkerError::Status { url, status } => write!(f, "{url} returned HTTP {status}"),
            WalkerError::Decode(err) => write!(f, "malformed payload: {err}"),
            WalkerError::Template(err) => write!(f, "row template error: {err}"),
            WalkerError::Shell(err) => write!(f, "page shell error: {err}"),
            WalkerError::MissingElement(selector) => {
                write!(f, "page has no element matching {selector:?}")
            }
        }
    }
}

impl std::error::Error for WalkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WalkerError::Http(err) => Some(err),
            WalkerError::Decode(err) => Some(err),
            WalkerError::Template(err) => Some(err),
            WalkerError::Shell(err) => Some(err),
            WalkerError::Status { .. } | WalkerError::MissingElement(_) => None,
        }
    }
}

impl From<reqwest::Error> for WalkerError {
    fn from(value: reqwest::Error) -> Self {
        WalkerError::Http(value)
    }
}

impl From<serde_json::Error> for WalkerError {
    fn from(value: serde_json::Error) -> Self {
        WalkerError::Decode(value)
    }
}

impl From<TemplateError> for WalkerError {
    fn from(value: TemplateError) -> Self {
        WalkerError::Template(value)
    }
}

impl From<askama::Error> for WalkerError {
    fn from(value: askama::Error) -> Self {
        WalkerError::Shell(value)
    }
}
