use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    // upstream (or the relay) answered with a non-2xx status
    #[error("HTTP {status}: {status_text}")]
    Http { status: u16, status_text: String },

    // DNS, refused connection, timeout, broken body
    #[error("Network error: {0}")]
    Network(String),

    // the body was not the JSON we expected
    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid ICAO code: {0}")]
    InvalidSite(String),
}

impl FetchError {
    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        FetchError::Http {
            status,
            status_text: status_text.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed upperwind data: {0}")]
    InvalidJson(String),

    #[error("Upper wind payload is not an array")]
    NotAnArray,

    #[error("Upper wind payload has {0} elements, expected 12")]
    WrongLength(usize),

    #[error("Upper wind levels are missing or not an array")]
    MissingLevels,

    #[error("Upper wind level {index} is malformed")]
    MalformedLevel { index: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ICAO codes should be 4 characters (e.g., CYYT, CYQX, CYHZ), got '{0}'")]
    InvalidIcao(String),

    #[error("No sites configured")]
    NoSites,

    #[error("Invalid {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

pub type FetchResult<T> = Result<T, FetchError>;
