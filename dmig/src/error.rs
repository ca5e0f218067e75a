use std::{error, fmt};

/// Error type shared by the migration engine and its front-ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A remote call that could not be performed
    Api(String),
    /// A root identifier that does not resolve
    NotFound(String),
    /// Remote state the engine can't work with (duplicate ids, wrong root kind)
    Structure(String),
    /// A precondition the operator must resolve or explicitly override
    Policy(String),
    Auth(String),
    Config(String),
    Bug(String),
}

impl Error {
    /// Whether this error originates from the remote service rather than
    /// from the engine or the local environment
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Api(..) | Self::NotFound(..) | Self::Structure(..))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(msg) => write!(f, "API error: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Structure(msg) => write!(f, "Unexpected remote structure: {msg}"),
            Self::Policy(msg) => write!(f, "Migration blocked: {msg}"),
            Self::Auth(msg) => write!(f, "Authorization error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Bug(msg) => write!(f, "dmig bug error: {msg}"),
        }
    }
}

impl error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[macro_export]
macro_rules! structure_bail {
    ($($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::Structure(format!($($t)*)));
    };
}

#[macro_export]
macro_rules! policy_bail {
    ($($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::Policy(format!($($t)*)));
    };
}

#[macro_export]
macro_rules! bug_bail {
    ($($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::Bug(format!($($t)*)));
    };
}
