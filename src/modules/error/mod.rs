use code::ErrorCode;
use snafu::{Location, Snafu};

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum InboxError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

pub type InboxResult<T, E = InboxError> = std::result::Result<T, E>;

impl InboxError {
    pub fn code(&self) -> ErrorCode {
        match self {
            InboxError::Generic { code, .. } => *code,
        }
    }
}

impl From<rusqlite::Error> for InboxError {
    fn from(e: rusqlite::Error) -> Self {
        crate::raise_error!(format!("sqlite error: {e}"), ErrorCode::DatabaseError)
    }
}

impl From<rusqlite_migration::Error> for InboxError {
    fn from(e: rusqlite_migration::Error) -> Self {
        crate::raise_error!(format!("migration error: {e}"), ErrorCode::DatabaseError)
    }
}

impl From<serde_json::Error> for InboxError {
    fn from(e: serde_json::Error) -> Self {
        crate::raise_error!(format!("json error: {e}"), ErrorCode::SerializationError)
    }
}

impl From<reqwest::Error> for InboxError {
    fn from(e: reqwest::Error) -> Self {
        crate::raise_error!(format!("transport error: {e}"), ErrorCode::NetworkError)
    }
}

impl From<std::io::Error> for InboxError {
    fn from(e: std::io::Error) -> Self {
        crate::raise_error!(format!("io error: {e}"), ErrorCode::InternalError)
    }
}
