use http::StatusCode;

/// Stable, banded error codes surfaced on the in-process status snapshot
/// and logged alongside every error. Bands mirror the taxonomy in
/// spec.md §7: client-side, configuration, data/schema, transient
/// transport, and internal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side / validation errors (10000-10999)
    InvalidParameter = 10000,
    ExceedsLimitation = 10010,

    // Configuration errors (20000-20999) -- fatal at startup, per §7.6
    MissingConfiguration = 20000,
    InvalidConfiguration = 20010,

    // Resource errors (30000-30999)
    ResourceNotFound = 30000,
    AlreadyExists = 30010,

    // Transient transport errors (40000-40999) -- retried at next cycle
    NetworkError = 40000,
    ConnectionTimeout = 40010,
    DeltaTokenExpired = 40020,
    CollaboratorQuotaExhausted = 40030,

    // Data / schema errors (50000-50999)
    DatabaseError = 50000,
    SchemaIntegrityError = 50010,
    SerializationError = 50020,

    // External tool errors (60000-60999)
    ExtractionFailed = 60000,
    ExtractionUnsupported = 60010,
    ExtractionTimeout = 60020,

    // Internal errors (90000-90999)
    InternalError = 90000,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidParameter | ErrorCode::ExceedsLimitation => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::MissingConfiguration | ErrorCode::InvalidConfiguration => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::NetworkError
            | ErrorCode::ConnectionTimeout
            | ErrorCode::DeltaTokenExpired
            | ErrorCode::CollaboratorQuotaExhausted => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError
            | ErrorCode::SchemaIntegrityError
            | ErrorCode::SerializationError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ExtractionFailed
            | ErrorCode::ExtractionUnsupported
            | ErrorCode::ExtractionTimeout => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
