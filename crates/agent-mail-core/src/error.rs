//! Error types for the agent mail router.
//!
//! Every variant maps to one of the stable error codes from the external
//! interface contract, plus the HTTP status a transport layer should use.

use thiserror::Error;

/// Result type alias for agent-mail-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of error kinds the core subsystems emit.
#[derive(Debug, Error)]
pub enum Error {
    // -- Authentication / authorization --------------------------------
    #[error("HTTP signature verification failed")]
    SignatureInvalid,

    #[error("invalid Signature header: {0}")]
    InvalidSignatureHeader(String),

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature header is missing a Date header")]
    DateHeaderRequired,

    #[error("Signature header does not sign the required headers: {0}")]
    InsufficientSignedHeaders(String),

    #[error("request timestamp is outside the allowed window")]
    RequestExpired,

    #[error("an API key is required")]
    ApiKeyRequired,

    #[error("API key is invalid")]
    InvalidApiKey,

    #[error("the master API key is required for this operation")]
    MasterKeyRequired,

    #[error("enrollment token already used")]
    EnrollmentTokenUsed,

    #[error("enrollment token is not scoped to this agent")]
    EnrollmentTokenScope,

    #[error("agent registration is pending approval")]
    RegistrationPending,

    #[error("agent registration was rejected")]
    RegistrationRejected,

    #[error("forbidden: {0}")]
    Forbidden(String),

    // -- Inbox ----------------------------------------------------------
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("envelope signature verification failed")]
    InvalidSignature,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("ack failed: {0}")]
    AckFailed(String),

    #[error("nack failed: {0}")]
    NackFailed(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("message expired")]
    MessageExpired,

    // -- Groups / round tables ------------------------------------------
    #[error("invalid group name: {0}")]
    InvalidName(String),

    #[error("group name contains invalid characters: {0}")]
    InvalidNameChars(String),

    #[error("group name too long: {0} chars (max 100)")]
    NameTooLong(usize),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("message body too large: {0} bytes (max 1 MiB)")]
    BodyTooLarge(usize),

    #[error("round table not found: {0}")]
    RoundTableNotFound(String),

    #[error("round table is not open")]
    RoundTableNotOpen,

    #[error("round table thread is full")]
    RoundTableThreadFull,

    #[error("could not create round table: {0}")]
    CreateRoundTableFailed(String),

    // -- Validation / internal -------------------------------------------
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable identifier returned in the `{"error": "..."}` JSON shape.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::InvalidSignatureHeader(_) => "INVALID_SIGNATURE_HEADER",
            Self::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            Self::DateHeaderRequired => "DATE_HEADER_REQUIRED",
            Self::InsufficientSignedHeaders(_) => "INSUFFICIENT_SIGNED_HEADERS",
            Self::RequestExpired => "REQUEST_EXPIRED",
            Self::ApiKeyRequired => "API_KEY_REQUIRED",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::MasterKeyRequired => "MASTER_KEY_REQUIRED",
            Self::EnrollmentTokenUsed => "ENROLLMENT_TOKEN_USED",
            Self::EnrollmentTokenScope => "ENROLLMENT_TOKEN_SCOPE",
            Self::RegistrationPending => "REGISTRATION_PENDING",
            Self::RegistrationRejected => "REGISTRATION_REJECTED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::SendFailed(_) => "SEND_FAILED",
            Self::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            Self::PullFailed(_) => "PULL_FAILED",
            Self::AckFailed(_) => "ACK_FAILED",
            Self::NackFailed(_) => "NACK_FAILED",
            Self::MessageNotFound(_) => "MESSAGE_NOT_FOUND",
            Self::MessageExpired => "MESSAGE_EXPIRED",
            Self::InvalidName(_) => "INVALID_NAME",
            Self::InvalidNameChars(_) => "INVALID_NAME_CHARS",
            Self::NameTooLong(_) => "NAME_TOO_LONG",
            Self::GroupNotFound(_) => "GROUP_NOT_FOUND",
            Self::BodyTooLarge(_) => "BODY_TOO_LARGE",
            Self::RoundTableNotFound(_) => "ROUND_TABLE_NOT_FOUND",
            Self::RoundTableNotOpen => "ROUND_TABLE_NOT_OPEN",
            Self::RoundTableThreadFull => "ROUND_TABLE_THREAD_FULL",
            Self::CreateRoundTableFailed(_) => "CREATE_ROUND_TABLE_FAILED",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the transport layer should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::SignatureInvalid
            | Self::ApiKeyRequired
            | Self::InvalidApiKey
            | Self::MasterKeyRequired => 401,
            Self::InvalidSignatureHeader(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::DateHeaderRequired
            | Self::InsufficientSignedHeaders(_)
            | Self::InvalidTimestamp(_)
            | Self::InvalidName(_)
            | Self::InvalidNameChars(_)
            | Self::NameTooLong(_)
            | Self::BodyTooLarge(_)
            | Self::InvalidArgument(_)
            | Self::SendFailed(_)
            | Self::PullFailed(_)
            | Self::AckFailed(_)
            | Self::NackFailed(_)
            | Self::CreateRoundTableFailed(_) => 400,
            Self::RequestExpired
            | Self::EnrollmentTokenUsed
            | Self::EnrollmentTokenScope
            | Self::RegistrationPending
            | Self::RegistrationRejected
            | Self::Forbidden(_)
            | Self::InvalidSignature
            | Self::RoundTableNotOpen => 403,
            Self::RecipientNotFound(_)
            | Self::MessageNotFound(_)
            | Self::GroupNotFound(_)
            | Self::RoundTableNotFound(_) => 404,
            Self::RoundTableThreadFull => 409,
            Self::MessageExpired => 410,
            Self::Internal(_) => 500,
        }
    }

    /// Whether the failure is something a retry with the same inputs could
    /// plausibly resolve (transient infra) as opposed to a caller error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SendFailed(_)
                | Self::PullFailed(_)
                | Self::AckFailed(_)
                | Self::NackFailed(_)
                | Self::CreateRoundTableFailed(_)
                | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_401_or_403() {
        assert_eq!(Error::SignatureInvalid.http_status(), 401);
        assert_eq!(Error::ApiKeyRequired.http_status(), 401);
        assert_eq!(Error::InvalidApiKey.http_status(), 401);
        assert_eq!(Error::MasterKeyRequired.http_status(), 401);
        assert_eq!(Error::RequestExpired.http_status(), 403);
        assert_eq!(Error::EnrollmentTokenUsed.http_status(), 403);
        assert_eq!(Error::RegistrationPending.http_status(), 403);
        assert_eq!(Error::RegistrationRejected.http_status(), 403);
    }

    #[test]
    fn inbox_errors_map_to_documented_status() {
        assert_eq!(Error::SendFailed(String::new()).http_status(), 400);
        assert_eq!(Error::RecipientNotFound(String::new()).http_status(), 404);
        assert_eq!(Error::InvalidSignature.http_status(), 403);
        assert_eq!(Error::InvalidTimestamp(String::new()).http_status(), 400);
        assert_eq!(Error::MessageNotFound(String::new()).http_status(), 404);
        assert_eq!(Error::MessageExpired.http_status(), 410);
    }

    #[test]
    fn every_variant_has_a_stable_nonempty_code() {
        let samples = [
            Error::SignatureInvalid,
            Error::InvalidSignatureHeader(String::new()),
            Error::UnsupportedAlgorithm(String::new()),
            Error::DateHeaderRequired,
            Error::InsufficientSignedHeaders(String::new()),
            Error::RequestExpired,
            Error::ApiKeyRequired,
            Error::InvalidApiKey,
            Error::MasterKeyRequired,
            Error::EnrollmentTokenUsed,
            Error::EnrollmentTokenScope,
            Error::RegistrationPending,
            Error::RegistrationRejected,
            Error::Forbidden(String::new()),
            Error::SendFailed(String::new()),
            Error::RecipientNotFound(String::new()),
            Error::InvalidSignature,
            Error::InvalidTimestamp(String::new()),
            Error::PullFailed(String::new()),
            Error::AckFailed(String::new()),
            Error::NackFailed(String::new()),
            Error::MessageNotFound(String::new()),
            Error::MessageExpired,
            Error::InvalidName(String::new()),
            Error::InvalidNameChars(String::new()),
            Error::NameTooLong(0),
            Error::GroupNotFound(String::new()),
            Error::BodyTooLarge(0),
            Error::RoundTableNotFound(String::new()),
            Error::RoundTableNotOpen,
            Error::RoundTableThreadFull,
            Error::CreateRoundTableFailed(String::new()),
            Error::InvalidArgument(String::new()),
            Error::Internal(String::new()),
        ];
        for err in &samples {
            assert!(!err.code().is_empty());
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn recoverable_is_limited_to_infra_failures() {
        assert!(Error::SendFailed(String::new()).is_recoverable());
        assert!(Error::Internal(String::new()).is_recoverable());
        assert!(!Error::InvalidSignature.is_recoverable());
        assert!(!Error::MessageNotFound(String::new()).is_recoverable());
    }
}
