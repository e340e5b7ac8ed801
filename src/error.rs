use thiserror::Error;

/// Bearer credential failures raised by the auth gate.
///
/// Every variant except [`AuthError::KeysUnavailable`] is the client's fault
/// and maps to HTTP 401.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No `Authorization` header on the request
    #[error("Missing bearer token")]
    MissingToken,

    /// Header present but not of the form `Bearer <token>`
    #[error("Malformed authorization header")]
    MalformedHeader,

    /// Token could not be decoded as a JWT
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Token `exp` is in the past
    #[error("Token has expired")]
    Expired,

    /// Signature did not verify against the issuer's key
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token `aud` does not contain the expected audience
    #[error("Invalid token audience")]
    InvalidAudience,

    /// Token `iss` is not the configured issuer
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// Token header names a key the issuer does not publish
    #[error("Unknown signing key: {kid}")]
    UnknownKey { kid: String },

    /// Token has no `kid` and the issuer publishes more than one key
    #[error("Token does not name a signing key")]
    MissingKeyId,

    /// Token header names an algorithm other than the configured one
    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Any other validation failure (missing claims, bad nbf, ...)
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// Signing keys could not be fetched from the issuer
    #[error("Signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

/// Client request bodies that cannot be turned into a task.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// No multipart part named `file` was present
    #[error("No file uploaded")]
    MissingFile,

    /// More than one `file` part in a single request
    #[error("Only one file may be uploaded per request")]
    MultipleFiles,

    /// Multipart framing could not be parsed
    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    /// Request body exceeded the configured upload limit
    #[error("Uploaded file is too large")]
    TooLarge,
}

/// Failures while talking to the message broker.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Connection or channel could not be opened
    #[error("Broker connection failed: {0}")]
    Connect(String),

    /// Queue already exists with a different durability
    #[error("Queue '{queue}' already exists with different durability: {message}")]
    DeclareConflict { queue: String, message: String },

    /// Queue declaration failed for another reason
    #[error("Failed to declare queue '{queue}': {message}")]
    Declare { queue: String, message: String },

    /// Message could not be sent
    #[error("Failed to publish to '{queue}': {message}")]
    Publish { queue: String, message: String },

    /// Broker refused to take responsibility for the message
    #[error("Broker rejected message for queue '{queue}'")]
    Nacked { queue: String },

    /// A broker round-trip exceeded the per-request deadline
    #[error("Broker {stage} timed out after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    /// Message body could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Failures while writing uploaded bytes to shared storage.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Underlying filesystem error
    #[error("Storage I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// Upload stream failed while being copied to storage
    #[error("Upload interrupted: {0}")]
    Interrupted(String),
}

/// Top-level error for a request, classified into an HTTP outcome by the
/// responder.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
