use thiserror::Error;

/// Result type for bridged native operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error outputs from bridged native operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum BridgeError {
    /// The native library refused the call synchronously (non-zero status code).
    #[error("native call rejected with code {code}")]
    ImmediateDispatch {
        /// Status code returned by the native entry point.
        code: u32,
    },
    /// The native operation ran and reported failure through its callback.
    #[error("native operation failed with code {code}")]
    AsyncCompletion {
        /// Error code delivered to the callback.
        code: u32,
    },
    /// The callback reported success but carried no payload.
    #[error("{reason}")]
    MissingPayload {
        /// What was expected and is missing.
        reason: String,
    },
    /// The callback payload could not be decoded.
    #[error("invalid_payload: {0}")]
    InvalidPayload(String),
    /// The operation requires a state the resource is not in.
    #[error("invalid_state: {0}")]
    InvalidState(String),
    /// The resource already holds a native handle.
    #[error("already_initialized")]
    AlreadyInitialized,
    /// The presented input cannot be passed across the native boundary.
    #[error("invalid_input: {0}")]
    InvalidInput(String),
    /// Unexpected error encoding or decoding serialized state.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// The completion channel closed without a result.
    #[error("internal_error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Returns the native error code for errors originating in the native library.
    #[must_use]
    pub const fn code(&self) -> Option<u32> {
        match self {
            Self::ImmediateDispatch { code } | Self::AsyncCompletion { code } => {
                Some(*code)
            }
            _ => None,
        }
    }

    pub(crate) fn missing_payload(reason: &str) -> Self {
        Self::MissingPayload {
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
