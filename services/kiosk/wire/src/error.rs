//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Payload is not valid JSON
    #[error("payload is not valid json: {0}")]
    Json(#[source] serde_json::Error),

    /// Payload is not an object or carries no string `type` field
    #[error("message has no type")]
    MissingType,

    /// A known message type with missing or mistyped fields
    #[error("invalid {kind} message: {source}")]
    Invalid {
        /// Value of the `type` field
        kind: String,
        /// Underlying decode failure
        #[source]
        source: serde_json::Error,
    },

    /// Outbound message could not be serialized
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}
