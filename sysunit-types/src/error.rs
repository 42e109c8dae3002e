//! Error types for SysUnit wire encoding.

use thiserror::Error;

/// Errors that can occur while encoding or decoding commands.
#[derive(Debug, Error)]
pub enum CodecError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),
}
