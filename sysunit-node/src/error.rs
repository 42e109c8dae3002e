//! Top-level node errors.

use thiserror::Error;

use crate::bus::TransportError;
use crate::config::ConfigError;
use crate::dispatcher::DispatchError;

/// Errors from running a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Bus failure while setting up the node.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A command could not be dispatched.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
