//! # sysunit-types
//!
//! Shared types for SysUnit.
//!
//! This crate provides the foundational types used across all SysUnit crates:
//! - [`TBeanId`], [`MemberId`] - Identity types
//! - [`Destination`] - Named message-bus endpoints
//! - [`Command`] - Requests exchanged between master and slave nodes
//! - [`CodecError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod command;
mod destination;
mod error;
mod ids;

pub use command::{Command, CommandKind};
pub use destination::{Destination, DestinationKind};
pub use error::CodecError;
pub use ids::{MemberId, TBeanId};
