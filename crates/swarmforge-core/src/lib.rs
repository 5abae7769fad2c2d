//! Core types and error definitions for SwarmForge.
//!
//! This crate provides the foundational types shared across all SwarmForge
//! crates: the unified error enum and the message envelope carried by the
//! in-process message bus.
//!
//! # Main types
//!
//! - [`SwarmError`]: Unified error enum for all SwarmForge components.
//! - [`SwarmResult`]: Convenience alias for `Result<T, SwarmError>`.
//! - [`SwarmMessage`]: An immutable message exchanged between agents.
//! - [`MessageType`]: The closed set of message kinds.

/// Error types.
pub mod error;
/// Message envelope types.
pub mod message;

pub use error::{AssignmentFailure, SwarmError, SwarmResult};
pub use message::{MessageType, SwarmMessage};
