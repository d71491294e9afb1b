//! Shared types for the pytd front-end: spans, line lookup, parse errors,
//! and the target environment conditions are evaluated against.

pub mod error;
pub mod span;
pub mod target;

pub use error::ParseError;
pub use span::{LineIndex, Span};
pub use target::TargetEnv;
