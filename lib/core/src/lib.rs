//! Core types shared by the gatehouse crates.
//!
//! Strongly-typed identifiers and the `rootcause`-based `Result` alias live
//! here so that the platform-access library and the server agree on them.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, TokenId, UserId};
