//! Error plumbing shared by the chatrelay crates.

pub mod error;

pub use error::FromMessage;
