//! Subcommand implementations.
//!
//! Each command returns the text to print so it can be tested without a
//! terminal.

pub mod decode;
pub mod export;
pub mod matching;
pub mod policy;
pub mod sessions;
