//! `sieve decode`

use std::path::Path;

use anyhow::{Context, Result};
use sieve_core::try_recover;

/// What decoding a stored body produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    /// Name of the codec that recovered the body, if any did.
    pub codec: Option<&'static str>,
    /// The body as text, if it is valid UTF-8 after recovery.
    pub text: Option<String>,
    /// Size of the recovered (or original) bytes.
    pub size: usize,
}

/// Runs a body file through the codec cascade.
pub fn run(path: &Path) -> Result<DecodedFile> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let original_text = || std::str::from_utf8(&data).ok().map(str::to_owned);

    let decoded = match try_recover(&data) {
        Some((codec, bytes)) => DecodedFile {
            codec: Some(codec.name()),
            size: bytes.len(),
            text: String::from_utf8(bytes).ok().or_else(original_text),
        },
        None => DecodedFile {
            codec: None,
            size: data.len(),
            text: original_text(),
        },
    };

    Ok(decoded)
}
