//! Body recovery cascade.
//!
//! Captured bodies are stored exactly as they crossed the wire. The declared
//! `Content-Encoding` of a capture is not reliable (it can be missing, wrong,
//! or recorded before the header was read), so recovery does not trust it.
//! Instead every codec in [`Codec::CASCADE`] is tried in a fixed order and the
//! first one that decodes cleanly wins.
//!
//! ## Order
//!
//! 1. gzip (`gzip`)
//! 2. zlib-framed deflate (`zip`)
//! 3. raw deflate (`inflate`)
//! 4. Brotli (`brotli`)
//! 5. LZFSE (`lzfse`), the balanced general-purpose algorithm
//! 6. LZ4 frames (`lz4`), the very fast low-ratio algorithm
//! 7. LZMA in an xz container (`lzma`), the high-ratio slow algorithm
//!
//! Some byte sequences are valid input to more than one codec, so the order is
//! part of the contract.

use std::fmt;
use std::io::{self, Read};

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Read buffer size handed to the Brotli decompressor.
const BROTLI_BUFFER_SIZE: usize = 4096;

/// A decompression algorithm known to the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Deflate inside a gzip frame.
    Gzip,
    /// Deflate inside a zlib frame.
    Zlib,
    /// Raw deflate with no framing.
    Deflate,
    /// Brotli.
    Brotli,
    /// LZFSE.
    Lzfse,
    /// LZ4 frame format.
    Lz4,
    /// LZMA in an xz container.
    Lzma,
}

impl Codec {
    /// The fixed order in which the cascade attempts each codec.
    pub const CASCADE: [Codec; 7] = [
        Codec::Gzip,
        Codec::Zlib,
        Codec::Deflate,
        Codec::Brotli,
        Codec::Lzfse,
        Codec::Lz4,
        Codec::Lzma,
    ];

    /// Returns the stable name of this codec.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Zlib => "zip",
            Codec::Deflate => "inflate",
            Codec::Brotli => "brotli",
            Codec::Lzfse => "lzfse",
            Codec::Lz4 => "lz4",
            Codec::Lzma => "lzma",
        }
    }

    /// Parses a codec from its stable name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::CASCADE
            .into_iter()
            .find(|codec| codec.name().eq_ignore_ascii_case(s.trim()))
    }

    /// Maps a declared `Content-Encoding` value to a codec.
    ///
    /// For stacked encodings (`gzip, br`) the outermost one, listed last,
    /// decides. Returns `None` for `identity` and unknown tokens.
    pub fn from_content_encoding(value: &str) -> Option<Self> {
        let token = value.rsplit(',').next()?.trim().to_ascii_lowercase();
        match token.as_str() {
            "gzip" | "x-gzip" => Some(Codec::Gzip),
            // HTTP "deflate" is zlib-framed in practice.
            "deflate" => Some(Codec::Zlib),
            "br" => Some(Codec::Brotli),
            "lzfse" => Some(Codec::Lzfse),
            "lz4" => Some(Codec::Lz4),
            "xz" | "x-xz" | "lzma" => Some(Codec::Lzma),
            _ => None,
        }
    }

    /// Decodes `data` with this codec alone.
    pub fn decode(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Codec::Gzip => {
                GzDecoder::new(data).read_to_end(&mut out)?;
            }
            Codec::Zlib => {
                ZlibDecoder::new(data).read_to_end(&mut out)?;
            }
            Codec::Deflate => {
                DeflateDecoder::new(data).read_to_end(&mut out)?;
            }
            Codec::Brotli => {
                brotli::Decompressor::new(data, BROTLI_BUFFER_SIZE).read_to_end(&mut out)?;
            }
            Codec::Lzfse => {
                lzfse_rust::decode_bytes(data, &mut out)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{e:?}")))?;
            }
            Codec::Lz4 => {
                lz4_flex::frame::FrameDecoder::new(data).read_to_end(&mut out)?;
            }
            Codec::Lzma => {
                let mut input = data;
                lzma_rs::xz_decompress(&mut input, &mut out)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{e:?}")))?;
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of running bytes through the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// A codec decoded the input.
    Recovered {
        /// The codec that succeeded.
        codec: Codec,
        /// The decoded bytes.
        bytes: Vec<u8>,
    },
    /// No codec applied; the original input is returned untouched.
    Unchanged(Vec<u8>),
}

impl Recovery {
    /// Returns the resulting bytes, decoded or original.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Recovery::Recovered { bytes, .. } => bytes,
            Recovery::Unchanged(bytes) => bytes,
        }
    }

    /// Consumes the recovery and returns the resulting bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Recovery::Recovered { bytes, .. } => bytes,
            Recovery::Unchanged(bytes) => bytes,
        }
    }

    /// Returns the codec that succeeded, if any.
    pub fn codec(&self) -> Option<Codec> {
        match self {
            Recovery::Recovered { codec, .. } => Some(*codec),
            Recovery::Unchanged(_) => None,
        }
    }

    /// Returns true if a codec decoded the input.
    pub fn is_recovered(&self) -> bool {
        matches!(self, Recovery::Recovered { .. })
    }
}

/// Runs `data` through the cascade without taking ownership.
///
/// An attempt that errors or yields no output counts as a failure. Returns
/// `None` when every codec failed or `data` is empty.
pub fn try_recover(data: &[u8]) -> Option<(Codec, Vec<u8>)> {
    if data.is_empty() {
        return None;
    }

    for codec in Codec::CASCADE {
        match codec.decode(data) {
            Ok(bytes) if !bytes.is_empty() => {
                debug!(
                    codec = codec.name(),
                    input = data.len(),
                    output = bytes.len(),
                    "Recovered body"
                );
                return Some((codec, bytes));
            }
            Ok(_) => trace!(codec = codec.name(), "Codec produced no output"),
            Err(e) => trace!(codec = codec.name(), error = %e, "Codec rejected input"),
        }
    }

    None
}

/// Runs `data` through the cascade.
pub fn recover(data: Vec<u8>) -> Recovery {
    match try_recover(&data) {
        Some((codec, bytes)) => Recovery::Recovered { codec, bytes },
        None => Recovery::Unchanged(data),
    }
}

/// Recovers `data` for display as text.
///
/// Tries the cascade first, then falls back to decoding the original bytes.
/// Returns `None` if neither is valid UTF-8.
pub fn recover_text(data: &[u8]) -> Option<String> {
    if let Some((_, bytes)) = try_recover(data) {
        if let Ok(text) = String::from_utf8(bytes) {
            return Some(text);
        }
    }

    std::str::from_utf8(data).ok().map(str::to_owned)
}
