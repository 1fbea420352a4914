//! Data models for storage.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing marks recorded by the capture engine for one exchange.
///
/// Any mark may be missing, e.g. a reused connection has no DNS or connect
/// phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimings {
    /// DNS lookup started. Also the start of the exchange.
    pub dns_start: Option<DateTime<Utc>>,
    /// TCP/TLS connect started.
    pub connect_start: Option<DateTime<Utc>>,
    /// First request byte sent.
    pub send_start: Option<DateTime<Utc>>,
    /// Last request byte sent.
    pub send_end: Option<DateTime<Utc>>,
    /// First response byte received.
    pub receive_start: Option<DateTime<Utc>>,
    /// Last response byte received.
    pub receive_end: Option<DateTime<Utc>>,
}

/// A captured request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: i64,
    /// Request method (`GET`, `POST`, ...).
    pub method: String,
    /// `http` or `https`.
    pub scheme: String,
    /// Target host without port. Empty when the engine never saw one.
    pub host: String,
    /// Target port, when not the scheme default.
    pub port: Option<u16>,
    /// Request target: a path plus query, or an absolute URL.
    pub uri: String,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Raw request header block, one `Name: value` per line.
    pub request_headers: String,
    /// Raw response header block.
    pub response_headers: String,
    /// Response status code, if a response arrived.
    pub status: Option<u16>,
    /// Response reason phrase.
    pub reason: Option<String>,
    /// Stored request body.
    pub request_body_path: Option<PathBuf>,
    /// Stored response body.
    pub response_body_path: Option<PathBuf>,
    /// Timing marks.
    pub timings: SessionTimings,
    /// Bytes sent upstream.
    pub request_bytes: i64,
    /// Bytes received from upstream.
    pub response_bytes: i64,
    /// Address the request was sent to.
    pub remote_address: Option<String>,
    /// Client identifier, usually the User-Agent.
    pub client_identifier: Option<String>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Parameters for recording a new session.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub uri: String,
    pub version: String,
    pub request_headers: String,
    pub response_headers: String,
    pub status: Option<u16>,
    pub reason: Option<String>,
    pub request_body_path: Option<PathBuf>,
    pub response_body_path: Option<PathBuf>,
    pub timings: SessionTimings,
    pub request_bytes: i64,
    pub response_bytes: i64,
    pub remote_address: Option<String>,
    pub client_identifier: Option<String>,
}

/// Filter for listing sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFilter {
    /// Only sessions whose host contains this text.
    pub host: Option<String>,
    /// Only sessions with this method (case-insensitive).
    pub method: Option<String>,
    /// Only sessions with this status code.
    pub status: Option<u16>,
    /// Maximum number of rows.
    pub limit: i64,
    /// Rows to skip.
    pub offset: i64,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            host: None,
            method: None,
            status: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// A stored policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPolicy {
    /// Unique identifier.
    pub id: i64,
    /// Unique display name.
    pub name: String,
    /// Raw document text.
    pub text: String,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Parameters for storing a policy.
#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub name: String,
    pub text: String,
}

/// Configuration key-value pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration key.
    pub key: String,
    /// Configuration value (JSON).
    pub value: serde_json::Value,
}

/// Sidecar metadata written next to a stored body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyMeta {
    /// Declared `Content-Type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Declared `Content-Encoding`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Stored size in bytes.
    pub size: u64,
    /// When the body was written.
    pub created_at: DateTime<Utc>,
}
