//! Archive builder: one stored session to one HAR entry.

use std::net::SocketAddr;
use std::path::Path;

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use sieve_core::codec::{try_recover, Codec};
use sieve_storage::{BodyStore, Session};
use tracing::warn;

use crate::har::{Cache, Content, Entry, PostData, Request, Response, Timings};
use crate::headers::{
    header_value, headers_size, parse_header_block, response_cookies, take_request_cookies,
};
use crate::target::{full_url, query_params};

/// Default size limit for running bodies of unknown encoding through the
/// codec cascade.
pub const DEFAULT_OPPORTUNISTIC_DECODE_LIMIT: usize = 64 * 1024;

/// A body after recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBody {
    /// The body as text, when it is text after recovery.
    pub text: Option<String>,
    /// True if a codec decompressed the body.
    pub recovered: bool,
}

impl DecodedBody {
    fn binary() -> Self {
        Self {
            text: None,
            recovered: false,
        }
    }
}

/// Builds HAR entries from stored sessions.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    opportunistic_decode_limit: usize,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_OPPORTUNISTIC_DECODE_LIMIT)
    }
}

impl ArchiveBuilder {
    /// Creates a builder. Bodies of unknown encoding larger than
    /// `opportunistic_decode_limit` bytes skip the codec cascade.
    pub fn new(opportunistic_decode_limit: usize) -> Self {
        Self {
            opportunistic_decode_limit,
        }
    }

    /// Builds the entry for one session. Returns `None` for a session with
    /// no host.
    pub fn build_entry(&self, session: &Session) -> Option<Entry> {
        let url = full_url(session)?;
        let timings = &session.timings;

        let started = timings.dns_start.unwrap_or(session.created_at);
        let time = match (timings.dns_start, timings.receive_end) {
            (Some(start), Some(end)) => millis_between(start, end).max(0.0),
            _ => 0.0,
        };

        Some(Entry {
            started_date_time: started.to_rfc3339_opts(SecondsFormat::Millis, true),
            time,
            request: self.build_request(session, url),
            response: self.build_response(session),
            cache: Cache::default(),
            timings: build_timings(session),
            server_ip_address: session.remote_address.as_deref().map(server_ip),
        })
    }

    fn build_request(&self, session: &Session, url: String) -> Request {
        let mut headers = parse_header_block(&session.request_headers);
        let cookies = take_request_cookies(&mut headers);

        let body = read_body(session.request_body_path.as_deref());
        let body_size = body.as_ref().map_or(0, |b| b.len() as i64);

        let post_data = body.filter(|b| !b.is_empty()).map(|raw| {
            let decoded = self.decode_body(&raw, header_value(&headers, "content-encoding"));
            PostData {
                mime_type: header_value(&headers, "content-type")
                    .unwrap_or_default()
                    .to_string(),
                text: decoded.text,
            }
        });

        Request {
            method: session.method.clone(),
            query_string: query_params(&url),
            url,
            http_version: session.version.clone(),
            cookies,
            headers_size: headers_size(&headers),
            headers,
            post_data,
            body_size,
        }
    }

    fn build_response(&self, session: &Session) -> Response {
        let headers = parse_header_block(&session.response_headers);
        let cookies = response_cookies(&headers);
        let mime_type = header_value(&headers, "content-type")
            .unwrap_or_default()
            .to_string();

        let body = read_body(session.response_body_path.as_deref()).unwrap_or_default();
        let content = if body.is_empty() {
            Content {
                size: 0,
                compression: None,
                mime_type,
                text: None,
                encoding: None,
            }
        } else {
            let decoded = self.decode_body(&body, header_value(&headers, "content-encoding"));
            match decoded.text {
                Some(text) => {
                    let size = text.len() as i64;
                    Content {
                        size,
                        compression: decoded.recovered.then(|| size - body.len() as i64),
                        mime_type,
                        text: Some(text),
                        encoding: None,
                    }
                }
                None => Content {
                    size: body.len() as i64,
                    compression: None,
                    mime_type,
                    text: Some(base64::engine::general_purpose::STANDARD.encode(&body)),
                    encoding: Some("base64".to_string()),
                },
            }
        };

        Response {
            status: session.status.unwrap_or(0),
            status_text: session.reason.clone().unwrap_or_default(),
            http_version: session.version.clone(),
            cookies,
            redirect_url: header_value(&headers, "location")
                .unwrap_or_default()
                .to_string(),
            headers_size: headers_size(&headers),
            headers,
            content,
            body_size: body.len() as i64,
        }
    }

    /// Recovers a stored body as text.
    ///
    /// A declared encoding that names a known codec sends the body through
    /// the cascade. Otherwise a body that is already UTF-8 is used as is, and
    /// anything else goes through the cascade only if it is within the
    /// opportunistic limit. When the cascade finds nothing the original bytes
    /// still get a text decode.
    pub fn decode_body(&self, raw: &[u8], content_encoding: Option<&str>) -> DecodedBody {
        let declared = content_encoding.and_then(Codec::from_content_encoding);

        if declared.is_none() {
            if let Ok(text) = std::str::from_utf8(raw) {
                return DecodedBody {
                    text: Some(text.to_string()),
                    recovered: false,
                };
            }
            if raw.len() > self.opportunistic_decode_limit {
                return DecodedBody::binary();
            }
        }

        match try_recover(raw) {
            Some((_, bytes)) => match String::from_utf8(bytes) {
                Ok(text) => DecodedBody {
                    text: Some(text),
                    recovered: true,
                },
                Err(_) => DecodedBody::binary(),
            },
            None => DecodedBody {
                text: std::str::from_utf8(raw).ok().map(str::to_string),
                recovered: false,
            },
        }
    }
}

/// Reads a stored body. A missing or unreadable file counts as no body.
pub(crate) fn read_body(path: Option<&Path>) -> Option<Vec<u8>> {
    let path = path?;
    match BodyStore::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read stored body");
            None
        }
    }
}

fn build_timings(session: &Session) -> Timings {
    let t = &session.timings;
    Timings {
        dns: phase(t.dns_start, t.connect_start),
        connect: phase(t.connect_start, t.send_start),
        send: phase(t.send_start, t.send_end),
        wait: phase(t.send_end, t.receive_start),
        receive: phase(t.receive_start, t.receive_end),
        ..Timings::default()
    }
}

/// Duration of a phase in milliseconds, or `-1` when either mark is missing
/// or the phase is not positive.
fn phase(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> f64 {
    match (start, end) {
        (Some(start), Some(end)) => {
            let ms = millis_between(start, end);
            if ms > 0.0 {
                ms
            } else {
                -1.0
            }
        }
        _ => -1.0,
    }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    }
}

/// Strips the port from a recorded `ip:port` address.
fn server_ip(address: &str) -> String {
    address
        .parse::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| address.to_string())
}
