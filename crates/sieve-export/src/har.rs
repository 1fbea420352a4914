//! HTTP Archive (HAR 1.2) entry model.
//!
//! Only entries are modelled as structs. The surrounding `log` object is
//! written as literal text by the export pipeline so that entries can be
//! streamed one at a time.

use serde::{Deserialize, Serialize};

/// Multipart request bodies are not decomposed into `params`.
pub const SUPPORTS_MULTIPART: bool = false;

/// HAR format version written in the log header.
pub const HAR_VERSION: &str = "1.2";

/// Version reported for the creator.
pub const CREATOR_VERSION: &str = "1.0";

/// Returns the opening text of a HAR document, up to and including the `[`
/// that starts the entries array.
pub fn log_header(product_name: &str) -> serde_json::Result<String> {
    Ok(format!(
        "{{\"log\": {{ \"version\": \"{}\", \"creator\":{{ \"name\": {}, \"version\": \"{}\" }},\"entries\": [",
        HAR_VERSION,
        serde_json::to_string(product_name)?,
        CREATOR_VERSION
    ))
}

/// Closing text of a HAR document.
pub const LOG_FOOTER: &str = "]}}";

/// One request/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// ISO-8601 start of the exchange.
    pub started_date_time: String,
    /// Total elapsed time in milliseconds.
    pub time: f64,
    pub request: Request,
    pub response: Response,
    pub cache: Cache,
    pub timings: Timings,
    #[serde(
        rename = "serverIPAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub cookies: Vec<Cookie>,
    pub headers: Vec<Header>,
    pub query_string: Vec<QueryParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
    /// `-1` when unknown.
    pub headers_size: i64,
    pub body_size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub http_version: String,
    pub cookies: Vec<Cookie>,
    pub headers: Vec<Header>,
    pub content: Content,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    /// `-1` when unknown.
    pub headers_size: i64,
    pub body_size: i64,
}

/// Response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Length of the returned content in bytes.
    pub size: i64,
    /// Bytes saved by compression, when the body was decompressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<i64>,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// `base64` when `text` holds encoded binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    pub mime_type: String,
    /// Present only when the body is text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

impl Cookie {
    /// Creates a cookie with no attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            expires: None,
            http_only: None,
            secure: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: String,
}

/// Cache state. Nothing is recorded, so this is always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {}

/// Phase durations in milliseconds; `-1` for phases that did not apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub blocked: f64,
    pub dns: f64,
    pub connect: f64,
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
    pub ssl: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            blocked: -1.0,
            dns: -1.0,
            connect: -1.0,
            send: -1.0,
            wait: -1.0,
            receive: -1.0,
            ssl: -1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_and_footer_form_valid_json() {
        let empty = format!("{}{}", log_header("Sieve").unwrap(), LOG_FOOTER);
        let value: serde_json::Value = serde_json::from_str(&empty).unwrap();

        assert_eq!(value["log"]["version"], "1.2");
        assert_eq!(value["log"]["creator"]["name"], "Sieve");
        assert_eq!(value["log"]["entries"], json!([]));
    }

    #[test]
    fn product_name_is_escaped() {
        let header = log_header("My \"Tool\"").unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&format!("{}{}", header, LOG_FOOTER)).unwrap();
        assert_eq!(value["log"]["creator"]["name"], "My \"Tool\"");
    }

    #[test]
    fn field_names_follow_har() {
        let cookie = Cookie {
            http_only: Some(true),
            ..Cookie::new("sid", "1")
        };
        let value = serde_json::to_value(&cookie).unwrap();
        assert_eq!(value, json!({"name": "sid", "value": "1", "httpOnly": true}));

        let content = Content {
            size: 3,
            compression: None,
            mime_type: "text/plain".to_string(),
            text: Some("abc".to_string()),
            encoding: None,
        };
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value, json!({"size": 3, "mimeType": "text/plain", "text": "abc"}));
    }

    #[test]
    fn cache_serializes_empty() {
        assert_eq!(serde_json::to_string(&Cache {}).unwrap(), "{}");
    }
}
