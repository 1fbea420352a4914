//! Request URL reconstruction.

use sieve_core::is_absolute_uri;
use sieve_storage::Session;
use url::Url;

use crate::har::QueryParam;

/// Rebuilds the absolute URL of a session.
///
/// Returns `None` when the session has no host. An absolute request target
/// is returned as recorded; otherwise the URL is assembled from scheme,
/// host, port (omitted when it is the scheme default) and target.
pub fn full_url(session: &Session) -> Option<String> {
    if session.host.is_empty() {
        return None;
    }

    if is_absolute_uri(&session.uri) {
        return Some(session.uri.clone());
    }

    let scheme = if session.scheme.is_empty() {
        "http"
    } else {
        session.scheme.as_str()
    };

    let port = match (scheme, session.port) {
        (_, None) | ("http", Some(80)) | ("https", Some(443)) => String::new(),
        (_, Some(port)) => format!(":{}", port),
    };

    let path = if session.uri.is_empty() {
        "/"
    } else {
        session.uri.as_str()
    };
    let separator = if path.starts_with('/') { "" } else { "/" };

    Some(format!(
        "{}://{}{}{}{}",
        scheme, session.host, port, separator, path
    ))
}

/// Decodes the query string of a URL into name/value pairs, in order.
pub fn query_params(url: &str) -> Vec<QueryParam> {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .query_pairs()
            .map(|(name, value)| QueryParam {
                name: name.into_owned(),
                value: value.into_owned(),
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}
