//! curl command reconstruction.

use sieve_storage::Session;

use crate::archive::{read_body, ArchiveBuilder};
use crate::headers::{header_value, parse_header_block};
use crate::target::full_url;

/// Rebuilds a curl command line for a session.
///
/// Emits `curl`, then `-k` for https, `-X <METHOD>`, one `-H` per request
/// header (cookies included), the body, and finally the quoted URL. A text
/// body is passed inline with `-d`; any other body is referenced by its
/// stored file with `--data-binary @<path>`.
///
/// Returns `None` when the session has no host.
pub fn curl_command(session: &Session, builder: &ArchiveBuilder) -> Option<String> {
    let url = full_url(session)?;
    let headers = parse_header_block(&session.request_headers);

    let mut parts = vec!["curl".to_string()];

    if session.scheme.eq_ignore_ascii_case("https") || url.starts_with("https://") {
        parts.push("-k".to_string());
    }

    parts.push(format!("-X {}", session.method));

    for header in &headers {
        parts.push(format!(
            "-H {}",
            double_quote(&format!("{}: {}", header.name, header.value))
        ));
    }

    let path = session.request_body_path.as_deref();
    if let Some(body) = read_body(path).filter(|b| !b.is_empty()) {
        let decoded = builder.decode_body(&body, header_value(&headers, "content-encoding"));
        match (decoded.text, path) {
            (Some(text), _) => parts.push(format!("-d {}", single_quote(&text))),
            (None, Some(path)) => parts.push(format!(
                "--data-binary {}",
                double_quote(&format!("@{}", path.display()))
            )),
            (None, None) => {}
        }
    }

    parts.push(double_quote(&url));

    Some(parts.join(" "))
}

/// Quotes for a POSIX shell with single quotes.
fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Quotes for a POSIX shell with double quotes.
fn double_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sieve_storage::{BodyStore, Direction};
    use tempfile::TempDir;

    fn session() -> Session {
        Session {
            id: 4,
            method: "GET".to_string(),
            scheme: "https".to_string(),
            host: "a.com".to_string(),
            port: None,
            uri: "/x?y=1".to_string(),
            version: "HTTP/1.1".to_string(),
            request_headers: "Host: a.com\r\nCookie: sid=1\r\n".to_string(),
            response_headers: String::new(),
            status: Some(200),
            reason: None,
            request_body_path: None,
            response_body_path: None,
            timings: Default::default(),
            request_bytes: 0,
            response_bytes: 0,
            remote_address: None,
            client_identifier: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn get_request() {
        let cmd = curl_command(&session(), &ArchiveBuilder::default()).unwrap();
        assert_eq!(
            cmd,
            r#"curl -k -X GET -H "Host: a.com" -H "Cookie: sid=1" "https://a.com/x?y=1""#
        );
    }

    #[test]
    fn plain_http_has_no_k() {
        let mut s = session();
        s.scheme = "http".to_string();
        s.request_headers.clear();
        let cmd = curl_command(&s, &ArchiveBuilder::default()).unwrap();
        assert_eq!(cmd, r#"curl -X GET "http://a.com/x?y=1""#);
    }

    #[test]
    fn text_body_inline() {
        let dir = TempDir::new().unwrap();
        let store = BodyStore::new(dir.path());

        let mut s = session();
        s.method = "POST".to_string();
        s.request_headers.clear();
        s.request_body_path =
            Some(store.write(4, Direction::Request, b"{\"name\":\"it's\"}", None, None).unwrap());

        let cmd = curl_command(&s, &ArchiveBuilder::default()).unwrap();
        assert_eq!(
            cmd,
            r#"curl -k -X POST -d '{"name":"it'\''s"}' "https://a.com/x?y=1""#
        );
    }

    #[test]
    fn binary_body_references_file() {
        let dir = TempDir::new().unwrap();
        let store = BodyStore::new(dir.path());

        let mut s = session();
        s.method = "PUT".to_string();
        s.request_headers.clear();
        let path = store.write(4, Direction::Request, &[0xFF; 16], None, None).unwrap();
        s.request_body_path = Some(path.clone());

        let cmd = curl_command(&s, &ArchiveBuilder::default()).unwrap();
        assert!(cmd.contains(&format!("--data-binary \"@{}\"", path.display())));
        assert!(cmd.ends_with(r#""https://a.com/x?y=1""#));
    }

    #[test]
    fn header_values_are_escaped() {
        let mut s = session();
        s.request_headers = "X-Token: a\"b$c\r\n".to_string();
        let cmd = curl_command(&s, &ArchiveBuilder::default()).unwrap();
        assert!(cmd.contains(r#"-H "X-Token: a\"b\$c""#));
    }

    #[test]
    fn missing_host_has_no_command() {
        let mut s = session();
        s.host.clear();
        assert!(curl_command(&s, &ArchiveBuilder::default()).is_none());
    }
}
