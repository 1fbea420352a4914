//! Raw header blocks and cookies.

use crate::har::{Cookie, Header};

/// Parses a raw header block, one `Name: value` per line.
///
/// Lines without a colon, or whose name contains whitespace (a request or
/// status line), are skipped.
pub fn parse_header_block(block: &str) -> Vec<Header> {
    block
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.is_empty() || name.contains(char::is_whitespace) {
                return None;
            }
            Some(Header::new(name, value.trim()))
        })
        .collect()
}

/// Returns the value of the first header named `name`, ignoring case.
pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Approximate size of a header set: `name + value + 2` per header, seeded
/// at `-1` so that an empty set reports unknown.
pub fn headers_size(headers: &[Header]) -> i64 {
    headers
        .iter()
        .fold(-1, |size, h| size + (h.name.len() + h.value.len() + 2) as i64)
}

/// Splits request cookies out of a header set.
///
/// Every `Cookie` header is removed from `headers` and its pairs returned.
pub fn take_request_cookies(headers: &mut Vec<Header>) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    headers.retain(|h| {
        if h.name.eq_ignore_ascii_case("cookie") {
            cookies.extend(parse_cookie_header(&h.value));
            false
        } else {
            true
        }
    });
    cookies
}

/// Parses a `Cookie` request header value (`a=1; b=2`).
pub fn parse_cookie_header(value: &str) -> Vec<Cookie> {
    value
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some(Cookie::new(name.trim(), value.trim()))
        })
        .collect()
}

/// Collects cookies from every `Set-Cookie` header of a response.
pub fn response_cookies(headers: &[Header]) -> Vec<Cookie> {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case("set-cookie"))
        .filter_map(|h| parse_set_cookie(&h.value))
        .collect()
}

/// Parses one `Set-Cookie` value with its attributes.
pub fn parse_set_cookie(value: &str) -> Option<Cookie> {
    let mut parts = value.split(';');
    let (name, val) = parts.next()?.trim().split_once('=')?;
    if name.trim().is_empty() {
        return None;
    }

    let mut cookie = Cookie::new(name.trim(), val.trim());
    for attr in parts {
        let (key, attr_value) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attr.trim(), None),
        };

        match key.to_ascii_lowercase().as_str() {
            "path" => cookie.path = attr_value.map(str::to_string),
            "domain" => cookie.domain = attr_value.map(str::to_string),
            "expires" => cookie.expires = attr_value.map(str::to_string),
            "httponly" => cookie.http_only = Some(true),
            "secure" => cookie.secure = Some(true),
            _ => {}
        }
    }

    Some(cookie)
}
