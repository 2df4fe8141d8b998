//! Header parsing helpers shared by the engine, retry, and rate-limit
//! crates.

use http::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Resolves the charset parameter of a `Content-Type` value.
///
/// The value is split on `;`; parameters are scanned for
/// `charset=VALUE` with surrounding quotes and whitespace stripped.
/// Returns `None` when no charset parameter is present; callers fall back
/// to utf-8 (also when the returned label is not a known encoding).
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    const STRIP: &[char] = &['"', '\'', ' '];

    for param in content_type.split(';').skip(1) {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim_matches(STRIP).eq_ignore_ascii_case("charset") {
            return Some(value.trim_matches(STRIP).to_string());
        }
    }

    None
}

/// Parses a `Retry-After` value: either an integer number of seconds or an
/// RFC-1123 HTTP-date. Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Looks up `Retry-After` in `headers` (header names are matched
/// case-insensitively) and parses it.
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(raw)
}
