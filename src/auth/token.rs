// Request token extraction: `Authorization: Bearer <token>` or the `token` cookie, whose
// value is base64 JSON of the stored profile (`{"token": ..., "username": ...}`).

use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};

pub fn from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix("token="))
        .find_map(from_cookie_value)
}

fn percent_decode_base64(s: &str) -> String {
    s.replace("%3D", "=")
        .replace("%3d", "=")
        .replace("%2B", "+")
        .replace("%2b", "+")
        .replace("%2F", "/")
        .replace("%2f", "/")
}

/// Token inside a cookie value; a value that is not base64 JSON is taken as the token itself.
pub fn from_cookie_value(value: &str) -> Option<String> {
    let value = percent_decode_base64(value.trim().trim_matches('"'));
    if value.is_empty() {
        return None;
    }
    let decoded = STANDARD
        .decode(&value)
        .or_else(|_| URL_SAFE.decode(&value))
        .or_else(|_| URL_SAFE_NO_PAD.decode(&value))
        .ok()
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok());
    match decoded {
        Some(profile) => profile
            .get("token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        None => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    /// Cookie value the SPA stores for a profile.
    fn encode_cookie_value(profile: &serde_json::Value) -> String {
        STANDARD.encode(profile.to_string())
    }

    #[test]
    fn bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("token=zzz"));
        assert_eq!(from_headers(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_carries_base64_profile() {
        let value = encode_cookie_value(&serde_json::json!({"token": "t-1", "username": "steve"}));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; token={}", value.replace('=', "%3D")))
                .unwrap(),
        );
        assert_eq!(from_headers(&headers).as_deref(), Some("t-1"));
    }

    #[test]
    fn missing_token() {
        assert_eq!(from_headers(&HeaderMap::new()), None);
        assert_eq!(from_cookie_value(""), None);
    }
}
