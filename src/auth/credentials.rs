//! Credential extraction from inbound requests.
//!
//! Pure classification only: no verification happens here. Precedence is
//! bearer token, then passport-code header, then the legacy session cookie.

use axum::http::{header::AUTHORIZATION, header::COOKIE, HeaderMap};

pub const PASSPORT_CODE_HEADER: &str = "x-passport-code";
pub const LEGACY_SESSION_COOKIE: &str = "student_session";

/// Candidate credential found on a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    BearerToken(String),
    PassportCode(String),
    LegacySessionCookie(String),
}

/// Extract the highest-precedence candidate credential, if any.
///
/// `None` is not an error; optional-auth paths treat it as anonymous.
#[must_use]
pub fn resolve_credential(headers: &HeaderMap) -> Option<Credential> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(Credential::BearerToken(token));
    }
    if let Some(code) = extract_passport_code(headers) {
        return Some(Credential::PassportCode(code));
    }
    extract_cookie(headers, LEGACY_SESSION_COOKIE).map(Credential::LegacySessionCookie)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn extract_passport_code(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(PASSPORT_CODE_HEADER)?.to_str().ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        // Codes are human-typed; normalize case here, validate format later.
        Some(trimmed.to_uppercase())
    }
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn no_headers_yields_none() {
        assert_eq!(resolve_credential(&HeaderMap::new()), None);
    }

    #[test]
    fn bearer_token_extracted() {
        let headers = headers(&[("authorization", "Bearer tok-123")]);
        assert_eq!(
            resolve_credential(&headers),
            Some(Credential::BearerToken("tok-123".to_string()))
        );
    }

    #[test]
    fn empty_bearer_token_ignored() {
        let headers = headers(&[("authorization", "Bearer   ")]);
        assert_eq!(resolve_credential(&headers), None);
    }

    #[test]
    fn passport_code_extracted_and_uppercased() {
        let headers = headers(&[("x-passport-code", "fox-7k2")]);
        assert_eq!(
            resolve_credential(&headers),
            Some(Credential::PassportCode("FOX-7K2".to_string()))
        );
    }

    #[test]
    fn legacy_cookie_extracted() {
        let headers = headers(&[("cookie", "theme=dark; student_session=opaque-token")]);
        assert_eq!(
            resolve_credential(&headers),
            Some(Credential::LegacySessionCookie("opaque-token".to_string()))
        );
    }

    #[test]
    fn bearer_wins_over_passport_code_and_cookie() {
        let headers = headers(&[
            ("authorization", "Bearer tok-123"),
            ("x-passport-code", "FOX-7K2"),
            ("cookie", "student_session=opaque-token"),
        ]);
        assert_eq!(
            resolve_credential(&headers),
            Some(Credential::BearerToken("tok-123".to_string()))
        );
    }

    #[test]
    fn passport_code_wins_over_cookie() {
        let headers = headers(&[
            ("x-passport-code", "FOX-7K2"),
            ("cookie", "student_session=opaque-token"),
        ]);
        assert_eq!(
            resolve_credential(&headers),
            Some(Credential::PassportCode("FOX-7K2".to_string()))
        );
    }
}
