use crate::app::AppState;
use crate::config::AuthMode;
use crate::error::{AppError, AppResult};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Gates every path under `/v1`, whether or not a route matches it.
pub async fn require_bearer_for_v1(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if is_v1_path(req.uri().path()) {
        if let Err(err) = authorize(&state.runtime.auth, req.headers()) {
            return err.into_response();
        }
    }
    next.run(req).await
}

fn is_v1_path(path: &str) -> bool {
    path == "/v1" || path.starts_with("/v1/")
}

/// Checks the bearer token against the configured master key.
///
/// A missing or non-bearer header is `unauthorized`; a wrong token is
/// `invalid_api_key`. With auth disabled every request passes.
pub fn authorize(mode: &AuthMode, headers: &HeaderMap) -> AppResult<()> {
    let AuthMode::Bearer(expected) = mode else {
        return Ok(());
    };
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("missing authorization header"))?;
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("authorization header must use the Bearer scheme"))?;
    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(AppError::invalid_api_key("invalid api key"));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::{authorize, is_v1_path};
    use crate::config::AuthMode;
    use axum::http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION};

    fn headers(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn v1_prefix_matching_is_segment_aware() {
        assert!(is_v1_path("/v1"));
        assert!(is_v1_path("/v1/models"));
        assert!(is_v1_path("/v1/unknown/deep"));
        assert!(!is_v1_path("/v10/models"));
        assert!(!is_v1_path("/metrics"));
    }

    #[test]
    fn disabled_mode_accepts_anything() {
        for value in [None, Some("Bearer nope"), Some("garbage")] {
            assert!(authorize(&AuthMode::Disabled, &headers(value)).is_ok());
        }
    }

    #[test]
    fn bearer_mode_distinguishes_missing_from_wrong() {
        let mode = AuthMode::Bearer("sk-master".to_string());
        assert!(authorize(&mode, &headers(Some("Bearer sk-master"))).is_ok());

        let missing = authorize(&mode, &headers(None)).unwrap_err();
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
        let malformed = authorize(&mode, &headers(Some("Basic abc"))).unwrap_err();
        assert_eq!(malformed.status, StatusCode::UNAUTHORIZED);

        let wrong = authorize(&mode, &headers(Some("Bearer sk-other"))).unwrap_err();
        assert_eq!(wrong.status, StatusCode::FORBIDDEN);
        assert_eq!(wrong.code, "invalid_api_key");
        let prefix = authorize(&mode, &headers(Some("Bearer sk-maste"))).unwrap_err();
        assert_eq!(prefix.status, StatusCode::FORBIDDEN);
    }
}
