use crate::config::UpstreamConfig;
use crate::identity::IdentityProvider;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const IDENTITY_HEADER: &str = "x-user-email";

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamPayload {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Network,
    Http,
    Business,
}

impl UpstreamErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamErrorKind::Network => "network",
            UpstreamErrorKind::Http => "http",
            UpstreamErrorKind::Business => "business",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamCallError {
    pub kind: UpstreamErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
}

impl UpstreamCallError {
    pub fn new(kind: UpstreamErrorKind, status: Option<StatusCode>, message: String) -> Self {
        Self {
            kind,
            status,
            message,
        }
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
    identity: Arc<dyn IdentityProvider>,
}

impl UpstreamClient {
    pub fn new(
        http: reqwest::Client,
        config: UpstreamConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            http,
            config,
            identity,
        }
    }

    /// Issues one POST to `endpoint` and returns the validated `data` text.
    ///
    /// There is no retry and no timeout: a failed attempt is reported as is.
    pub async fn call(
        &self,
        endpoint: &str,
        payload: &UpstreamPayload,
    ) -> Result<String, UpstreamCallError> {
        let url = join_url(&self.config.base_url, endpoint);
        let started_at = std::time::Instant::now();
        let resp = self
            .http
            .post(&url)
            .header(IDENTITY_HEADER, self.identity.new_identity())
            .header(reqwest::header::ORIGIN, &self.config.origin)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                UpstreamCallError::new(UpstreamErrorKind::Network, None, err.to_string())
            })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|err| {
            UpstreamCallError::new(UpstreamErrorKind::Network, Some(status), err.to_string())
        })?;
        if !status.is_success() {
            return Err(UpstreamCallError::new(
                UpstreamErrorKind::Http,
                Some(status),
                format!("upstream status {}: {}", status.as_u16(), text),
            ));
        }
        let envelope: UpstreamResult = serde_json::from_str(&text).map_err(|err| {
            UpstreamCallError::new(
                UpstreamErrorKind::Business,
                Some(status),
                format!("upstream returned malformed envelope ({err}): {text}"),
            )
        })?;
        tracing::debug!(
            endpoint,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            success = envelope.success,
            "upstream call finished"
        );
        validate_envelope(envelope)
    }
}

fn validate_envelope(envelope: UpstreamResult) -> Result<String, UpstreamCallError> {
    match envelope {
        UpstreamResult {
            success: true,
            data: Some(data),
        } => Ok(data),
        other => {
            let serialized = serde_json::to_string(&other).unwrap_or_default();
            Err(UpstreamCallError::new(
                UpstreamErrorKind::Business,
                Some(StatusCode::OK),
                format!("upstream business error: {serialized}"),
            ))
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://up/", "/api/x"), "http://up/api/x");
        assert_eq!(join_url("http://up", "api/x"), "http://up/api/x");
        assert_eq!(join_url("http://up/", ""), "http://up");
    }

    #[test]
    fn envelope_with_data_is_accepted() {
        let envelope: UpstreamResult =
            serde_json::from_str(r#"{"success":true,"data":"Hi there"}"#).unwrap();
        assert_eq!(validate_envelope(envelope).unwrap(), "Hi there");
    }

    #[test]
    fn empty_data_is_still_a_success() {
        let envelope: UpstreamResult =
            serde_json::from_str(r#"{"success":true,"data":""}"#).unwrap();
        assert_eq!(validate_envelope(envelope).unwrap(), "");
    }

    #[test]
    fn failed_or_empty_envelopes_are_business_errors() {
        for raw in [
            r#"{"success":false}"#,
            r#"{"success":true}"#,
            r#"{"success":false,"data":"partial"}"#,
            r#"{}"#,
        ] {
            let envelope: UpstreamResult = serde_json::from_str(raw).unwrap();
            let err = validate_envelope(envelope).unwrap_err();
            assert_eq!(err.kind, UpstreamErrorKind::Business);
            assert!(err.message.starts_with("upstream business error:"));
        }
    }
}
