use crate::config::{ConfigError, ENV_DEFAULT_MODEL};
use crate::error::StartupError;
use crate::identity::{IdentityProvider, RandomIdentity};
use crate::model_registry::ModelRegistry;
use crate::upstream::UpstreamClient;
use axum::Router;
use axum::extract::Request;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::{Arc, Once, OnceLock};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub use crate::config::RuntimeConfig;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub model_registry: ModelRegistry,
    pub upstream: UpstreamClient,
    pub metrics: PrometheusHandle,
    pub started_at: i64,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<String> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

pub fn load_state() -> Result<AppState, StartupError> {
    load_state_with_runtime(RuntimeConfig::from_env()?)
}

pub fn load_state_with_runtime(runtime: RuntimeConfig) -> Result<AppState, StartupError> {
    load_state_with_identity(runtime, Arc::new(RandomIdentity))
}

pub fn load_state_with_identity(
    runtime: RuntimeConfig,
    identity: Arc<dyn IdentityProvider>,
) -> Result<AppState, StartupError> {
    let http = reqwest::Client::builder().build()?;

    let model_registry = ModelRegistry::new(runtime.models.clone(), runtime.default_model.clone())
        .ok_or_else(|| ConfigError::Invalid {
            key: ENV_DEFAULT_MODEL,
            reason: format!("{} is not in the model map", runtime.default_model),
        })?;

    let upstream = UpstreamClient::new(http, runtime.upstream.clone(), identity);
    let metrics = init_metrics()?;

    Ok(AppState {
        runtime: Arc::new(runtime),
        model_registry,
        upstream,
        metrics,
        started_at: crate::synth::now_ts(),
    })
}

fn init_metrics() -> Result<PrometheusHandle, StartupError> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(err.to_string());
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(StartupError::Metrics(err.clone()));
    }
    METRICS_HANDLE
        .get()
        .cloned()
        .ok_or_else(|| StartupError::Metrics("recorder not available".to_string()))
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.runtime.metrics_path.clone();
    Router::<AppState>::new()
        .route(
            "/v1/models",
            get(crate::handlers::list_models).fallback(crate::handlers::not_found),
        )
        .route(
            "/v1/chat/completions",
            post(crate::handlers::create_chat_completions).fallback(crate::handlers::not_found),
        )
        .route(&metrics_path, get(crate::handlers::metrics))
        .fallback(crate::handlers::not_found)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state,
            crate::auth::require_bearer_for_v1,
        ))
        .layer(middleware::from_fn(answer_preflight))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
}

// Any OPTIONS request is a CORS preflight; the header layers above decorate it.
async fn answer_preflight(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    next.run(req).await
}
