use crate::app::AppState;
use crate::chat::ChatRequest;
use crate::error::{AppError, AppResult};
use crate::synth::{build_completion, new_completion_id, now_ts, spawn_stream};
use crate::upstream::UpstreamPayload;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::CONNECTION;
use axum::http::Uri;
use axum::response::{IntoResponse, Response, Sse};
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::convert::Infallible;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn list_models(State(state): State<AppState>) -> AppResult<Response> {
    let data: Vec<Value> = state
        .model_registry
        .model_ids()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": state.started_at,
                "owned_by": "promptgate"
            })
        })
        .collect();

    Ok(Json(json!({ "object": "list", "data": data })).into_response())
}

/// Translates a chat request into one upstream call and renders the answer
/// either as a full completion or as a simulated chunk stream.
pub async fn create_chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload.map_err(|rejection| {
        AppError::invalid_request(format!("invalid request body: {}", rejection.body_text()))
    })?;
    let prompt = request
        .latest_user_prompt()
        .ok_or_else(|| AppError::invalid_request("no user message found"))?;

    let route = state.model_registry.resolve(request.model.as_deref());
    let model = request
        .model
        .as_deref()
        .filter(|model| !model.is_empty())
        .unwrap_or(route.model)
        .to_string();
    let stream = request.is_stream();
    metrics::counter!(
        "promptgate_requests_total",
        "mode" => if stream { "stream" } else { "full" }
    )
    .increment(1);

    let text = state
        .upstream
        .call(route.endpoint, &UpstreamPayload { text: prompt })
        .await
        .map_err(|err| {
            tracing::warn!(
                endpoint = route.endpoint,
                kind = err.kind.as_str(),
                "upstream call failed: {}",
                err.message
            );
            metrics::counter!(
                "promptgate_upstream_failures_total",
                "kind" => err.kind.as_str()
            )
            .increment(1);
            AppError::from(err)
        })?;

    if stream {
        let events = spawn_stream(text, &model, state.runtime.stream);
        let sse = Sse::new(events.map(Ok::<_, Infallible>));
        // `Sse` already sets the content type and `Cache-Control: no-cache`.
        return Ok(([(CONNECTION, "keep-alive")], sse).into_response());
    }

    let completion = build_completion(&text, &model, &new_completion_id(), now_ts());
    Ok(Json(completion).into_response())
}

pub async fn not_found(uri: Uri) -> AppError {
    AppError::not_found(format!("no route for {}", uri.path()))
}
