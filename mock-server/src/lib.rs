//! Development JSON-RPC server for the batch execution methods.
//!
//! Answers `yupiik-batch-executions`, `yupiik-batch-last-executions` and
//! `yupiik-batch-execution` from a fixture [`Dataset`], single calls and
//! batches alike.

pub mod fixtures;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use common::rpc::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR};
use common::{Method, RpcResponse};
use serde_json::{Map, Value};
use std::sync::Arc;

pub use fixtures::Dataset;

#[derive(Debug, Clone)]
pub struct AppState {
    pub dataset: Dataset,
    pub max_page_size: u64,
}

pub fn app(state: AppState, endpoint: &str) -> Router {
    Router::new()
        .route(endpoint, post(rpc_handler))
        .with_state(Arc::new(state))
}

async fn rpc_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Json<Value> {
    Json(handle_body(&state, &body))
}

/// Answers a raw request body: an object gets one response, an array gets
/// the index-aligned array of responses.
pub fn handle_body(state: &AppState, body: &[u8]) -> Value {
    let parsed: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Unparsable request body: {}", e);
            return to_value(RpcResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {}", e)));
        }
    };
    match parsed {
        Value::Array(calls) if calls.is_empty() => {
            to_value(RpcResponse::failure(Value::Null, INVALID_REQUEST, "Empty batch"))
        }
        Value::Array(calls) => Value::Array(
            calls
                .iter()
                .map(|call| to_value(dispatch(state, call)))
                .collect(),
        ),
        call => to_value(dispatch(state, &call)),
    }
}

fn to_value(response: RpcResponse) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

/// Answers one call object.
pub fn dispatch(state: &AppState, call: &Value) -> RpcResponse {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let Some(method) = call.get("method").and_then(Value::as_str) else {
        return RpcResponse::failure(id, INVALID_REQUEST, "Missing method");
    };
    let empty = Map::new();
    let params = match call.get("params") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(params)) => params,
        Some(_) => return RpcResponse::failure(id, INVALID_PARAMS, "Params must be an object"),
    };

    log::debug!("Dispatching {} {:?}", method, params);
    let result = match Method::from(method) {
        Method::Executions => executions(state, params),
        Method::LastExecutions => serialize(&state.dataset.last_executions()),
        Method::Execution => execution(state, params),
        Method::Custom(name) => Err((METHOD_NOT_FOUND, format!("Unknown method: {}", name))),
    };
    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err((code, message)) => {
            log::info!("{} failed: {}", method, message);
            RpcResponse::failure(id, code, message)
        }
    }
}

type CallResult = Result<Value, (i64, String)>;

fn serialize<T: serde::Serialize>(value: &T) -> CallResult {
    serde_json::to_value(value).map_err(|e| (SERVER_ERROR, e.to_string()))
}

fn integer_param(params: &Map<String, Value>, name: &str) -> Result<i64, (i64, String)> {
    params
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| (INVALID_PARAMS, format!("Missing integer parameter '{}'", name)))
}

fn executions(state: &AppState, params: &Map<String, Value>) -> CallResult {
    let page = integer_param(params, "page")?;
    if page < 0 {
        return Err((INVALID_PARAMS, "'page' must not be negative".to_string()));
    }
    let page_size = integer_param(params, "pageSize")?.clamp(0, state.max_page_size as i64);
    let batch = params
        .get("batch")
        .and_then(Value::as_str)
        .filter(|b| !b.trim().is_empty());
    serialize(&state.dataset.page(page as u64, page_size as u64, batch))
}

fn execution(state: &AppState, params: &Map<String, Value>) -> CallResult {
    let id = match params.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err((INVALID_PARAMS, "Missing parameter 'id'".to_string())),
    };
    match state.dataset.execution(&id) {
        Some(execution) => serialize(&execution),
        None => Err((SERVER_ERROR, format!("No job #{} found.", id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> AppState {
        AppState {
            dataset: Dataset::builtin().unwrap(),
            max_page_size: 50,
        }
    }

    #[test]
    fn single_call_gets_one_response() {
        let body = json!({"jsonrpc": "2.0", "id": 3, "method": "yupiik-batch-execution", "params": {"id": "2"}});
        let reply = handle_body(&state(), body.to_string().as_bytes());
        assert_eq!(reply["id"], 3);
        assert_eq!(reply["result"]["name"], "user-sync");
        assert_eq!(reply["result"]["steps"][0]["id"], "2-1");
    }

    #[test]
    fn batch_is_answered_in_order() {
        let body = json!([
            {"jsonrpc": "2.0", "id": 0, "method": "yupiik-batch-executions", "params": {"page": 0, "pageSize": 2}},
            {"jsonrpc": "2.0", "id": 1, "method": "yupiik-batch-last-executions", "params": {}}
        ]);
        let reply = handle_body(&state(), body.to_string().as_bytes());
        let replies = reply.as_array().unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["result"]["total"], 7);
        assert_eq!(replies[0]["result"]["items"].as_array().unwrap().len(), 2);
        assert_eq!(replies[1]["result"]["total"], 3);
    }

    #[test]
    fn page_size_is_clamped() {
        let state = AppState {
            max_page_size: 4,
            ..state()
        };
        let call = json!({"id": 1, "method": "yupiik-batch-executions", "params": {"page": 0, "pageSize": 500}});
        let response = dispatch(&state, &call);
        assert_eq!(response.result.unwrap()["items"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn unknown_id_reports_the_job() {
        let call = json!({"id": 1, "method": "yupiik-batch-execution", "params": {"id": "404"}});
        let error = dispatch(&state(), &call).error.unwrap();
        assert_eq!(error.message.as_deref(), Some("No job #404 found."));
    }

    #[test]
    fn error_codes() {
        let state = state();
        let code = |call: Value| dispatch(&state, &call).error.and_then(|e| e.code);

        assert_eq!(code(json!({"id": 1, "method": "nope"})), Some(METHOD_NOT_FOUND));
        assert_eq!(
            code(json!({"id": 1, "method": "yupiik-batch-executions", "params": {"pageSize": 10}})),
            Some(INVALID_PARAMS)
        );
        assert_eq!(
            code(json!({"id": 1, "method": "yupiik-batch-executions", "params": [0, 10]})),
            Some(INVALID_PARAMS)
        );
        assert_eq!(code(json!({"id": 1})), Some(INVALID_REQUEST));

        let reply = handle_body(&state, b"{not json");
        assert_eq!(reply["error"]["code"], PARSE_ERROR);
    }
}
