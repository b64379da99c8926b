use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::FetchError;

pub const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INVALID_REQUEST: i64 = -32600;
pub const PARSE_ERROR: i64 = -32700;
pub const SERVER_ERROR: i64 = -32000;

/// Methods exposed by the batch execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Execution,
    Executions,
    LastExecutions,
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Execution => "yupiik-batch-execution",
            Method::Executions => "yupiik-batch-executions",
            Method::LastExecutions => "yupiik-batch-last-executions",
            Method::Custom(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        match name {
            "yupiik-batch-execution" => Method::Execution,
            "yupiik-batch-executions" => Method::Executions,
            "yupiik-batch-last-executions" => Method::LastExecutions,
            other => Method::Custom(other.to_string()),
        }
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Method::from(s))
    }
}

/// One JSON-RPC 2.0 call as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcCall {
    pub fn new(id: u64, method: &Method, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.as_str().to_string(),
            params,
        }
    }
}

/// A request is built explicitly as a single call or as a batch, the
/// transport never inspects the payload to find out which one it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RpcRequest {
    Single(RpcCall),
    Batch(Vec<RpcCall>),
}

impl RpcRequest {
    /// Method used in the `m` query parameter: the call itself, or the first
    /// call of a batch.
    pub fn primary_method(&self) -> Option<&str> {
        match self {
            RpcRequest::Single(call) => Some(&call.method),
            RpcRequest::Batch(calls) => calls.first().map(|c| c.method.as_str()),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, RpcRequest::Batch(_))
    }

    pub fn calls(&self) -> &[RpcCall] {
        match self {
            RpcRequest::Single(call) => std::slice::from_ref(call),
            RpcRequest::Batch(calls) => calls,
        }
    }
}

/// Session-scoped id allocator. Ids are not correlated with responses, they
/// only tag in-flight calls.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: None,
            error: Some(RpcErrorObject {
                code: Some(code),
                message: Some(message.into()),
                data: None,
            }),
        }
    }

    fn error_message(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| e.message.clone().unwrap_or_default())
    }
}

/// Decoded body, shaped after the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    Single(RpcResponse),
    Batch(Vec<RpcResponse>),
}

impl RpcReply {
    /// A batch may be answered by one error object when the server rejects
    /// the batch as a whole; that error is kept as the reply.
    pub fn parse(request: &RpcRequest, body: &[u8]) -> Result<Self, FetchError> {
        let payload = |e: serde_json::Error| FetchError::Payload(e.to_string());
        match request {
            RpcRequest::Single(_) => serde_json::from_slice(body).map(RpcReply::Single).map_err(payload),
            RpcRequest::Batch(_) => match serde_json::from_slice::<Value>(body).map_err(payload)? {
                Value::Array(items) => items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<RpcResponse>, _>>()
                    .map(RpcReply::Batch)
                    .map_err(payload),
                other => {
                    let response: RpcResponse = serde_json::from_value(other).map_err(payload)?;
                    if response.error.is_none() {
                        return Err(FetchError::Payload(
                            "expected an array of responses for a batch request".to_string(),
                        ));
                    }
                    Ok(RpcReply::Single(response))
                }
            },
        }
    }

    /// Collapses the reply to the result value(s) or to the joined error
    /// messages. Any error in a batch fails the whole batch.
    pub fn into_result(self) -> Result<Value, FetchError> {
        match self {
            RpcReply::Single(response) => match response.error_message() {
                Some(message) => Err(FetchError::Rpc(message)),
                None => Ok(response.result.unwrap_or(Value::Null)),
            },
            RpcReply::Batch(responses) => {
                let messages: Vec<String> =
                    responses.iter().filter_map(RpcResponse::error_message).collect();
                if !messages.is_empty() {
                    return Err(FetchError::Rpc(messages.join("\n")));
                }
                Ok(Value::Array(
                    responses
                        .into_iter()
                        .map(|r| r.result.unwrap_or(Value::Null))
                        .collect(),
                ))
            }
        }
    }
}
