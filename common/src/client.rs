use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::extensions::{Extensions, HeaderProvider};
use crate::rpc::{IdSequence, Method, RpcCall, RpcReply, RpcRequest};
use crate::store::{FetchKey, FetchOutcome, FetchStore, Query};

/// JSON-RPC client bound to one endpoint.
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: Url,
    ids: IdSequence,
    headers: Option<HeaderProvider>,
}

impl RpcClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_endpoint(base_url, crate::DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(base_url: &str, endpoint: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid base URL: {}", base_url))?;
        let endpoint = base
            .join(endpoint)
            .with_context(|| format!("Invalid endpoint path: {}", endpoint))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            ids: IdSequence::new(),
            headers: None,
        })
    }

    /// Builds a client from configuration. Configured headers are sent first,
    /// extension headers after them.
    pub fn from_config(config: &ClientConfig, extensions: &Extensions) -> Result<Self> {
        let mut client = Self::with_endpoint(&config.base_url, &config.endpoint)?;
        if let Some(ms) = config.timeout_ms {
            client.http = reqwest::Client::builder()
                .timeout(Duration::from_millis(ms))
                .build()
                .context("Failed to build HTTP client")?;
        }

        let configured: Vec<(String, String)> = config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !configured.is_empty() || extensions.headers.is_some() {
            let extensions = extensions.clone();
            client = client.with_header_provider(std::sync::Arc::new(move || {
                let mut headers = configured.clone();
                headers.extend(extensions.extra_headers());
                headers
            }));
        }
        Ok(client)
    }

    pub fn with_header_provider(mut self, provider: HeaderProvider) -> Self {
        self.headers = Some(provider);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// A single call with a fresh id.
    pub fn call(&self, method: &Method, params: Value) -> RpcRequest {
        RpcRequest::Single(RpcCall::new(self.ids.next(), method, params))
    }

    /// A batch, one fresh id per call, in the given order.
    pub fn batch(&self, calls: Vec<(Method, Value)>) -> RpcRequest {
        RpcRequest::Batch(
            calls
                .into_iter()
                .map(|(method, params)| RpcCall::new(self.ids.next(), &method, params))
                .collect(),
        )
    }

    /// The request a query stands for: single unless auxiliary calls ride along.
    pub fn request_for(&self, query: &Query) -> RpcRequest {
        if query.auxiliary().is_empty() {
            return self.call(query.method(), query.params().clone());
        }
        let mut calls = vec![(query.method().clone(), query.params().clone())];
        calls.extend(query.auxiliary().iter().map(|m| (m.clone(), json!({}))));
        self.batch(calls)
    }

    fn url_for(&self, request: &RpcRequest) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(method) = request.primary_method() {
            url.query_pairs_mut().append_pair("m", method);
        }
        url
    }

    /// Sends `request` and classifies the reply. Never fails: every problem
    /// ends up in `FetchOutcome::Error`.
    pub async fn send(&self, request: &RpcRequest) -> FetchOutcome {
        FetchOutcome::from(self.exchange(request).await)
    }

    async fn exchange(&self, request: &RpcRequest) -> Result<Value, FetchError> {
        let body = serde_json::to_vec(request).map_err(|e| FetchError::Payload(e.to_string()))?;
        let url = self.url_for(request);
        log::debug!("POST {} ({} call(s))", url, request.calls().len());

        let mut builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body);
        if let Some(provider) = &self.headers {
            for (name, value) in provider() {
                builder = builder.header(name, value);
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        RpcReply::parse(request, &bytes)?.into_result()
    }

    /// Sends `request` while tracking it in `store` under `key`: the key goes
    /// to loading first and always leaves it, unless a newer fetch for the
    /// same key took over.
    pub async fn fetch(&self, store: &FetchStore, key: &FetchKey, request: &RpcRequest) -> FetchOutcome {
        let ticket = store.begin(key);
        log::debug!("Fetching {} (generation {})", key, ticket.generation());
        let outcome = self.send(request).await;
        if let FetchOutcome::Error { message } = &outcome {
            log::warn!("Fetch of {} failed: {}", key, message);
        }
        store.complete(ticket, outcome.clone());
        outcome
    }

    /// Fetches `query` if its key changed or it was invalidated; otherwise
    /// returns what the store holds for it. The slot of the key the query
    /// moved away from is dropped.
    pub async fn refresh(&self, store: &FetchStore, query: &mut Query) -> FetchOutcome {
        if !query.needs_fetch() {
            if let Some(outcome) = store.get(&query.current_key()) {
                return outcome;
            }
        }
        let previous = query.fetched_key().cloned();
        let key = query.mark_fetched();
        if let Some(previous) = previous.filter(|p| *p != key) {
            store.remove(&previous);
        }
        let request = self.request_for(query);
        self.fetch(store, &key, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn single_call_returns_result() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jsonrpc"))
            .and(query_param("m", "yupiik-batch-execution"))
            .and(header("content-type", "application/json"))
            .and(header("accept", "application/json"))
            .and(body_json(json!({
                "jsonrpc": "2.0", "id": 0, "method": "yupiik-batch-execution", "params": {"id": "1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 0, "result": {"id": "1", "name": "nightly"}
            })))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let request = client.call(&Method::Execution, json!({"id": "1"}));
        let outcome = client.send(&request).await;
        assert_eq!(
            outcome,
            FetchOutcome::Data {
                value: json!({"id": "1", "name": "nightly"})
            }
        );
    }

    #[tokio::test]
    async fn non_200_is_an_error_and_loading_ends() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let store = FetchStore::new();
        let mut query = Query::new(Method::Executions, json!({"page": 0, "pageSize": 10}));
        let outcome = client.refresh(&store, &mut query).await;

        assert_eq!(
            outcome,
            FetchOutcome::Error {
                message: "Invalid response status: HTTP 500.".into()
            }
        );
        assert!(!store.is_loading(&query.current_key()));
        assert_eq!(store.get(&query.current_key()), Some(outcome));
    }

    #[tokio::test]
    async fn batch_error_discards_other_results() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("m", "yupiik-batch-executions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"jsonrpc": "2.0", "id": 0, "result": {"total": 0, "items": []}},
                {"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "names unavailable"}}
            ])))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let query = Query::new(Method::Executions, json!({"page": 0, "pageSize": 10}))
            .with_auxiliary(Method::LastExecutions);
        let request = client.request_for(&query);
        assert!(request.is_batch());

        let outcome = client.send(&request).await;
        let message = outcome.error().unwrap();
        assert!(message.contains("names unavailable"));
        assert!(outcome.data().is_none());
    }

    #[tokio::test]
    async fn batch_results_keep_request_order() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"result": {"total": 1, "items": [{"id": "1"}]}},
                {"result": {"total": 2, "items": []}}
            ])))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let request = client.batch(vec![
            (Method::Executions, json!({"page": 0, "pageSize": 10})),
            (Method::LastExecutions, json!({})),
        ]);
        let outcome = client.send(&request).await;
        let value = outcome.data().unwrap();
        assert_eq!(value[0]["total"], 1);
        assert_eq!(value[1]["total"], 2);
    }

    #[tokio::test]
    async fn rpc_error_message_is_wrapped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": -32000, "message": "No job #9 found."}
            })))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let outcome = client.send(&client.call(&Method::Execution, json!({"id": "9"}))).await;
        assert_eq!(outcome.error(), Some("Invalid response: No job #9 found.."));
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let outcome = client.send(&client.call(&Method::Execution, json!({}))).await;
        assert!(outcome.error().unwrap().starts_with("Invalid response payload"));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        // port 9 (discard) is not expected to answer HTTP
        let client = RpcClient::new("http://127.0.0.1:9").unwrap();
        let store = FetchStore::new();
        let key = FetchKey::new(Method::Execution, &json!({}));
        let request = client.call(&Method::Execution, json!({}));
        let outcome = client.fetch(&store, &key, &request).await;
        assert!(outcome.error().unwrap().starts_with("Request failed"));
        assert!(!store.is_loading(&key));
    }

    #[tokio::test]
    async fn extra_headers_are_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-tenant", "ops"))
            .and(header("x-trace", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut config = ClientConfig {
            base_url: mock_server.uri(),
            ..ClientConfig::default()
        };
        config.headers.insert("X-Tenant".into(), "ops".into());
        let extensions = Extensions::new().with_headers(|| vec![("X-Trace".into(), "abc".into())]);

        let client = RpcClient::from_config(&config, &extensions).unwrap();
        let outcome = client.send(&client.call(&Method::Executions, json!({}))).await;
        assert_eq!(outcome, FetchOutcome::Data { value: json!(true) });
    }

    #[tokio::test]
    async fn refresh_skips_unchanged_queries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 1})))
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let store = FetchStore::new();
        let mut query = Query::new(Method::Executions, json!({"page": 0}));

        client.refresh(&store, &mut query).await;
        let cached = client.refresh(&store, &mut query).await;
        assert_eq!(cached, FetchOutcome::Data { value: json!(1) });

        query.set_params(json!({"page": 1}));
        client.refresh(&store, &mut query).await;
    }

    #[tokio::test]
    async fn batch_answered_by_one_error_object_shows_its_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(
                {"jsonrpc": "2.0", "id": null, "error": {"code": -32600, "message": "Empty batch"}}
            )))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let request = client.batch(vec![(Method::Executions, json!({})), (Method::LastExecutions, json!({}))]);
        let outcome = client.send(&request).await;
        assert_eq!(outcome.error(), Some("Invalid response: Empty batch."));
    }

    #[tokio::test]
    async fn late_response_of_superseded_fetch_is_dropped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"id": 0})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "old"}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"id": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "new"})))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let store = FetchStore::new();
        let key = FetchKey::new(Method::Executions, &json!({"page": 0}));
        let older = client.call(&Method::Executions, json!({"page": 0}));
        let newer = client.call(&Method::Executions, json!({"page": 0}));

        let (old_outcome, new_outcome) = tokio::join!(
            client.fetch(&store, &key, &older),
            client.fetch(&store, &key, &newer)
        );
        assert_eq!(old_outcome, FetchOutcome::Data { value: json!("old") });
        assert_eq!(new_outcome, FetchOutcome::Data { value: json!("new") });
        assert_eq!(store.get(&key), Some(FetchOutcome::Data { value: json!("new") }));
    }

    #[tokio::test]
    async fn refresh_drops_the_slot_of_the_previous_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 1})))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(&mock_server.uri()).unwrap();
        let store = FetchStore::new();
        let mut query = Query::new(Method::Executions, json!({"page": 0}));
        client.refresh(&store, &mut query).await;
        let first = query.current_key();

        query.set_params(json!({"page": 1}));
        client.refresh(&store, &mut query).await;
        assert_eq!(store.get(&first), None);
        assert_eq!(store.get(&query.current_key()), Some(FetchOutcome::Data { value: json!(1) }));

        query.invalidate();
        client.refresh(&store, &mut query).await;
        assert!(store.get(&query.current_key()).is_some());
    }

    #[tokio::test]
    async fn ids_increase_per_call() {
        let client = RpcClient::new("http://localhost:8080").unwrap();
        let first = client.call(&Method::Execution, json!({}));
        let batch = client.batch(vec![(Method::Executions, json!({})), (Method::LastExecutions, json!({}))]);
        let ids: Vec<u64> = first.calls().iter().chain(batch.calls()).map(|c| c.id).collect();
        assert_eq!(ids, [0, 1, 2]);
    }

    #[test]
    fn endpoint_joins_base() {
        let client = RpcClient::with_endpoint("http://localhost:8080/app/", "/rpc").unwrap();
        assert_eq!(client.endpoint().as_str(), "http://localhost:8080/rpc");
    }
}
