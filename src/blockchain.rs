//! Thin client for the EthConnect RPC gateway.
//!
//! Two wire operations exist: synchronous `Query` calls and asynchronous
//! `SendTransaction` submissions. Both POST a JSON envelope carrying the ABI
//! method definition and string parameters; the gateway performs the actual
//! encoding and signing. Receipts for submitted transactions are polled via
//! `GET /reply/<id>`.
//!
//! Transaction submission may be routed to a separate URL (`FFTM_URL`),
//! falling back to the gateway base URL when unset.

use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;
use uuid::Uuid;

use tokens_types::abi::AbiEntry;

use crate::config::Config;
use crate::error::ApiError;

/// Per-request context: a correlation id plus operator-configured passthrough
/// headers lifted from the inbound HTTP request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub id: String,
    pub headers: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new() -> Self {
        RequestContext {
            id: Uuid::new_v4().to_string(),
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("Not found")]
    NotFound,
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::NotFound => ApiError::NotFound("Receipt not found".to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub output: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub id: String,
}

/// HTTP client for the RPC gateway.
#[derive(Clone)]
pub struct BlockchainConnector {
    client: reqwest::Client,
    base_url: Url,
    fftm_url: Option<Url>,
    username: Option<String>,
    password: Option<String>,
}

impl BlockchainConnector {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        BlockchainConnector {
            client,
            base_url: config.ethconnect_url.clone(),
            fftm_url: config.fftm_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Synchronous contract read. Returns the gateway's `output`.
    pub async fn query(
        &self,
        ctx: &RequestContext,
        to: &str,
        method: &AbiEntry,
        params: &[Value],
    ) -> Result<QueryResponse, GatewayError> {
        let body = query_payload(to, method, params);
        let request = self
            .request(reqwest::Method::POST, self.base_url.clone())
            .header("x-request-id", &ctx.id)
            .json(&body);
        let response = self.apply_context(request, ctx).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Asynchronous transaction submission. The returned id correlates the
    /// eventual receipt delivered on the event stream.
    pub async fn send_transaction(
        &self,
        ctx: &RequestContext,
        from: &str,
        to: &str,
        request_id: Option<&str>,
        method: &AbiEntry,
        params: &[Value],
    ) -> Result<SendResponse, GatewayError> {
        let body = send_payload(from, to, request_id, method, params);
        let url = self.fftm_url.clone().unwrap_or_else(|| self.base_url.clone());
        let request = self
            .request(reqwest::Method::POST, url)
            .header("x-request-id", &ctx.id)
            .json(&body);
        let response = self.apply_context(request, ctx).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Fetches the latest status for a previously submitted transaction.
    pub async fn get_receipt(&self, ctx: &RequestContext, id: &str) -> Result<Value, GatewayError> {
        let url = self.join(&format!("reply/{id}"));
        let request = self.request(reqwest::Method::GET, url);
        let response = self.apply_context(request, ctx).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        Ok(Self::check(response).await?.json().await?)
    }

    /// Cheap reachability probe used by the readiness endpoint.
    pub async fn ping(&self) -> Result<(), GatewayError> {
        self.request(reqwest::Method::GET, self.base_url.clone())
            .send()
            .await?;
        Ok(())
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    fn apply_context(
        &self,
        mut request: reqwest::RequestBuilder,
        ctx: &RequestContext,
    ) -> reqwest::RequestBuilder {
        for (name, value) in &ctx.headers {
            request = request.header(name, value);
        }
        request
    }

    fn join(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().expect("gateway URL is a base URL");
            segments.pop_if_empty();
            for segment in path.split('/') {
                segments.push(segment);
            }
        }
        url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<Value>().await {
            Ok(body) => body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string()),
            Err(_) => format!("Gateway returned {status}"),
        };
        Err(GatewayError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

fn query_payload(to: &str, method: &AbiEntry, params: &[Value]) -> Value {
    json!({
        "headers": { "type": "Query" },
        "to": to,
        "method": method,
        "params": params,
    })
}

fn send_payload(
    from: &str,
    to: &str,
    request_id: Option<&str>,
    method: &AbiEntry,
    params: &[Value],
) -> Value {
    let mut headers = json!({ "type": "SendTransaction" });
    if let Some(id) = request_id {
        headers["id"] = json!(id);
    }
    json!({
        "headers": headers,
        "from": from,
        "to": to,
        "method": method,
        "params": params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mint_method() -> AbiEntry {
        serde_json::from_value(json!({
            "type": "function",
            "name": "mintWithData",
            "inputs": [
                { "name": "to", "type": "address" },
                { "name": "amount", "type": "uint256" },
                { "name": "data", "type": "bytes" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_query_payload() {
        let body = query_payload("0x123", &mint_method(), &[json!("0xabc")]);
        assert_eq!(body["headers"]["type"], "Query");
        assert_eq!(body["to"], "0x123");
        assert_eq!(body["method"]["name"], "mintWithData");
        assert_eq!(body["params"], json!(["0xabc"]));
        assert!(body.get("from").is_none());
    }

    #[test]
    fn test_send_payload_with_request_id() {
        let body = send_payload(
            "0x1",
            "0x123",
            Some("req-1"),
            &mint_method(),
            &[json!("0x123"), json!("10"), json!("0x00")],
        );
        assert_eq!(body["headers"]["type"], "SendTransaction");
        assert_eq!(body["headers"]["id"], "req-1");
        assert_eq!(body["from"], "0x1");
        assert_eq!(body["params"][2], "0x00");
    }

    #[test]
    fn test_send_payload_without_request_id() {
        let body = send_payload("0x1", "0x123", None, &mint_method(), &[]);
        assert!(body["headers"].get("id").is_none());
    }
}
