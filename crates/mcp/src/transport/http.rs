//! Streamable HTTP transport: one JSON-RPC POST per message.

use std::collections::HashMap;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

const SESSION_HEADER: &str = "Mcp-Session-Id";

pub(crate) struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    pub(crate) fn new(url: &str, headers: &HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            headers: headers.clone(),
            session_id: RwLock::new(None),
        }
    }

    pub(crate) async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        let response = self.post(request).await?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(session.to_string());
        }

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::InvalidResponse(format!("HTTP {status}: {body}")));
        }

        if is_event_stream {
            find_in_event_stream(&body, &request.id)
        } else {
            Ok(serde_json::from_str(&body)?)
        }
    }

    pub(crate) async fn notify(&self, notification: &JsonRpcNotification) -> Result<()> {
        let response = self.post(notification).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::InvalidResponse(format!(
                "notification rejected with HTTP {status}"
            )));
        }
        Ok(())
    }

    /// Ask the server to drop our session. Best effort: servers may not
    /// support explicit termination.
    pub(crate) async fn close(&self) -> Result<()> {
        let Some(session) = self.session_id.write().await.take() else {
            return Ok(());
        };

        let response = self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, session)
            .send()
            .await?;
        tracing::debug!(status = %response.status(), "session terminated");
        Ok(())
    }

    async fn post(&self, body: &impl Serialize) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream");

        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        if let Some(session) = self.session_id.read().await.as_deref() {
            req = req.header(SESSION_HEADER, session);
        }

        Ok(req.json(body).send().await?)
    }
}

/// Pick the reply for `id` out of a `text/event-stream` body.
fn find_in_event_stream(body: &str, id: &RequestId) -> Result<JsonRpcResponse> {
    for data in event_data(body) {
        let Ok(message) = serde_json::from_str::<Value>(&data) else {
            continue;
        };
        if message.get("method").is_some() {
            continue;
        }
        if let Ok(response) = serde_json::from_value::<JsonRpcResponse>(message) {
            if &response.id == id {
                return Ok(response);
            }
        }
    }
    Err(Error::InvalidResponse(
        "event stream ended without a reply".to_string(),
    ))
}

/// Collect the `data:` payload of every event in an SSE body.
fn event_data(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        if line.is_empty() {
            if !current.is_empty() {
                events.push(current.join("\n"));
                current.clear();
            }
        } else if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        events.push(current.join("\n"));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn event_data_joins_multiline_events() {
        let body = "event: message\ndata: {\"a\":\ndata: 1}\n\n: comment\ndata: second\n";
        assert_eq!(event_data(body), vec!["{\"a\":\n1}", "second"]);
    }

    #[test]
    fn event_stream_reply_is_matched_by_id() {
        let body = concat!(
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n\n",
        );
        let response = find_in_event_stream(body, &RequestId::Number(7)).unwrap();
        assert_eq!(response.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn session_header_is_echoed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header(SESSION_HEADER, "abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 2, "result": {"tools": []}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(SESSION_HEADER, "abc")
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {}})),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri(), &HashMap::new());
        let first = transport.request(&JsonRpcRequest::new(1i64, "initialize")).await.unwrap();
        assert_eq!(first.id, RequestId::Number(1));

        let second = transport.request(&JsonRpcRequest::new(2i64, "tools/list")).await.unwrap();
        assert_eq!(second.id, RequestId::Number(2));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri(), &HashMap::new());
        let err = transport
            .request(&JsonRpcRequest::new(1i64, "initialize"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(msg) if msg.contains("500")));
    }
}
