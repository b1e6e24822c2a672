use std::sync::Arc;

use async_trait::async_trait;
use core_types::{
    HttpResponse, HttpTransport, OutboundRequest, ProviderAdapter, ProviderId, TransportError,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

mod chat_completions;
mod generative;
pub mod response;

pub use chat_completions::ChatCompletionsAdapter;
pub use generative::{ContentRole, GenerativeContentAdapter};
pub use response::ProviderResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub referer: String,
    pub title: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            referer: "http://localhost".to_string(),
            title: "AI Chat Assistant".to_string(),
        }
    }
}

pub fn adapter_for(id: ProviderId, identity: &ClientIdentity) -> Arc<dyn ProviderAdapter> {
    match id {
        ProviderId::ChatCompletions => Arc::new(ChatCompletionsAdapter::new(identity.clone())),
        ProviderId::GenerativeContent => Arc::new(GenerativeContentAdapter::new()),
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError> {
        let mut headers = HeaderMap::new();
        apply_headers(&mut headers, &request.headers)?;
        let timeout = request.timeout;

        let response = self
            .client
            .post(&request.url)
            .headers(headers)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout)
            .json(&request.body)
            .send()
            .await
            .map_err(|err| describe(err, timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| describe(err, timeout))?;
        Ok(HttpResponse { status, body })
    }
}

fn apply_headers(
    headers: &mut HeaderMap,
    pairs: &[(String, String)],
) -> Result<(), TransportError> {
    for (key, value) in pairs {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| TransportError(format!("invalid header name: {key}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError(format!("invalid header value for {key}")))?;
        headers.insert(name, value);
    }
    Ok(())
}

// The url can carry a query-string key, so it is stripped before display.
fn describe(err: reqwest::Error, timeout: std::time::Duration) -> TransportError {
    if err.is_timeout() {
        return TransportError(format!(
            "request timed out after {}ms",
            timeout.as_millis()
        ));
    }
    TransportError(err.without_url().to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn local_transport() -> ReqwestTransport {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("client");
        ReqwestTransport::with_client(client)
    }

    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.expect("read");
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + content_length {
                        break;
                    }
                }
            }
            let reply = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.expect("write");
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn posts_json_and_returns_status_and_body() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", r#"{"ok":true}"#).await;
        let transport = local_transport();
        let request = OutboundRequest::post(format!("{base}/chat/completions"), json!({"a": 1}))
            .header("Authorization", "Bearer sk-test")
            .with_timeout(Duration::from_secs(5));

        let response = transport.post_json(request).await.expect("response");
        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body, r#"{"ok":true}"#);

        let raw = server.await.expect("server");
        assert!(raw.starts_with("POST /chat/completions"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(raw.ends_with(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn non_success_status_is_not_a_transport_error() {
        let (base, server) = serve_once(
            "HTTP/1.1 401 Unauthorized",
            r#"{"error":{"message":"bad key"}}"#,
        )
        .await;
        let response = local_transport()
            .post_json(OutboundRequest::post(base, json!({})))
            .await
            .expect("response");
        assert_eq!(response.status, 401);
        assert!(!response.is_success());
        server.await.expect("server");
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = local_transport()
            .post_json(
                OutboundRequest::post(format!("http://{addr}/?key=secret"), json!({}))
                    .with_timeout(Duration::from_secs(2)),
            )
            .await
            .expect_err("must fail");
        assert!(!err.0.contains("secret"), "key leaked: {err}");
    }

    #[tokio::test]
    async fn silent_server_times_out_in_milliseconds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let err = local_transport()
            .post_json(
                OutboundRequest::post(format!("http://{addr}/?key=secret"), json!({}))
                    .with_timeout(Duration::from_millis(150)),
            )
            .await
            .expect_err("must time out");
        assert_eq!(err.0, "request timed out after 150ms");
        server.abort();
    }

    #[tokio::test]
    async fn invalid_header_is_rejected_before_sending() {
        let err = local_transport()
            .post_json(
                OutboundRequest::post("http://127.0.0.1:9", json!({})).header("Bad Name", "x"),
            )
            .await
            .expect_err("must fail");
        assert!(err.0.contains("invalid header name"));
    }
}
