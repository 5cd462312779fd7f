//! HTTP transport for health polls.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;

use crate::error::SwitchboardError;
use crate::server::HttpClient;

/// Any HTTP answer from a status endpoint, whatever its status code.
#[derive(Debug, Clone)]
pub struct HealthReply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Fetches a status URL. An `Err` means no HTTP response arrived at all,
/// which is what lets the monitor fall through to the next URL.
#[async_trait]
pub trait HealthClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HealthReply, SwitchboardError>;
}

pub struct HttpHealthClient {
    client: HttpClient,
    timeout: Duration,
}

impl HttpHealthClient {
    #[must_use]
    pub fn new(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl HealthClient for HttpHealthClient {
    async fn get(&self, url: &str) -> Result<HealthReply, SwitchboardError> {
        let req = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri(url)
            .body(Full::new(Bytes::new()))
            .map_err(|e| SwitchboardError::UriParse {
                source: Box::new(e),
            })?;

        let response = match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(SwitchboardError::HttpRequest {
                    source: Box::new(e),
                })
            }
            Err(_) => {
                return Err(SwitchboardError::HttpTimeout {
                    url: url.to_string(),
                    timeout_ms: self.timeout.as_millis(),
                })
            }
        };

        let status = response.status();
        // The status line already arrived, so a broken body still counts as
        // an answer and decodes as unhealthy.
        let body = match tokio::time::timeout(self.timeout, response.into_body().collect()).await
        {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                tracing::debug!(url, error = %e, "failed to read health response body");
                Bytes::new()
            }
            Err(_) => {
                tracing::debug!(url, "timed out reading health response body");
                Bytes::new()
            }
        };

        Ok(HealthReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::model::GaleraAgentTls;
    use crate::server::build_http_client;

    fn client(timeout: Duration) -> HttpHealthClient {
        HttpHealthClient::new(build_http_client(&GaleraAgentTls::default()).unwrap(), timeout)
    }

    /// Answer one request with `response` verbatim, then hang up.
    async fn agent_replying(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
        format!("http://{addr}/api/v1/status")
    }

    #[tokio::test]
    async fn ok_reply_carries_the_body() {
        let url = agent_replying(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 38\r\nconnection: close\r\n\r\n{\"healthy\":true,\"wsrep_local_index\":1}",
        )
        .await;

        let reply = client(Duration::from_secs(2)).get(&url).await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.starts_with(br#"{"healthy":true"#));
    }

    #[tokio::test]
    async fn error_status_is_still_an_answer() {
        let url = agent_replying(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let reply = client(Duration::from_secs(2)).get(&url).await.unwrap();
        assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(reply.body.is_empty());
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(Duration::from_secs(2))
            .get(&format!("http://{addr}/api/v1/status"))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::HttpRequest { .. }), "{err}");
    }

    #[tokio::test]
    async fn silent_agent_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let held = tokio::spawn(async move {
            // accept and never answer
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let started = Instant::now();
        let err = client(Duration::from_millis(300))
            .get(&format!("http://{addr}/api/v1/status"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, SwitchboardError::HttpTimeout { timeout_ms: 300, .. }),
            "{err}"
        );
        assert!(started.elapsed() < Duration::from_secs(2));
        held.abort();
    }
}
