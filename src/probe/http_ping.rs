//! Reachability delegated to an HTTP ping service
//!
//! The service answers `GET /ping?server=<addr>&timeout=<ms>` with a plain
//! text latency in milliseconds, `0` meaning the host did not reply.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::HOST;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use super::{ProbeError, ProbeTarget, Reachability, TimeoutUnit};

#[derive(Debug, Clone)]
pub struct HttpPing {
    base: Url,
}

impl HttpPing {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// Full request URL for one target
    pub fn ping_url(&self, address: &str, timeout_ms: u64) -> Result<Url, url::ParseError> {
        let mut url = self.base.join("ping")?;
        url.query_pairs_mut()
            .clear()
            .append_pair("server", address)
            .append_pair("timeout", &timeout_ms.to_string());
        Ok(url)
    }

    async fn fetch(&self, url: &Url) -> anyhow::Result<Bytes> {
        if url.scheme() != "http" {
            anyhow::bail!("unsupported ping service scheme: {}", url.scheme());
        }
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("ping service URL has no host"))?;
        let port = url.port_or_known_default().unwrap_or(80);

        let stream = TcpStream::connect((host, port)).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Ping service connection ended: {}", e);
            }
        });

        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let authority = match url.port() {
            Some(p) => format!("{}:{}", host, p),
            None => host.to_string(),
        };
        let request = Request::get(path)
            .header(HOST, authority)
            .body(Empty::<Bytes>::new())?;

        let response = sender.send_request(request).await?;
        if !response.status().is_success() {
            anyhow::bail!("ping service returned {}", response.status());
        }
        Ok(response.into_body().collect().await?.to_bytes())
    }
}

/// Interpret a ping service body: positive latency is alive, `0` is not
pub(crate) fn parse_service_body(body: &[u8]) -> Result<Option<Duration>, ProbeError> {
    let text = String::from_utf8_lossy(body);
    let latency: u64 = text
        .trim()
        .parse()
        .map_err(|_| ProbeError::Service(format!("unexpected body `{}`", text.trim())))?;

    Ok((latency > 0).then(|| Duration::from_millis(latency)))
}

#[async_trait]
impl Reachability for HttpPing {
    fn name(&self) -> &'static str {
        "http"
    }

    fn timeout_unit(&self) -> TimeoutUnit {
        TimeoutUnit::Millis
    }

    async fn check(&self, target: &ProbeTarget, timeout_ms: u64) -> Result<Option<Duration>, ProbeError> {
        let url = self
            .ping_url(&target.address, timeout_ms)
            .map_err(|e| ProbeError::Service(e.to_string()))?;
        let body = self
            .fetch(&url)
            .await
            .map_err(|e| ProbeError::Service(e.to_string()))?;
        parse_service_body(&body)
    }
}
