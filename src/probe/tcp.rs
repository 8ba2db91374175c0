//! TCP handshake reachability

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{ProbeError, ProbeTarget, Reachability, TimeoutUnit};

/// Treats a completed TCP handshake on the node's port as alive
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnect;

impl TcpConnect {
    pub fn new() -> Self {
        Self
    }
}

/// Strip the brackets from a literal IPv6 address
pub(crate) fn bare_host(address: &str) -> &str {
    address
        .strip_prefix('[')
        .and_then(|a| a.strip_suffix(']'))
        .unwrap_or(address)
}

#[async_trait]
impl Reachability for TcpConnect {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn timeout_unit(&self) -> TimeoutUnit {
        TimeoutUnit::Millis
    }

    async fn check(&self, target: &ProbeTarget, timeout_ms: u64) -> Result<Option<Duration>, ProbeError> {
        let port = target
            .port
            .ok_or_else(|| ProbeError::MissingPort(target.address.clone()))?;

        let started = Instant::now();
        match timeout(
            Duration::from_millis(timeout_ms),
            TcpStream::connect((bare_host(&target.address), port)),
        )
        .await
        {
            Ok(Ok(_stream)) => Ok(Some(started.elapsed())),
            Ok(Err(e)) => Err(ProbeError::Connect(e.to_string())),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_bare_host() {
        assert_eq!(bare_host("[2001:db8::1]"), "2001:db8::1");
        assert_eq!(bare_host("1.1.1.1"), "1.1.1.1");
        assert_eq!(bare_host("[broken"), "[broken");
    }

    #[tokio::test]
    async fn test_tcp_connect_alive_on_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = TcpConnect::new()
            .check(&ProbeTarget::new("127.0.0.1", Some(port)), 1000)
            .await
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_tcp_connect_refused_is_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TcpConnect::new()
            .check(&ProbeTarget::new("127.0.0.1", Some(port)), 1000)
            .await;
        assert!(matches!(result, Err(ProbeError::Connect(_))));
    }

    #[tokio::test]
    async fn test_tcp_connect_requires_port() {
        let result = TcpConnect::new()
            .check(&ProbeTarget::new("127.0.0.1", None), 1000)
            .await;
        assert!(matches!(result, Err(ProbeError::MissingPort(_))));
    }
}
