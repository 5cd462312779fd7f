//! Outbound connections to a backend's data port.

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::BoxConn;

// async_trait is required here because Dialer is shared as Arc<dyn Dialer>
// and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, addr: &str) -> std::io::Result<BoxConn>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> std::io::Result<BoxConn> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
