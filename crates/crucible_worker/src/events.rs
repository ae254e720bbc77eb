//! Event publishing: lifecycle transitions fanned out over ZeroMQ PUB.
//!
//! Best-effort by design. The publisher connects to every configured hub
//! address; PUB delivers a copy to each connected subscriber and drops
//! silently when nobody listens. Publish failures must never affect the
//! durable path - callers log and move on.

use anyhow::Result;
use tracing::info;
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

use crucible_protocol::EventMessage;

pub struct EventPublisher {
    socket: Option<PubSocket>,
}

impl EventPublisher {
    /// Connect to every hub address.
    pub async fn connect(addrs: &[String]) -> Result<Self> {
        let mut socket = PubSocket::new();
        for addr in addrs {
            socket.connect(addr).await?;
            info!("Event bus connected: {}", addr);
        }
        Ok(Self {
            socket: Some(socket),
        })
    }

    /// A publisher with no peers; every event is dropped. Used by tests
    /// and by deployments that rely on status polling alone.
    pub fn disconnected() -> Self {
        Self { socket: None }
    }

    pub async fn publish(&mut self, event: &EventMessage) -> Result<()> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(());
        };
        let body = serde_json::to_vec(event)?;
        socket.send(ZmqMessage::from(body)).await?;
        Ok(())
    }
}
