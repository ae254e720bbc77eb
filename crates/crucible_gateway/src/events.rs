//! Subscriber end of the event bus.
//!
//! Binds a SUB socket, subscribes to every frame, and routes each event
//! to the live hub by job id. Events for jobs with no attached viewer
//! are dropped - the registry is the durable record, and a missed event
//! is recoverable by polling `/status`.

use anyhow::Result;
use tracing::{info, warn};
use zeromq::{Socket, SocketRecv, SubSocket};

use crucible_protocol::EventMessage;

use crate::hub::LiveHub;
use crate::metrics::METRICS;

/// Read events until the socket fails. Run as a background task; the
/// durable path does not depend on it.
pub async fn run_event_loop(bind_addr: &str, hub: LiveHub) -> Result<()> {
    let mut socket = SubSocket::new();
    socket.bind(bind_addr).await?;
    socket.subscribe("").await?;
    info!("Event bus listening: {}", bind_addr);

    loop {
        let message = socket.recv().await?;
        for frame in message.into_vec() {
            dispatch(frame.as_ref(), &hub);
        }
    }
}

fn dispatch(frame: &[u8], hub: &LiveHub) {
    let event: EventMessage = match serde_json::from_slice(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!("Undecodable event frame ({} bytes): {}", frame.len(), e);
            return;
        }
    };
    METRICS.inc_events_received();

    // Forward the frame as-is; the hub payload is the wire body.
    let payload = String::from_utf8_lossy(frame);
    if hub.send(&event.job_id, &payload) {
        METRICS.inc_events_forwarded();
    } else {
        METRICS.inc_events_dropped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_protocol::{JobId, JobStatus};

    #[test]
    fn test_dispatch_routes_to_subscribed_viewer() {
        let hub = LiveHub::new();
        let id = JobId::new();
        let (_token, mut rx, _) = hub.subscribe(id.as_str());

        let event = EventMessage::new(&id, JobStatus::Completed, "hi\n");
        let frame = serde_json::to_vec(&event).unwrap();
        dispatch(&frame, &hub);

        let payload = rx.try_recv().unwrap();
        let back: EventMessage = serde_json::from_str(&payload).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_dispatch_drops_unsubscribed_and_garbage() {
        let hub = LiveHub::new();

        let event = EventMessage::new(&JobId::new(), JobStatus::Failed, "boom");
        let frame = serde_json::to_vec(&event).unwrap();
        dispatch(&frame, &hub); // no viewer: dropped silently

        dispatch(b"not json", &hub); // undecodable: logged, dropped
    }
}
