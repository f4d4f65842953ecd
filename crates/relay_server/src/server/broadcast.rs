#![forbid(unsafe_code)]

use relay_domain::strip_local_id;
use relay_protocol::Frame;
use tracing::{debug, warn};

use crate::server::registry::Registry;

/// Process one inbound frame from `sender_id` and fan it out.
///
/// Text frames are re-stamped: the client-local id prefix is dropped and a
/// relay-minted id takes its place, so every recipient sees the same
/// authoritative id. Image and audio frames are relayed verbatim. The
/// sender is a recipient like any other.
pub async fn handle_frame(registry: &Registry, sender_id: u64, frame: Frame) {
	metrics::counter!("relay_server_frames_in_total").increment(1);

	let outbound = match frame {
		Frame::Text(payload) => {
			let id = registry.next_message_id();
			let stamped = format!("{id};{}", strip_local_id(&payload));
			debug!(conn_id = sender_id, %id, "text frame re-stamped");
			Frame::Text(stamped)
		}
		binary => binary,
	};

	broadcast(registry, &outbound).await;
}

/// Send `frame` to every registered endpoint.
///
/// A failed send never aborts the fan-out: the failing endpoint is logged,
/// dropped from the registry, and the remaining endpoints still receive
/// the frame.
pub async fn broadcast(registry: &Registry, frame: &Frame) {
	for (conn_id, conn) in registry.snapshot() {
		if let Err(err) = conn.send(frame).await {
			metrics::counter!("relay_server_broadcast_failures_total").increment(1);
			warn!(conn_id, peer = %conn.peer_addr(), error = %err, "dropping endpoint after failed send");
			registry.remove(conn_id);
		}
	}
}
