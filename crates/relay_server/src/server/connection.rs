#![forbid(unsafe_code)]

use std::sync::Arc;

use relay_protocol::Connection;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::server::broadcast::handle_frame;
use crate::server::registry::Registry;

/// Drive one client connection to completion.
///
/// The endpoint is registered for fan-out before the first frame is read
/// and unregistered on every exit path, including mid-frame EOF and
/// transport errors.
pub async fn serve_connection(conn_id: u64, stream: TcpStream, registry: Arc<Registry>, max_frame_bytes: usize) {
	let (conn, mut reader) = match Connection::from_stream(stream, max_frame_bytes) {
		Ok(split) => split,
		Err(err) => {
			warn!(conn_id, error = %err, "failed to set up connection");
			return;
		}
	};

	let peer = conn.peer_addr();
	registry.insert(conn_id, conn);
	metrics::gauge!("relay_server_active_connections").increment(1.0);
	info!(conn_id, %peer, clients = registry.len(), "client connected");

	loop {
		match reader.next_frame().await {
			Ok(Some(frame)) => handle_frame(&registry, conn_id, frame).await,
			Ok(None) => {
				debug!(conn_id, %peer, "client closed the stream");
				break;
			}
			Err(err) => {
				warn!(conn_id, %peer, error = %err, "connection failed");
				break;
			}
		}
	}

	registry.remove(conn_id);
	metrics::gauge!("relay_server_active_connections").decrement(1.0);
	info!(conn_id, %peer, clients = registry.len(), "client disconnected");
}
