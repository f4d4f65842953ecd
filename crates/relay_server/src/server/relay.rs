#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use relay_protocol::DEFAULT_MAX_FRAME_SIZE;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::server::connection::serve_connection;
use crate::server::registry::Registry;

/// Settings for a relay instance.
#[derive(Debug, Clone)]
pub struct RelaySettings {
	pub max_frame_bytes: usize,
}

impl Default for RelaySettings {
	fn default() -> Self {
		Self {
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
		}
	}
}

/// The central relay: one listener, one endpoint registry, one task per
/// client.
pub struct Relay {
	listener: TcpListener,
	local_addr: SocketAddr,
	registry: Arc<Registry>,
	settings: RelaySettings,
}

impl Relay {
	pub async fn bind(addr: SocketAddr, settings: RelaySettings) -> std::io::Result<Self> {
		let listener = TcpListener::bind(addr).await?;
		let local_addr = listener.local_addr()?;
		info!(%local_addr, "relay listening");

		Ok(Self {
			listener,
			local_addr,
			registry: Arc::new(Registry::new()),
			settings,
		})
	}

	/// The bound address, useful when binding port 0.
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	pub fn registry(&self) -> Arc<Registry> {
		Arc::clone(&self.registry)
	}

	/// Accept clients until `shutdown` flips to true.
	///
	/// Each accepted client gets its own task; in-flight connections are
	/// aborted when the loop exits.
	pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
		let mut tasks = JoinSet::new();
		let mut next_conn_id: u64 = 1;

		loop {
			tokio::select! {
				accepted = self.listener.accept() => {
					let (stream, remote) = match accepted {
						Ok(accepted) => accepted,
						Err(err) => {
							warn!(error = %err, "accept failed");
							continue;
						}
					};

					let conn_id = next_conn_id;
					next_conn_id += 1;
					metrics::counter!("relay_server_connections_total").increment(1);
					info!(conn_id, %remote, "accepted connection");

					let registry = Arc::clone(&self.registry);
					let max_frame_bytes = self.settings.max_frame_bytes;
					tasks.spawn(serve_connection(conn_id, stream, registry, max_frame_bytes));

					// Reap finished connection tasks without blocking accept.
					while tasks.try_join_next().is_some() {}
				}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}
			}
		}

		info!(active = tasks.len(), "relay shutting down");
		tasks.shutdown().await;
		Ok(())
	}
}
