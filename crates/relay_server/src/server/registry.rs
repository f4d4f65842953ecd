#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use relay_domain::MessageId;
use relay_protocol::Connection;

/// Shared state of the relay: the live endpoints plus the message id
/// counter.
///
/// One lock guards both so an id is minted and observed against a single
/// consistent view. The critical sections are short and never await.
#[derive(Debug, Default)]
pub struct Registry {
	inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
	conns: HashMap<u64, Arc<Connection>>,
	last_message_id: u32,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, conn_id: u64, conn: Arc<Connection>) {
		let mut inner = self.lock();
		inner.conns.insert(conn_id, conn);
	}

	/// Remove an endpoint. Safe to call twice for the same id; the second
	/// call is a no-op.
	pub fn remove(&self, conn_id: u64) -> bool {
		let mut inner = self.lock();
		inner.conns.remove(&conn_id).is_some()
	}

	/// Mint the next message id.
	///
	/// The counter advances even when no endpoints are registered, so ids
	/// stay strictly increasing across quiet periods.
	pub fn next_message_id(&self) -> MessageId {
		let mut inner = self.lock();
		inner.last_message_id = inner.last_message_id.wrapping_add(1);
		MessageId(inner.last_message_id)
	}

	/// A point-in-time copy of the live endpoints, for fan-out outside the
	/// lock.
	pub fn snapshot(&self) -> Vec<(u64, Arc<Connection>)> {
		let inner = self.lock();
		inner.conns.iter().map(|(id, conn)| (*id, Arc::clone(conn))).collect()
	}

	pub fn len(&self) -> usize {
		self.lock().conns.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
