#![forbid(unsafe_code)]

use std::sync::Arc;

use relay_domain::MessageId;
use relay_protocol::{Connection, DEFAULT_MAX_FRAME_SIZE};
use tokio::net::{TcpListener, TcpStream};

use crate::server::registry::Registry;

async fn server_side_connection() -> (Arc<Connection>, TcpStream) {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
	let addr = listener.local_addr().expect("local addr");

	let client = TcpStream::connect(addr).await.expect("connect");
	let (accepted, _) = listener.accept().await.expect("accept");

	let (conn, _reader) = Connection::from_stream(accepted, DEFAULT_MAX_FRAME_SIZE).expect("split");
	(conn, client)
}

#[test]
fn message_ids_are_strictly_increasing() {
	let registry = Registry::new();

	let ids: Vec<MessageId> = (0..5).map(|_| registry.next_message_id()).collect();
	assert_eq!(
		ids,
		vec![MessageId(1), MessageId(2), MessageId(3), MessageId(4), MessageId(5)]
	);
}

#[test]
fn ids_are_minted_even_with_no_endpoints() {
	let registry = Registry::new();
	assert!(registry.is_empty());

	assert_eq!(registry.next_message_id(), MessageId(1));
	assert_eq!(registry.next_message_id(), MessageId(2));
}

#[tokio::test]
async fn remove_is_idempotent() {
	let registry = Registry::new();
	let (conn, _client) = server_side_connection().await;

	registry.insert(7, conn);
	assert_eq!(registry.len(), 1);

	assert!(registry.remove(7));
	assert!(!registry.remove(7));
	assert!(registry.is_empty());
}

#[tokio::test]
async fn snapshot_is_a_point_in_time_copy() {
	let registry = Registry::new();
	let (a, _ca) = server_side_connection().await;
	let (b, _cb) = server_side_connection().await;

	registry.insert(1, a);
	registry.insert(2, b);

	let snapshot = registry.snapshot();
	assert_eq!(snapshot.len(), 2);

	registry.remove(1);
	assert_eq!(snapshot.len(), 2, "snapshot must not track later removals");
	assert_eq!(registry.len(), 1);
}
