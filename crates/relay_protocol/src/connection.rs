#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::framing::{Frame, FramingError, encode_frame, try_decode_frame_from_buffer};

/// Errors for a live connection endpoint.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error(transparent)]
	Framing(#[from] FramingError),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	/// The peer closed the stream in the middle of a frame.
	#[error("stream closed mid-frame with {have} buffered bytes")]
	TruncatedFrame {
		have: usize,
	},
}

/// Send half of a connection endpoint.
///
/// Wraps one connected socket's write half. `send` serializes the frame and
/// writes it under an internal mutex, so concurrent senders never interleave
/// the bytes of two frames.
#[derive(Debug)]
pub struct Connection {
	write: Mutex<OwnedWriteHalf>,
	peer: SocketAddr,
	max_frame_bytes: usize,
}

impl Connection {
	/// Split an already-connected stream into a shared send half and the
	/// read loop that the owning task drives.
	pub fn from_stream(stream: TcpStream, max_frame_bytes: usize) -> std::io::Result<(Arc<Self>, FrameReader)> {
		let peer = stream.peer_addr()?;
		let (read, write) = stream.into_split();

		let conn = Arc::new(Self {
			write: Mutex::new(write),
			peer,
			max_frame_bytes,
		});
		let reader = FrameReader {
			read,
			buf: BytesMut::with_capacity(16 * 1024),
			peer,
			max_frame_bytes,
		};

		Ok((conn, reader))
	}

	/// Serialize and write one frame.
	pub async fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
		let bytes = encode_frame(frame, self.max_frame_bytes)?;

		let mut write = self.write.lock().await;
		write.write_all(&bytes).await?;
		write.flush().await?;

		debug!(peer = %self.peer, kind = frame.kind_name(), len = frame.payload_len(), "frame sent");
		Ok(())
	}

	pub fn peer_addr(&self) -> SocketAddr {
		self.peer
	}
}

/// Receive half of a connection endpoint.
///
/// Owned by exactly one task; frames are decoded in arrival order and
/// handed out one at a time.
#[derive(Debug)]
pub struct FrameReader {
	read: OwnedReadHalf,
	buf: BytesMut,
	peer: SocketAddr,
	max_frame_bytes: usize,
}

impl FrameReader {
	/// Await the next complete frame.
	///
	/// Short reads accumulate until the frame is whole. Returns `Ok(None)`
	/// on a clean EOF between frames; an EOF mid-frame is an error.
	pub async fn next_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
		let mut tmp = [0u8; 8192];

		loop {
			if let Some(frame) = try_decode_frame_from_buffer(&mut self.buf, self.max_frame_bytes)? {
				return Ok(Some(frame));
			}

			let n = self.read.read(&mut tmp).await?;
			if n == 0 {
				if self.buf.is_empty() {
					return Ok(None);
				}
				return Err(ConnectionError::TruncatedFrame { have: self.buf.len() });
			}
			self.buf.extend_from_slice(&tmp[..n]);
		}
	}

	/// Run the receive loop until EOF or failure.
	///
	/// Each frame is passed to `on_frame` synchronously before the next one
	/// is decoded, preserving strict per-connection receive order.
	pub async fn run<F>(mut self, mut on_frame: F) -> Result<(), ConnectionError>
	where
		F: FnMut(Frame),
	{
		while let Some(frame) = self.next_frame().await? {
			on_frame(frame);
		}
		debug!(peer = %self.peer, "stream closed");
		Ok(())
	}

	pub fn peer_addr(&self) -> SocketAddr {
		self.peer
	}
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;
	use tokio::io::AsyncWriteExt as _;
	use tokio::net::TcpListener;

	use super::*;
	use crate::framing::DEFAULT_MAX_FRAME_SIZE;

	async fn connected_pair() -> (TcpStream, TcpStream) {
		let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
		let addr = listener.local_addr().expect("local addr");

		let client = TcpStream::connect(addr).await.expect("connect");
		let (server, _) = listener.accept().await.expect("accept");
		(client, server)
	}

	#[tokio::test]
	async fn send_and_receive_one_frame() {
		let (a, b) = connected_pair().await;
		let (tx, _rx_a) = Connection::from_stream(a, DEFAULT_MAX_FRAME_SIZE).expect("split a");
		let (_tx_b, mut rx) = Connection::from_stream(b, DEFAULT_MAX_FRAME_SIZE).expect("split b");

		tx.send(&Frame::Text("1;alice: hi".to_string())).await.expect("send");

		let got = rx.next_frame().await.expect("recv").expect("frame");
		assert_eq!(got, Frame::Text("1;alice: hi".to_string()));
	}

	#[tokio::test]
	async fn large_binary_frame_survives_many_short_reads() {
		let (a, b) = connected_pair().await;
		let payload = Bytes::from((0..50_000u32).map(|i| (i % 251) as u8).collect::<Vec<u8>>());

		let (tx, _rx_a) = Connection::from_stream(a, DEFAULT_MAX_FRAME_SIZE).expect("split a");
		let (_tx_b, mut rx) = Connection::from_stream(b, DEFAULT_MAX_FRAME_SIZE).expect("split b");

		let expected = payload.clone();
		let send_task = tokio::spawn(async move { tx.send(&Frame::Audio(payload)).await });

		let got = rx.next_frame().await.expect("recv").expect("frame");
		match got {
			Frame::Audio(bytes) => {
				assert_eq!(bytes.len(), 50_000);
				assert_eq!(bytes, expected);
			}
			other => panic!("expected Audio, got {other:?}"),
		}

		send_task.await.expect("join").expect("send");
	}

	#[tokio::test]
	async fn clean_eof_ends_the_run_loop() {
		let (a, b) = connected_pair().await;
		let (tx, _rx_a) = Connection::from_stream(a, DEFAULT_MAX_FRAME_SIZE).expect("split a");
		let (_tx_b, rx) = Connection::from_stream(b, DEFAULT_MAX_FRAME_SIZE).expect("split b");

		tx.send(&Frame::Text("1;alice: bye".to_string())).await.expect("send");
		drop(tx);
		drop(_rx_a);

		let mut seen = Vec::new();
		rx.run(|frame| seen.push(frame)).await.expect("run ends cleanly");

		assert_eq!(seen, vec![Frame::Text("1;alice: bye".to_string())]);
	}

	#[tokio::test]
	async fn eof_mid_frame_is_an_error() {
		let (mut a, b) = connected_pair().await;
		let (_tx_b, mut rx) = Connection::from_stream(b, DEFAULT_MAX_FRAME_SIZE).expect("split b");

		// Kind tag plus a length promising more bytes than will ever come.
		a.write_all(&2u32.to_be_bytes()).await.expect("write kind");
		a.write_all(&100u32.to_be_bytes()).await.expect("write len");
		a.write_all(&[0u8; 10]).await.expect("write partial");
		drop(a);

		let err = rx.next_frame().await.unwrap_err();
		assert!(matches!(err, ConnectionError::TruncatedFrame { .. }));
	}
}
