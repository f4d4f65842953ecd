#![forbid(unsafe_code)]

//! Client-side session over the relay protocol.
//!
//! A [`Session`] is the send half: it stamps outgoing text with a
//! client-local id, formats the wire payloads, and tracks reply state.
//! [`SessionEvents`] is the receive half: it decodes incoming frames,
//! feeds the recency cache, and dispatches to a [`SessionHandler`].

mod cache;

pub use cache::{DEFAULT_CACHE_CAPACITY, MISSING_PREVIEW, RecencyCache};

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use relay_domain::{MessageId, PayloadError, TextPayload};
use relay_protocol::{Connection, ConnectionError, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT, Frame, FrameReader};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
	#[error("failed to connect to {addr}: {reason}")]
	Connect {
		addr: String,
		reason: String,
	},

	#[error(transparent)]
	Connection(#[from] ConnectionError),

	/// `send_reply` was called with no reply target armed.
	#[error("no reply target selected")]
	NoReplyTarget,

	#[error("text message too long: {len} bytes (max {max})")]
	TextTooLong {
		len: usize,
		max: usize,
	},
}

/// Connection settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
	pub server_host: String,
	pub server_port: u16,
	/// Bypasses DNS resolution of `server_host` when set.
	pub server_addr: Option<SocketAddr>,
	pub username: String,
	pub max_frame_bytes: usize,
	pub connect_timeout: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			server_host: "127.0.0.1".to_string(),
			server_port: DEFAULT_PORT,
			server_addr: None,
			username: "anonymous".to_string(),
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			connect_timeout: Duration::from_secs(10),
		}
	}
}

/// Callbacks for inbound traffic, invoked from [`SessionEvents::run`].
pub trait SessionHandler {
	fn on_text(&mut self, id: MessageId, sender: &str, body: &str);

	/// `reply_preview` is the cached snippet of the quoted message, or the
	/// placeholder when that message is unknown or evicted.
	fn on_reply(&mut self, id: MessageId, reply_to: MessageId, reply_preview: &str, body: &str);

	fn on_image(&mut self, bytes: &Bytes);

	fn on_audio(&mut self, bytes: &Bytes);

	/// A text frame that does not match either wire form. The session keeps
	/// running; by default the payload is logged and dropped.
	fn on_format_error(&mut self, raw: &str, error: &PayloadError) {
		warn!(%error, raw, "unparseable text payload");
	}

	/// Invoked exactly once, after the last frame, for both clean EOF and
	/// transport failure.
	fn on_disconnected(&mut self);
}

/// Source of a picked file's contents, in place of a GUI file dialog.
pub trait FilePicker {
	fn chosen_file(&mut self) -> std::io::Result<Vec<u8>>;
}

/// Source of recorded audio, delivered in chunks.
pub trait AudioCapture {
	/// Next chunk of captured audio; `None` ends the capture.
	fn next_chunk(&mut self) -> Option<Vec<u8>>;
}

/// Reply state armed by [`Session::begin_reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
	pub target: MessageId,
	pub preview: String,
}

struct Shared {
	cache: Mutex<RecencyCache>,
	connected: AtomicBool,
}

/// Send half of a client session. Cheap to share behind an `Arc`.
pub struct Session {
	conn: Arc<Connection>,
	username: String,
	next_local_id: AtomicU32,
	reply: Mutex<Option<ReplyTarget>>,
	shared: Arc<Shared>,
}

/// Receive half of a client session. Owned by the task driving the
/// dispatch loop.
pub struct SessionEvents {
	reader: FrameReader,
	shared: Arc<Shared>,
}

impl Session {
	/// Connect to the relay and split into send and receive halves.
	pub async fn connect(cfg: SessionConfig) -> Result<(Self, SessionEvents), ClientError> {
		let target = match cfg.server_addr {
			Some(addr) => addr.to_string(),
			None => format!("{}:{}", cfg.server_host, cfg.server_port),
		};

		let connect = async {
			match cfg.server_addr {
				Some(addr) => TcpStream::connect(addr).await,
				None => TcpStream::connect((cfg.server_host.as_str(), cfg.server_port)).await,
			}
		};
		let stream = match timeout(cfg.connect_timeout, connect).await {
			Ok(Ok(stream)) => stream,
			Ok(Err(err)) => {
				return Err(ClientError::Connect {
					addr: target,
					reason: err.to_string(),
				});
			}
			Err(_) => {
				return Err(ClientError::Connect {
					addr: target,
					reason: format!("timed out after {:?}", cfg.connect_timeout),
				});
			}
		};

		let (conn, reader) = Connection::from_stream(stream, cfg.max_frame_bytes).map_err(|err| ClientError::Connect {
			addr: target.clone(),
			reason: err.to_string(),
		})?;
		info!(addr = %conn.peer_addr(), user = %cfg.username, "session connected");

		let shared = Arc::new(Shared {
			cache: Mutex::new(RecencyCache::default()),
			connected: AtomicBool::new(true),
		});

		let session = Self {
			conn,
			username: cfg.username,
			next_local_id: AtomicU32::new(1),
			reply: Mutex::new(None),
			shared: Arc::clone(&shared),
		};
		let events = SessionEvents { reader, shared };

		Ok((session, events))
	}

	pub fn username(&self) -> &str {
		&self.username
	}

	/// False once the receive loop has observed EOF or a transport error.
	pub fn is_connected(&self) -> bool {
		self.shared.connected.load(Ordering::Acquire)
	}

	/// Send a plain message as `"<localId>;<username>: <body>"`.
	///
	/// Any armed reply target is cleared; sending a plain message always
	/// wins over a pending reply.
	pub async fn send_text(&self, body: &str) -> Result<MessageId, ClientError> {
		self.cancel_reply();

		let id = self.mint_local_id();
		let payload = format!("{id};{}: {body}", self.username);
		self.send_text_payload(payload).await?;
		Ok(id)
	}

	/// Send `body` as a reply to the armed target, clearing the target.
	pub async fn send_reply(&self, body: &str) -> Result<MessageId, ClientError> {
		let target = self
			.reply
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.take()
			.ok_or(ClientError::NoReplyTarget)?;

		let id = self.mint_local_id();
		let payload = format!("{id};{};{body}", target.target);
		self.send_text_payload(payload).await?;
		Ok(id)
	}

	/// Arm a reply to `target`, replacing any previously armed target.
	///
	/// The returned preview is the cached snippet of the target message, or
	/// a placeholder when it is unknown.
	pub fn begin_reply(&self, target: MessageId) -> ReplyTarget {
		let preview = self.preview(target);
		let armed = ReplyTarget { target, preview };

		let mut reply = self.reply.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		*reply = Some(armed.clone());
		armed
	}

	pub fn cancel_reply(&self) {
		let mut reply = self.reply.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		*reply = None;
	}

	pub fn reply_target(&self) -> Option<ReplyTarget> {
		self.reply
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
	}

	/// Cached snippet for `id`, or the placeholder when unknown.
	pub fn preview(&self, id: MessageId) -> String {
		self.shared
			.cache
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.preview(id)
	}

	pub async fn send_image(&self, bytes: Bytes) -> Result<(), ClientError> {
		debug!(len = bytes.len(), "sending image");
		self.conn.send(&Frame::Image(bytes)).await?;
		Ok(())
	}

	pub async fn send_audio(&self, bytes: Bytes) -> Result<(), ClientError> {
		debug!(len = bytes.len(), "sending audio");
		self.conn.send(&Frame::Audio(bytes)).await?;
		Ok(())
	}

	/// Read a picked file and send it as one image frame.
	pub async fn send_image_from(&self, picker: &mut dyn FilePicker) -> Result<(), ClientError> {
		let bytes = picker.chosen_file().map_err(ConnectionError::Io)?;
		self.send_image(Bytes::from(bytes)).await
	}

	/// Drain a capture to completion and send the whole recording as one
	/// audio frame.
	pub async fn send_audio_from(&self, capture: &mut dyn AudioCapture) -> Result<(), ClientError> {
		let mut recording = Vec::new();
		while let Some(chunk) = capture.next_chunk() {
			recording.extend_from_slice(&chunk);
		}
		self.send_audio(Bytes::from(recording)).await
	}

	fn mint_local_id(&self) -> MessageId {
		MessageId(self.next_local_id.fetch_add(1, Ordering::Relaxed))
	}

	async fn send_text_payload(&self, payload: String) -> Result<(), ClientError> {
		let len = payload.len();
		if len > u16::MAX as usize {
			return Err(ClientError::TextTooLong {
				len,
				max: u16::MAX as usize,
			});
		}
		self.conn.send(&Frame::Text(payload)).await?;
		Ok(())
	}
}

impl SessionEvents {
	/// Drive the receive loop until the server goes away.
	///
	/// Frames are dispatched to `handler` in arrival order. The handler's
	/// `on_disconnected` fires exactly once, whether the stream ended
	/// cleanly or failed; a transport failure is then returned.
	pub async fn run<H: SessionHandler>(mut self, handler: &mut H) -> Result<(), ClientError> {
		let result = loop {
			match self.reader.next_frame().await {
				Ok(Some(frame)) => self.dispatch(frame, handler),
				Ok(None) => break Ok(()),
				Err(err) => break Err(ClientError::Connection(err)),
			}
		};

		self.shared.connected.store(false, Ordering::Release);
		handler.on_disconnected();
		result
	}

	fn dispatch<H: SessionHandler>(&self, frame: Frame, handler: &mut H) {
		match frame {
			Frame::Text(raw) => match TextPayload::parse(&raw) {
				Ok(TextPayload::Message { id, sender, body }) => {
					self.cache_insert(id, format!("{sender}: {body}"));
					handler.on_text(id, &sender, &body);
				}
				Ok(TextPayload::Reply { id, reply_to, body }) => {
					let preview = self.cache_preview(reply_to);
					self.cache_insert(id, body.clone());
					handler.on_reply(id, reply_to, &preview, &body);
				}
				Err(err) => handler.on_format_error(&raw, &err),
			},
			Frame::Image(bytes) => handler.on_image(&bytes),
			Frame::Audio(bytes) => handler.on_audio(&bytes),
		}
	}

	fn cache_insert(&self, id: MessageId, body: String) {
		self.shared
			.cache
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.insert(id, body);
	}

	fn cache_preview(&self, id: MessageId) -> String {
		self.shared
			.cache
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.preview(id)
	}
}
