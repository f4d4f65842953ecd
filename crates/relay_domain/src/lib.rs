#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Message identifier.
///
/// The relay mints the authoritative sequence; each client keeps a separate
/// local sequence for optimistic echo. Both live in the same `u32` space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u32);

impl MessageId {
	pub const fn as_u32(self) -> u32 {
		self.0
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for MessageId {
	type Err = PayloadError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(PayloadError::Empty);
		}
		s.parse::<u32>()
			.map(MessageId)
			.map_err(|_| PayloadError::InvalidId(s.to_string()))
	}
}

/// Errors for parsing text payloads.
///
/// These are application-level format errors: the session displays a
/// placeholder and keeps the connection alive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
	#[error("empty payload")]
	Empty,
	#[error("invalid message id: {0}")]
	InvalidId(String),
	#[error("missing field: {0}")]
	MissingField(&'static str),
}

/// Parsed body of a text frame.
///
/// On the wire both forms are a single `;`-separated string:
/// `"<id>;<sender>: <text>"` for a plain message and
/// `"<id>;<replyToId>;<text>"` for a reply. The forms are distinguished by
/// field count: a reply has a second `;`-separated field that parses as a
/// decimal id, plus a third field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPayload {
	Message {
		id: MessageId,
		sender: String,
		body: String,
	},
	Reply {
		id: MessageId,
		reply_to: MessageId,
		body: String,
	},
}

impl TextPayload {
	/// Parse a wire text payload.
	pub fn parse(s: &str) -> Result<Self, PayloadError> {
		let s = s.trim();
		if s.is_empty() {
			return Err(PayloadError::Empty);
		}

		let (id_s, rest) = s.split_once(';').ok_or(PayloadError::MissingField("body"))?;
		let id: MessageId = id_s.parse()?;

		// Reply form iff a second `;` appears before any `": "`.
		let is_reply = match (rest.find(';'), rest.find(": ")) {
			(Some(semi), Some(colon)) => semi < colon,
			(Some(_), None) => true,
			_ => false,
		};

		if is_reply {
			let (reply_s, body) = rest.split_once(';').ok_or(PayloadError::MissingField("body"))?;
			let reply_to: MessageId = reply_s.parse()?;
			return Ok(TextPayload::Reply {
				id,
				reply_to,
				body: body.to_string(),
			});
		}

		let (sender, body) = rest
			.split_once(": ")
			.ok_or(PayloadError::MissingField("sender"))?;

		Ok(TextPayload::Message {
			id,
			sender: sender.to_string(),
			body: body.to_string(),
		})
	}

	/// Format back to the wire string.
	pub fn wire_format(&self) -> String {
		match self {
			TextPayload::Message { id, sender, body } => format!("{id};{sender}: {body}"),
			TextPayload::Reply { id, reply_to, body } => format!("{id};{reply_to};{body}"),
		}
	}

	/// The id carried in the leading field.
	pub fn id(&self) -> MessageId {
		match self {
			TextPayload::Message { id, .. } | TextPayload::Reply { id, .. } => *id,
		}
	}
}

/// Strip a leading `"<id>;"` prefix from a wire payload.
///
/// Used by the relay when re-stamping: the client-local id is dropped and
/// the relay-minted id takes its place. A payload with no `;` is returned
/// whole.
pub fn strip_local_id(payload: &str) -> &str {
	match payload.split_once(';') {
		Some((_, rest)) => rest,
		None => payload,
	}
}

/// Extract `@mention` tags from a message body.
///
/// A tag is `@` followed by one or more alphanumeric/underscore characters;
/// the returned slices exclude the `@`.
pub fn extract_tags(body: &str) -> Vec<&str> {
	let mut tags = Vec::new();
	let bytes = body.as_bytes();
	let mut i = 0;

	while i < bytes.len() {
		if bytes[i] == b'@' {
			let start = i + 1;
			let mut end = start;
			while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
				end += 1;
			}
			if end > start {
				tags.push(&body[start..end]);
			}
			i = end;
		} else {
			i += 1;
		}
	}

	tags
}
