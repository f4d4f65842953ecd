#![forbid(unsafe_code)]

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Default maximum frame payload size.
///
/// Image and audio payloads travel as single frames, so the ceiling is
/// generous; it exists to stop a bad length prefix from forcing an
/// arbitrary allocation.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Wire kind tags.
pub const KIND_TEXT: u32 = 0;
pub const KIND_IMAGE: u32 = 1;
pub const KIND_AUDIO: u32 = 2;

/// One message unit on the wire.
///
/// Layout, big-endian throughout: a `u32` kind tag, then for text a
/// `u16` length prefix and UTF-8 bytes, for image/audio a `u32` length
/// prefix and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	Text(String),
	Image(Bytes),
	Audio(Bytes),
}

impl Frame {
	/// Wire kind tag for this variant.
	pub fn kind(&self) -> u32 {
		match self {
			Frame::Text(_) => KIND_TEXT,
			Frame::Image(_) => KIND_IMAGE,
			Frame::Audio(_) => KIND_AUDIO,
		}
	}

	/// Short name for logs.
	pub fn kind_name(&self) -> &'static str {
		match self {
			Frame::Text(_) => "text",
			Frame::Image(_) => "image",
			Frame::Audio(_) => "audio",
		}
	}

	/// Payload length in bytes.
	pub fn payload_len(&self) -> usize {
		match self {
			Frame::Text(s) => s.len(),
			Frame::Image(b) | Frame::Audio(b) => b.len(),
		}
	}
}

#[derive(Debug, Error)]
pub enum FramingError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},

	#[error("insufficient data: need={need} have={have}")]
	InsufficientData {
		need: usize,
		have: usize,
	},

	#[error("unknown frame kind tag: {kind}")]
	UnknownKind {
		kind: u32,
	},

	#[error("text payload is not valid UTF-8")]
	InvalidUtf8,
}

/// Maximum text payload length imposed by the `u16` prefix.
const TEXT_MAX: usize = u16::MAX as usize;

fn check_len(frame: &Frame, max_frame_size: usize) -> Result<usize, FramingError> {
	let len = frame.payload_len();
	let cap = match frame {
		Frame::Text(_) => max_frame_size.min(TEXT_MAX),
		_ => max_frame_size,
	};
	if len > cap {
		return Err(FramingError::FrameTooLarge { len, max: cap });
	}
	Ok(len)
}

/// Encode a frame into a standalone byte vector.
pub fn encode_frame(frame: &Frame, max_frame_size: usize) -> Result<Vec<u8>, FramingError> {
	let len = check_len(frame, max_frame_size)?;

	let mut out = Vec::with_capacity(4 + 4 + len);
	out.extend_from_slice(&frame.kind().to_be_bytes());
	match frame {
		Frame::Text(s) => {
			out.extend_from_slice(&(len as u16).to_be_bytes());
			out.extend_from_slice(s.as_bytes());
		}
		Frame::Image(b) | Frame::Audio(b) => {
			out.extend_from_slice(&(len as u32).to_be_bytes());
			out.extend_from_slice(b);
		}
	}
	Ok(out)
}

/// Encode a frame using `DEFAULT_MAX_FRAME_SIZE`.
pub fn encode_frame_default(frame: &Frame) -> Result<Vec<u8>, FramingError> {
	encode_frame(frame, DEFAULT_MAX_FRAME_SIZE)
}

/// Append an encoded frame into the provided buffer.
pub fn encode_frame_into(buf: &mut BytesMut, frame: &Frame, max_frame_size: usize) -> Result<(), FramingError> {
	let len = check_len(frame, max_frame_size)?;

	match frame {
		Frame::Text(s) => {
			buf.reserve(4 + 2 + len);
			buf.put_u32(KIND_TEXT);
			buf.put_u16(len as u16);
			buf.extend_from_slice(s.as_bytes());
		}
		Frame::Image(b) | Frame::Audio(b) => {
			buf.reserve(4 + 4 + len);
			buf.put_u32(frame.kind());
			buf.put_u32(len as u32);
			buf.extend_from_slice(b);
		}
	}
	Ok(())
}

/// Decode a single frame from the start of `src`.
///
/// Returns the frame and the number of bytes consumed. A slice holding less
/// than one full frame yields `InsufficientData`; a short read is never a
/// decode fault, callers accumulate and retry.
pub fn decode_frame(src: &[u8], max_frame_size: usize) -> Result<(Frame, usize), FramingError> {
	if src.len() < 4 {
		return Err(FramingError::InsufficientData {
			need: 4,
			have: src.len(),
		});
	}

	let kind = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
	match kind {
		KIND_TEXT => {
			if src.len() < 6 {
				return Err(FramingError::InsufficientData {
					need: 6,
					have: src.len(),
				});
			}
			let len = u16::from_be_bytes([src[4], src[5]]) as usize;
			let need = 6 + len;
			if src.len() < need {
				return Err(FramingError::InsufficientData { need, have: src.len() });
			}
			let text = std::str::from_utf8(&src[6..need]).map_err(|_| FramingError::InvalidUtf8)?;
			Ok((Frame::Text(text.to_string()), need))
		}
		KIND_IMAGE | KIND_AUDIO => {
			if src.len() < 8 {
				return Err(FramingError::InsufficientData {
					need: 8,
					have: src.len(),
				});
			}
			let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
			if len > max_frame_size {
				return Err(FramingError::FrameTooLarge {
					len,
					max: max_frame_size,
				});
			}
			let need = 8 + len;
			if src.len() < need {
				return Err(FramingError::InsufficientData { need, have: src.len() });
			}
			let payload = Bytes::copy_from_slice(&src[8..need]);
			let frame = if kind == KIND_IMAGE {
				Frame::Image(payload)
			} else {
				Frame::Audio(payload)
			};
			Ok((frame, need))
		}
		other => Err(FramingError::UnknownKind { kind: other }),
	}
}

/// Try to decode a single frame from a growable buffer.
///
/// Consumes the frame's bytes on success; returns `Ok(None)` when the
/// buffer does not yet hold a complete frame.
pub fn try_decode_frame_from_buffer(
	buf: &mut BytesMut,
	max_frame_size: usize,
) -> Result<Option<Frame>, FramingError> {
	match decode_frame(buf, max_frame_size) {
		Ok((frame, used)) => {
			let _ = buf.split_to(used);
			Ok(Some(frame))
		}
		Err(FramingError::InsufficientData { .. }) => Ok(None),
		Err(e) => Err(e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encode_decode_roundtrip_all_kinds() {
		let frames = [
			Frame::Text("1;alice: hello".to_string()),
			Frame::Text(String::new()),
			Frame::Image(Bytes::from_static(b"\x89PNG\r\n")),
			Frame::Image(Bytes::new()),
			Frame::Audio(Bytes::from(vec![0u8; 1024])),
			Frame::Audio(Bytes::new()),
		];

		for frame in frames {
			let encoded = encode_frame_default(&frame).expect("encode");
			let (decoded, used) = decode_frame(&encoded, DEFAULT_MAX_FRAME_SIZE).expect("decode");
			assert_eq!(used, encoded.len());
			assert_eq!(decoded, frame);
		}
	}

	#[test]
	fn decode_requires_full_frame() {
		let frame = Frame::Audio(Bytes::from(vec![7u8; 64]));
		let encoded = encode_frame_default(&frame).expect("encode");

		for cut in [0, 3, 4, 7, 8, encoded.len() - 1] {
			let err = decode_frame(&encoded[..cut], DEFAULT_MAX_FRAME_SIZE).unwrap_err();
			match err {
				FramingError::InsufficientData { need, have } => assert!(need > have),
				other => panic!("unexpected error: {other:?}"),
			}
		}
	}

	#[test]
	fn try_decode_from_buffer_incremental() {
		let frame = Frame::Text("2;bob: hi".to_string());
		let encoded = encode_frame_default(&frame).expect("encode");

		let mut buf = BytesMut::new();

		buf.extend_from_slice(&encoded[..3]);
		assert!(
			try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE)
				.expect("ok")
				.is_none()
		);

		buf.extend_from_slice(&encoded[3..7]);
		assert!(
			try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE)
				.expect("ok")
				.is_none()
		);

		buf.extend_from_slice(&encoded[7..]);
		let decoded = try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE)
			.expect("ok")
			.expect("some");
		assert_eq!(decoded, frame);
		assert!(buf.is_empty());
	}

	#[test]
	fn unknown_kind_is_a_decode_error() {
		let mut buf = BytesMut::new();
		buf.put_u32(9);
		buf.put_u32(0);

		let err = try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
		match err {
			FramingError::UnknownKind { kind } => assert_eq!(kind, 9),
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn binary_decode_rejects_oversized_length_prefix() {
		let mut buf = BytesMut::new();
		buf.put_u32(KIND_AUDIO);
		buf.put_u32(DEFAULT_MAX_FRAME_SIZE as u32 + 1);

		let err = try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
		match err {
			FramingError::FrameTooLarge { .. } => {}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn encode_rejects_too_large() {
		let frame = Frame::Image(Bytes::from(vec![0u8; 64]));
		let err = encode_frame(&frame, 32).unwrap_err();
		match err {
			FramingError::FrameTooLarge { len, max } => {
				assert_eq!(len, 64);
				assert_eq!(max, 32);
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn text_decode_rejects_invalid_utf8() {
		let mut buf = BytesMut::new();
		buf.put_u32(KIND_TEXT);
		buf.put_u16(2);
		buf.extend_from_slice(&[0xff, 0xfe]);

		let err = try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
		assert!(matches!(err, FramingError::InvalidUtf8));
	}

	#[test]
	fn multiple_frames_in_one_buffer_decode_in_order() {
		let a = Frame::Text("1;alice: one".to_string());
		let b = Frame::Image(Bytes::from_static(b"img"));

		let mut buf = BytesMut::new();
		encode_frame_into(&mut buf, &a, DEFAULT_MAX_FRAME_SIZE).expect("encode a");
		encode_frame_into(&mut buf, &b, DEFAULT_MAX_FRAME_SIZE).expect("encode b");

		let first = try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE)
			.expect("ok")
			.expect("some");
		let second = try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE)
			.expect("ok")
			.expect("some");

		assert_eq!(first, a);
		assert_eq!(second, b);
		assert!(buf.is_empty());
	}
}
