#![forbid(unsafe_code)]

pub mod connection;
pub mod framing;

pub use connection::{Connection, ConnectionError, FrameReader};
pub use framing::{
	DEFAULT_MAX_FRAME_SIZE, Frame, FramingError, decode_frame, encode_frame, encode_frame_default, encode_frame_into,
	try_decode_frame_from_buffer,
};

/// Default relay listen port.
pub const DEFAULT_PORT: u16 = 8888;
