use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use relay_protocol::{
	DEFAULT_MAX_FRAME_SIZE, Frame, decode_frame, encode_frame_default, try_decode_frame_from_buffer,
};

fn frame_strategy() -> impl Strategy<Value = Frame> {
	prop_oneof![
		prop::collection::vec(any::<char>(), 0..256).prop_map(|chars| Frame::Text(chars.into_iter().collect())),
		prop::collection::vec(any::<u8>(), 0..4096).prop_map(|bytes| Frame::Image(Bytes::from(bytes))),
		prop::collection::vec(any::<u8>(), 0..4096).prop_map(|bytes| Frame::Audio(Bytes::from(bytes))),
	]
}

proptest! {
	#[test]
	fn roundtrip_all_variants(frame in frame_strategy()) {
		let encoded = encode_frame_default(&frame).expect("encode");
		let (decoded, used) = decode_frame(&encoded, DEFAULT_MAX_FRAME_SIZE).expect("decode");

		prop_assert_eq!(used, encoded.len());
		prop_assert_eq!(decoded, frame);
	}

	/// Feeding a frame through the buffer decoder in arbitrary short chunks
	/// must yield the same frame as feeding it whole.
	#[test]
	fn chunked_feed_matches_whole_frame(
		frame in frame_strategy(),
		chunk_sizes in prop::collection::vec(1usize..7, 1..64),
	) {
		let encoded = encode_frame_default(&frame).expect("encode");

		let mut buf = BytesMut::new();
		let mut decoded = Vec::new();
		let mut offset = 0;
		let mut chunk_iter = chunk_sizes.iter().cycle();

		while offset < encoded.len() {
			let chunk = (*chunk_iter.next().expect("cycled")).min(encoded.len() - offset);
			buf.extend_from_slice(&encoded[offset..offset + chunk]);
			offset += chunk;

			while let Some(frame) = try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE).expect("decode") {
				decoded.push(frame);
			}
		}

		prop_assert_eq!(decoded, vec![frame]);
		prop_assert!(buf.is_empty());
	}

	/// Back-to-back frames in one buffer come out in order with no residue.
	#[test]
	fn pipelined_frames_decode_in_order(frames in prop::collection::vec(frame_strategy(), 1..8)) {
		let mut buf = BytesMut::new();
		for frame in &frames {
			buf.extend_from_slice(&encode_frame_default(frame).expect("encode"));
		}

		let mut decoded = Vec::new();
		while let Some(frame) = try_decode_frame_from_buffer(&mut buf, DEFAULT_MAX_FRAME_SIZE).expect("decode") {
			decoded.push(frame);
		}

		prop_assert_eq!(decoded, frames);
		prop_assert!(buf.is_empty());
	}
}
