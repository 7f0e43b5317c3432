//! Multiplexed stdout/stderr framing for non-TTY exec sessions.
//!
//! When a session runs without a TTY, the service interleaves the remote
//! process's stdout and stderr on the one hijacked connection. Each frame is:
//!
//! ```text
//! +----------+----------+----------+----------+----------------------------+
//! | selector |  0x00    |  0x00    |  0x00    | payload length (u32, BE)   |
//! +----------+----------+----------+----------+----------------------------+
//! | payload bytes ...                                                     |
//! +-----------------------------------------------------------------------+
//! ```
//!
//! with selector `1` for stdout and `2` for stderr. [`StdStreamCodec`] decodes
//! and encodes this format for use with `tokio_util::codec::FramedRead`.
//!
//! Malformed input (an unknown selector, a payload length over the codec
//! limit, or a stream that stops mid-frame) ends the stream. Callers are
//! expected to treat [`FrameError::is_end_of_stream`] errors as a clean end.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Default upper bound on a single frame payload.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Destination stream named by a frame's selector byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
	Stdout,
	Stderr,
}

impl StreamKind {
	pub const fn from_selector(selector: u8) -> Option<Self> {
		match selector {
			1 => Some(StreamKind::Stdout),
			2 => Some(StreamKind::Stderr),
			_ => None,
		}
	}

	pub const fn selector(self) -> u8 {
		match self {
			StreamKind::Stdout => 1,
			StreamKind::Stderr => 2,
		}
	}
}

/// Decoded 8-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
	pub kind: StreamKind,
	pub len: u32,
}

impl FrameHeader {
	pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, FrameError> {
		let kind = StreamKind::from_selector(bytes[0]).ok_or(FrameError::UnknownStream(bytes[0]))?;
		let len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
		Ok(Self { kind, len })
	}

	pub fn encode(&self) -> [u8; HEADER_LEN] {
		let len = self.len.to_be_bytes();
		[self.kind.selector(), 0, 0, 0, len[0], len[1], len[2], len[3]]
	}
}

/// One demultiplexed chunk of remote output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdFrame {
	pub kind: StreamKind,
	pub payload: Bytes,
}

/// Errors produced while decoding the multiplexed stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
	/// Selector byte other than stdout/stderr.
	#[error("unknown stream selector {0}")]
	UnknownStream(u8),
	/// Declared payload length exceeds the codec limit.
	#[error("frame payload length {len} exceeds maximum {max}")]
	Oversized { len: u32, max: u32 },
	#[error("stream read failed: {0}")]
	Io(#[from] io::Error),
}

impl FrameError {
	/// Protocol violations end the stream; only I/O failures are real errors.
	pub fn is_end_of_stream(&self) -> bool {
		!matches!(self, FrameError::Io(_))
	}
}

/// Codec for the multiplexed stdout/stderr stream.
#[derive(Debug, Clone)]
pub struct StdStreamCodec {
	max_payload_len: u32,
}

impl StdStreamCodec {
	#[must_use]
	pub fn new() -> Self {
		Self {
			max_payload_len: MAX_PAYLOAD_LEN,
		}
	}

	/// Creates a codec that rejects payloads longer than `max_payload_len`.
	#[must_use]
	pub fn with_max_payload_len(max_payload_len: u32) -> Self {
		Self { max_payload_len }
	}
}

impl Default for StdStreamCodec {
	fn default() -> Self {
		Self::new()
	}
}

impl Decoder for StdStreamCodec {
	type Item = StdFrame;
	type Error = FrameError;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		if src.len() < HEADER_LEN {
			return Ok(None);
		}

		let mut header_bytes = [0u8; HEADER_LEN];
		header_bytes.copy_from_slice(&src[..HEADER_LEN]);
		let header = FrameHeader::decode(&header_bytes)?;

		if header.len > self.max_payload_len {
			return Err(FrameError::Oversized {
				len: header.len,
				max: self.max_payload_len,
			});
		}

		let total_len = HEADER_LEN + header.len as usize;
		if src.len() < total_len {
			src.reserve(total_len - src.len());
			return Ok(None);
		}

		src.advance(HEADER_LEN);
		let payload = src.split_to(header.len as usize).freeze();
		Ok(Some(StdFrame {
			kind: header.kind,
			payload,
		}))
	}

	fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		match self.decode(src)? {
			Some(frame) => Ok(Some(frame)),
			None => {
				// A short header or truncated payload at EOF is a clean end.
				src.clear();
				Ok(None)
			}
		}
	}
}

impl Encoder<(StreamKind, &[u8])> for StdStreamCodec {
	type Error = io::Error;

	fn encode(&mut self, (kind, payload): (StreamKind, &[u8]), dst: &mut BytesMut) -> Result<(), Self::Error> {
		let len = u32::try_from(payload.len())
			.ok()
			.filter(|len| *len <= self.max_payload_len)
			.ok_or_else(|| {
				io::Error::new(
					io::ErrorKind::InvalidInput,
					format!("payload length {} exceeds maximum {}", payload.len(), self.max_payload_len),
				)
			})?;

		dst.reserve(HEADER_LEN + payload.len());
		dst.put_slice(&FrameHeader { kind, len }.encode());
		dst.put_slice(payload);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures_util::StreamExt;
	use tokio_util::codec::FramedRead;

	fn encode_all(frames: &[(StreamKind, &[u8])]) -> BytesMut {
		let mut codec = StdStreamCodec::new();
		let mut buf = BytesMut::new();
		for (kind, payload) in frames {
			Encoder::<(StreamKind, &[u8])>::encode(&mut codec, (*kind, *payload), &mut buf).unwrap();
		}
		buf
	}

	#[test]
	fn header_layout_is_selector_padding_and_big_endian_length() {
		let header = FrameHeader {
			kind: StreamKind::Stderr,
			len: 0x0102_0304,
		};
		assert_eq!(header.encode(), [2, 0, 0, 0, 1, 2, 3, 4]);
		assert_eq!(FrameHeader::decode(&header.encode()).unwrap(), header);
	}

	#[test]
	fn decode_waits_for_complete_frame() {
		let mut codec = StdStreamCodec::new();
		let full = encode_all(&[(StreamKind::Stdout, b"hello")]);

		let mut partial = BytesMut::from(&full[..HEADER_LEN + 2]);
		assert!(codec.decode(&mut partial).unwrap().is_none());

		partial.extend_from_slice(&full[HEADER_LEN + 2..]);
		let frame = codec.decode(&mut partial).unwrap().unwrap();
		assert_eq!(frame, StdFrame {
				kind: StreamKind::Stdout,
				payload: Bytes::from_static(b"hello"),
			});
		assert!(partial.is_empty());
	}

	#[test]
	fn zero_length_frames_decode() {
		let mut codec = StdStreamCodec::new();
		let mut buf = encode_all(&[(StreamKind::Stderr, b"")]);
		let frame = codec.decode(&mut buf).unwrap().unwrap();
		assert_eq!(frame.kind, StreamKind::Stderr);
		assert!(frame.payload.is_empty());
	}

	#[test]
	fn unknown_selector_ends_stream() {
		let mut codec = StdStreamCodec::new();
		let mut buf = BytesMut::from(&[3u8, 0, 0, 0, 0, 0, 0, 1, b'x'][..]);
		let err = codec.decode(&mut buf).unwrap_err();
		assert!(matches!(err, FrameError::UnknownStream(3)));
		assert!(err.is_end_of_stream());
	}

	#[test]
	fn oversized_length_ends_stream() {
		let mut codec = StdStreamCodec::with_max_payload_len(4);
		let mut buf = BytesMut::from(&[1u8, 0, 0, 0, 0, 0, 0, 5][..]);
		let err = codec.decode(&mut buf).unwrap_err();
		assert!(matches!(err, FrameError::Oversized { len: 5, max: 4 }));
		assert!(err.is_end_of_stream());
	}

	#[test]
	fn truncated_tail_at_eof_is_clean_end() {
		let mut codec = StdStreamCodec::new();
		let mut buf = encode_all(&[(StreamKind::Stdout, b"whole")]);
		buf.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 9, b'p', b'a']);

		let first = codec.decode_eof(&mut buf).unwrap().unwrap();
		assert_eq!(first.payload.as_ref(), b"whole");
		assert!(codec.decode_eof(&mut buf).unwrap().is_none());
		assert!(buf.is_empty());
	}

	#[test]
	fn io_errors_are_not_end_of_stream() {
		let err = FrameError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
		assert!(!err.is_end_of_stream());
	}

	#[test]
	fn frame_errors_render_their_cause() {
		assert_eq!(FrameError::UnknownStream(7).to_string(), "unknown stream selector 7");
		assert_eq!(
			FrameError::Oversized { len: 9, max: 4 }.to_string(),
			"frame payload length 9 exceeds maximum 4"
		);
		let err = FrameError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
		assert_eq!(err.to_string(), "stream read failed: eof");
		assert!(std::error::Error::source(&err).is_some());
	}

	#[tokio::test]
	async fn framed_read_splits_interleaved_streams() {
		let bytes = encode_all(&[
			(StreamKind::Stdout, b"out-1 "),
			(StreamKind::Stderr, b"err-1 "),
			(StreamKind::Stdout, b"out-2"),
			(StreamKind::Stderr, b"err-2"),
		]);

		let mut framed = FramedRead::new(&bytes[..], StdStreamCodec::new());
		let mut stdout = Vec::new();
		let mut stderr = Vec::new();
		while let Some(frame) = framed.next().await {
			let frame = frame.unwrap();
			match frame.kind {
				StreamKind::Stdout => stdout.extend_from_slice(&frame.payload),
				StreamKind::Stderr => stderr.extend_from_slice(&frame.payload),
			}
		}

		assert_eq!(stdout, b"out-1 out-2");
		assert_eq!(stderr, b"err-1 err-2");
	}
}
