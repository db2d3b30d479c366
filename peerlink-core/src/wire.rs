//! Wire codec: compact JSON payload, framed as 4 bytes LE length + payload.

use crate::protocol::Message;

pub const LEN_SIZE: usize = 4;
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Encode a message as a newline-free UTF-8 JSON object.
pub fn encode(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    // serde_json writes non-finite floats as null, which would not decode.
    if !msg.timestamp.is_finite() {
        return Err(EncodeError::NonFiniteTimestamp);
    }
    Ok(serde_json::to_vec(msg)?)
}

/// Decode a JSON payload produced by [`encode`].
pub fn decode(payload: &[u8]) -> Result<Message, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Encode a message into a single frame: 4 bytes LE length + JSON payload.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    let payload = encode(msg)?;
    let len = payload.len() as u32;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(EncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Error encoding a message (JSON, non-finite timestamp, or size limit).
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timestamp is not a finite number")]
    NonFiniteTimestamp,
    #[error("frame too large")]
    TooLarge,
}

/// Malformed JSON payload.
#[derive(Debug, thiserror::Error)]
#[error("decode error: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Decode one frame from the front of `bytes`. Returns the message and the number of bytes consumed.
/// Call with partial buffer; returns NeedMore if not enough bytes (caller should try again after more data).
pub fn decode_frame(bytes: &[u8]) -> Result<(Message, usize), FrameDecodeError> {
    let len = frame_len(bytes)?;
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let msg = decode(&bytes[LEN_SIZE..LEN_SIZE + len])?;
    Ok((msg, LEN_SIZE + len))
}

/// Payload length declared by the frame header at the front of `bytes`.
pub fn frame_len(bytes: &[u8]) -> Result<usize, FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge);
    }
    Ok(len as usize)
}

/// Error decoding a frame (need more bytes, too large, or bad payload).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Data;
    use serde_json::json;

    fn sample(event: &str) -> Message {
        let data = json!({
            "caller": "pc-1",
            "retries": 3,
            "ratio": 0.1 + 0.2,
            "nested": {"list": [1, "two", null, true]},
            "text": "line one\nline two",
        });
        let Some(data) = data.as_object().cloned() else {
            panic!("object literal");
        };
        Message::with_timestamp(event, data, 1_729_260_000.123_456_7)
    }

    #[test]
    fn roundtrip_preserves_all_fields() {
        let msg = sample("call_start");
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn payload_is_newline_free_json() {
        let bytes = encode(&sample("ready")).unwrap();
        assert!(!bytes.contains(&b'\n'));
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["event"], "ready");
        assert!(v["data"].is_object());
        assert!(v["timestamp"].is_f64());
    }

    #[test]
    fn timestamp_exact() {
        for ts in [0.0, 1.5, 1_700_000_000.000_001, f64::MIN_POSITIVE, 0.1 + 0.7] {
            let msg = Message::with_timestamp("t", Data::new(), ts);
            let back = decode(&encode(&msg).unwrap()).unwrap();
            assert_eq!(back.timestamp.to_bits(), ts.to_bits());
        }
    }

    #[test]
    fn non_finite_timestamp_rejected() {
        let msg = Message::with_timestamp("t", Data::new(), f64::NAN);
        assert!(matches!(encode(&msg), Err(EncodeError::NonFiniteTimestamp)));
    }

    #[test]
    fn malformed_payloads() {
        assert!(decode(b"").is_err());
        assert!(decode(b"{not json").is_err());
        assert!(decode(&[0xff, 0xfe, 0x00]).is_err());
        assert!(decode(br#"{"data": {}, "timestamp": 1.0}"#).is_err());
        assert!(decode(br#"{"event": "x", "data": {}}"#).is_err());
        assert!(decode(br#"{"event": "x", "data": [1], "timestamp": 1.0}"#).is_err());
        assert!(decode(br#"{"event": 5, "data": {}, "timestamp": 1.0}"#).is_err());
    }

    #[test]
    fn partial_read_need_more() {
        let frame = encode_frame(&sample("ready")).unwrap();
        assert!(matches!(
            decode_frame(&frame[..2]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..LEN_SIZE]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..frame.len() - 1]),
            Err(FrameDecodeError::NeedMore)
        ));
    }

    #[test]
    fn multiple_messages() {
        let a = sample("call_start");
        let b = sample("call_answer");
        let fa = encode_frame(&a).unwrap();
        let fb = encode_frame(&b).unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&fa);
        buf.extend_from_slice(&fb);
        let (m1, n1) = decode_frame(&buf).unwrap();
        assert_eq!(n1, fa.len());
        let (m2, n2) = decode_frame(&buf[n1..]).unwrap();
        assert_eq!(n2, fb.len());
        assert_eq!(m1, a);
        assert_eq!(m2, b);
    }

    #[test]
    fn oversized_header_rejected() {
        let mut buf = (MAX_FRAME_LEN + 1).to_le_bytes().to_vec();
        buf.extend_from_slice(b"{}");
        assert!(matches!(
            decode_frame(&buf),
            Err(FrameDecodeError::TooLarge)
        ));
    }

    #[test]
    fn bad_payload_in_complete_frame() {
        let payload = b"[1,2,3]";
        let mut buf = (payload.len() as u32).to_le_bytes().to_vec();
        buf.extend_from_slice(payload);
        assert!(matches!(
            decode_frame(&buf),
            Err(FrameDecodeError::Decode(_))
        ));
    }
}
