//! Framing: length-prefix (4 bytes LE) + bincode payload.

use crate::protocol::Frame;

pub const LEN_SIZE: usize = 4;
/// One dispatch must fit in a single frame.
pub const MAX_FRAME_LEN: u32 = 16 * 1024; // 16 KiB

/// Encode a frame: 4 bytes LE length + bincode payload.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(frame).map_err(FrameEncodeError::Encode)?;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge(payload.len()));
    }
    let len = payload.len() as u32;
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Error encoding a frame (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large: {0} bytes, limit is {MAX_FRAME_LEN}")]
    TooLarge(usize),
}

/// Payload length announced by a 4-byte prefix, checked against the limit.
pub fn payload_len(prefix: [u8; LEN_SIZE]) -> Result<usize, FrameDecodeError> {
    let len = u32::from_le_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge(len as usize));
    }
    Ok(len as usize)
}

/// Decode a payload whose length prefix was already consumed.
pub fn decode_payload(payload: &[u8]) -> Result<Frame, FrameDecodeError> {
    bincode::deserialize(payload).map_err(FrameDecodeError::Decode)
}

/// Decode one frame from the front of `bytes`. Returns the frame and the number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = payload_len([bytes[0], bytes[1], bytes[2], bytes[3]])?;
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let frame = decode_payload(&bytes[LEN_SIZE..LEN_SIZE + len])?;
    Ok((frame, LEN_SIZE + len))
}

/// Error decoding a frame (need more bytes, too large, or bincode failure).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large: {0} bytes, limit is {MAX_FRAME_LEN}")]
    TooLarge(usize),
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MessageLimits};
    use crate::dispatch::Dispatch;
    use crate::message::Message;
    use crate::party::{Party, PartyId, MAX_DISPLAY_NAME_CHARS};
    use crate::protocol::PROTOCOL_VERSION;
    use crate::role::Role;
    use chrono::Utc;

    fn hello() -> Frame {
        Frame::Hello {
            protocol_version: PROTOCOL_VERSION,
            role: Role::Client,
        }
    }

    #[test]
    fn roundtrip_hello() {
        let frame = encode_frame(&hello()).unwrap();
        let (decoded, n) = decode_frame(&frame).unwrap();
        assert_eq!(n, frame.len());
        assert!(matches!(
            decoded,
            Frame::Hello {
                protocol_version: PROTOCOL_VERSION,
                role: Role::Client
            }
        ));
    }

    #[test]
    fn partial_read_need_more() {
        let frame = encode_frame(&hello()).unwrap();
        assert!(matches!(
            decode_frame(&frame[..2]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..frame.len() - 1]),
            Err(FrameDecodeError::NeedMore)
        ));
    }

    #[test]
    fn oversized_prefix_rejected() {
        let prefix = (MAX_FRAME_LEN + 1).to_le_bytes();
        assert!(matches!(
            payload_len(prefix),
            Err(FrameDecodeError::TooLarge(_))
        ));
    }

    /// Worst case for the default limits: a full dispatch of maximum-length,
    /// 4-byte-per-char, encoded bodies still fits one frame.
    #[test]
    fn full_default_dispatch_fits_one_frame() {
        let cfg = Config::default();
        let limits = MessageLimits::default();
        let sender = Party::new(
            PartyId(u64::MAX),
            "\u{1F680}".repeat(MAX_DISPLAY_NAME_CHARS),
            true,
            cfg.dispatch_capacity,
        );
        let earth = Party::new(PartyId::EARTH, "Earth", false, cfg.dispatch_capacity);
        let mut dispatch = Dispatch::new(cfg.dispatch_capacity);
        for _ in 0..cfg.dispatch_capacity {
            let mut m = Message::create(
                sender.clone(),
                earth.clone(),
                "\u{1F680}".repeat(limits.subject_max_chars),
                "\u{1F680}".repeat(limits.body_max_chars),
                Utc::now(),
                &limits,
            )
            .unwrap();
            m.encode();
            assert!(dispatch.append_batch([m]));
        }
        let frame = encode_frame(&Frame::Dispatch {
            seq: u64::MAX,
            dispatch: dispatch.clone(),
        })
        .unwrap();
        assert!(frame.len() <= LEN_SIZE + MAX_FRAME_LEN as usize);
        let (decoded, _) = decode_frame(&frame).unwrap();
        match decoded {
            Frame::Dispatch { dispatch: d, .. } => assert_eq!(d, dispatch),
            other => panic!("expected Dispatch, got {other:?}"),
        }
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let a = encode_frame(&hello()).unwrap();
        let b = encode_frame(&Frame::Dispatch {
            seq: 0,
            dispatch: Dispatch::new(3),
        })
        .unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&a);
        buf.extend_from_slice(&b);
        let (f1, n1) = decode_frame(&buf).unwrap();
        assert_eq!(n1, a.len());
        let (f2, n2) = decode_frame(&buf[n1..]).unwrap();
        assert_eq!(n2, b.len());
        assert!(matches!(f1, Frame::Hello { .. }));
        assert!(matches!(f2, Frame::Dispatch { seq: 0, .. }));
    }
}
