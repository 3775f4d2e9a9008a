//! Multipart wire framing shared by both endpoints.
//!
//! ```text
//! frame   := u32 body_len | body
//! body    := segment*
//! segment := u32 seg_len | seg_len bytes
//! ```
//!
//! All integers are big-endian. A frame is decoded only once all of its
//! bytes are buffered, so a frame is handed to the bus whole or not at all.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const LENGTH_FIELD_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("frame of {len} bytes exceeds limit of {limit}")]
    FrameTooLarge { len: usize, limit: usize },

    #[error("segment header truncated at offset {0}")]
    TruncatedSegmentHeader(usize),

    #[error("segment of {len} bytes overruns frame body at offset {offset}")]
    SegmentOverrun { offset: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum FrameEncodeError {
    #[error("segment too large: {0} bytes")]
    SegmentTooLarge(usize),
}

/// Encodes `segments` as one frame appended to `dst`.
#[inline]
pub fn encode_frame<S: AsRef<[u8]>>(
    segments: &[S],
    dst: &mut BytesMut,
) -> Result<(), FrameEncodeError> {
    let mut body_len: usize = 0;
    for seg in segments {
        let len = seg.as_ref().len();
        if len > u32::MAX as usize {
            return Err(FrameEncodeError::SegmentTooLarge(len));
        }
        body_len = body_len
            .checked_add(LENGTH_FIELD_LEN + len)
            .ok_or(FrameEncodeError::SegmentTooLarge(len))?;
    }
    let body_len_u32 =
        u32::try_from(body_len).map_err(|_| FrameEncodeError::SegmentTooLarge(body_len))?;

    dst.reserve(LENGTH_FIELD_LEN + body_len);
    dst.put_u32(body_len_u32);
    for seg in segments {
        let seg = seg.as_ref();
        dst.put_u32(seg.len() as u32);
        dst.put_slice(seg);
    }
    Ok(())
}

/// Try to decode a single frame from the buffer.
///
/// Returns `Ok(None)` if there is not yet enough data for a full frame. A
/// declared body length above `max_frame_len` is rejected before any of the
/// body is buffered.
pub fn try_decode_frame(
    src: &mut BytesMut,
    max_frame_len: usize,
) -> Result<Option<Vec<Bytes>>, FrameDecodeError> {
    if src.len() < LENGTH_FIELD_LEN {
        return Ok(None);
    }

    let mut length_bytes = &src[..LENGTH_FIELD_LEN];
    let body_len = length_bytes.get_u32() as usize;

    if body_len > max_frame_len {
        return Err(FrameDecodeError::FrameTooLarge {
            len: body_len,
            limit: max_frame_len,
        });
    }

    if src.len() < LENGTH_FIELD_LEN + body_len {
        src.reserve(LENGTH_FIELD_LEN + body_len - src.len());
        return Ok(None);
    }

    src.advance(LENGTH_FIELD_LEN);
    let mut body = src.split_to(body_len).freeze();

    let mut segments = Vec::with_capacity(3);
    let mut offset = 0usize;
    while body.has_remaining() {
        if body.remaining() < LENGTH_FIELD_LEN {
            return Err(FrameDecodeError::TruncatedSegmentHeader(offset));
        }
        let seg_len = body.get_u32() as usize;
        offset += LENGTH_FIELD_LEN;
        if body.remaining() < seg_len {
            return Err(FrameDecodeError::SegmentOverrun {
                offset,
                len: seg_len,
            });
        }
        segments.push(body.split_to(seg_len));
        offset += seg_len;
    }

    Ok(Some(segments))
}
