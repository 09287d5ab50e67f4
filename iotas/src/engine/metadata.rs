//! The 8-byte `operation_id:u32 || parent_stream_id:u32` prefix every outbound request's
//! metadata carries ahead of the application's own metadata, and which the engine strips before
//! a handler (or a caller's response callback) ever sees a [`Payload`](crate::payload::Payload).
use crate::error::{self, Result};
use crate::payload::Payload;

use bytes::{Buf, BufMut, Bytes, BytesMut};

const PREFIX_LEN: usize = 8;

/// The decoded routing prefix of an inbound request frame, plus the payload it was stripped
/// from.
pub(super) struct Routed {
    pub(super) operation_id: u32,
    pub(super) parent_stream_id: u32,
    pub(super) payload: Payload,
}

/// Prepends the routing prefix to `payload`'s metadata, setting metadata present regardless of
/// whether the application attached any of its own.
pub(super) fn wrap(operation_id: u32, parent_stream_id: u32, payload: Payload) -> Payload {
    let (metadata, data) = payload.split();
    let app_metadata = metadata.unwrap_or_default();
    let mut buf = BytesMut::with_capacity(PREFIX_LEN + app_metadata.len());
    buf.put_u32(operation_id);
    buf.put_u32(parent_stream_id);
    buf.put_slice(&app_metadata);
    Payload::new(Some(buf.freeze()), data)
}

/// Strips the routing prefix from an inbound request's metadata, rejecting frames whose
/// metadata is missing or shorter than the prefix itself.
pub(super) fn unwrap(payload: Payload) -> Result<Routed> {
    let (metadata, data) = payload.split();
    let mut metadata = metadata.ok_or_else(|| error::invalid("request carries no metadata"))?;
    if metadata.len() < PREFIX_LEN {
        return Err(error::invalid("request metadata shorter than the routing prefix"));
    }
    let operation_id = metadata.get_u32();
    let parent_stream_id = metadata.get_u32();
    let app_metadata: Option<Bytes> =
        if metadata.has_remaining() { Some(metadata) } else { None };
    Ok(Routed { operation_id, parent_stream_id, payload: Payload::new(app_metadata, data) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_application_metadata() {
        let payload = Payload::builder()
            .set_metadata(Bytes::from("hi"))
            .set_data(Bytes::from("yo"))
            .build();
        let wrapped = wrap(7, 0, payload);
        let routed = unwrap(wrapped).unwrap();
        assert_eq!(routed.operation_id, 7);
        assert_eq!(routed.parent_stream_id, 0);
        assert_eq!(routed.payload.metadata().unwrap(), &Bytes::from("hi"));
        assert_eq!(routed.payload.data().unwrap(), &Bytes::from("yo"));
    }

    #[test]
    fn round_trips_with_no_application_metadata() {
        let payload = Payload::builder().set_data(Bytes::from("yo")).build();
        let wrapped = wrap(3, 0, payload);
        let routed = unwrap(wrapped).unwrap();
        assert_eq!(routed.operation_id, 3);
        assert!(routed.payload.metadata().is_none());
    }

    #[test]
    fn rejects_missing_metadata() {
        let payload = Payload::builder().set_data(Bytes::from("yo")).build();
        assert!(unwrap(payload).is_err());
    }

    #[test]
    fn rejects_truncated_metadata() {
        let payload = Payload::builder().set_metadata(Bytes::from("ab")).build();
        assert!(unwrap(payload).is_err());
    }
}
