//! Fragmentation of oversized frames into FOLLOWS-chained pieces the wire format can carry.
use super::codec::{
    PayloadFrame, RequestChannelFrame, RequestFnfFrame, RequestResponseFrame,
    RequestStreamFrame,
};
use super::{Encode, Flags, Frame, Payload};
use bytes::Bytes;

/// Bytes every fragment pays regardless of content: stream ID (4) + type/flags (2) + the
/// metadata length prefix (3), which this codec always writes whether or not metadata is
/// actually attached to the frame.
const BASE_OVERHEAD: usize = 9;

/// Extra bytes REQUEST_STREAM/REQUEST_CHANNEL spend on `initial_request_n` ahead of
/// metadata/data, paid only by the head fragment (subsequent fragments are always PAYLOAD).
const INITIAL_N_OVERHEAD: usize = 4;

#[derive(Clone, Copy)]
enum Kind {
    RequestResponse,
    RequestFnf,
    RequestStream { initial_request_n: u32 },
    RequestChannel { initial_request_n: u32 },
    Payload,
}

struct Origin {
    stream_id: u32,
    kind: Kind,
    /// Whether the chain's final fragment should carry COMPLETE.
    complete: bool,
    /// Whether the chain's final fragment should carry NEXT.
    next: bool,
}

/// Splits `frame` into a FOLLOWS-chained sequence of frames, none of which exceeds `max` bytes
/// once encoded, or returns `None` if `frame` already fits within `max`.
///
/// The head fragment keeps the original frame's type (with `initial_request_n` intact for
/// REQUEST_STREAM/REQUEST_CHANNEL); every fragment after it is a PAYLOAD frame. Metadata is
/// exhausted before data is ever touched — the head fragment contains only metadata if metadata
/// alone overruns its budget — matching the order [`FollowsBuffer`] expects on reassembly.
///
/// [`FollowsBuffer`]: crate::connection::FollowsBuffer
pub fn fragment(frame: &Frame, max: usize) -> Option<Vec<Frame>> {
    if frame.len() <= max {
        return None;
    }

    let (origin, payload) = match frame {
        Frame::RequestResponse(f) => (
            Origin {
                stream_id: f.stream_id(),
                kind: Kind::RequestResponse,
                complete: true,
                next: true,
            },
            f.clone().payload(),
        ),
        Frame::RequestFnf(f) => (
            Origin {
                stream_id: f.stream_id(),
                kind: Kind::RequestFnf,
                complete: true,
                next: true,
            },
            f.clone().payload(),
        ),
        Frame::RequestStream(f) => (
            Origin {
                stream_id: f.stream_id(),
                kind: Kind::RequestStream { initial_request_n: f.initial_request_n() },
                complete: true,
                next: true,
            },
            f.clone().payload(),
        ),
        Frame::RequestChannel(f) => (
            Origin {
                stream_id: f.stream_id(),
                kind: Kind::RequestChannel { initial_request_n: f.initial_request_n() },
                complete: f.is_complete(),
                next: true,
            },
            f.clone().payload(),
        ),
        Frame::Payload(f) => (
            Origin {
                stream_id: f.stream_id(),
                kind: Kind::Payload,
                complete: f.is_complete(),
                next: f.is_next(),
            },
            f.clone().payload(),
        ),
        _ => return None,
    };

    let head_overhead = BASE_OVERHEAD
        + match origin.kind {
            Kind::RequestStream { .. } | Kind::RequestChannel { .. } => INITIAL_N_OVERHEAD,
            _ => 0,
        };

    let (metadata, data) = payload.split();
    let mut metadata = metadata.unwrap_or_default();
    let mut data = data.unwrap_or_default();

    let mut frames = Vec::new();
    let mut first = true;
    loop {
        let overhead = if first { head_overhead } else { BASE_OVERHEAD };
        let budget = max.saturating_sub(overhead);
        let (md, d) = take_budget(&mut metadata, &mut data, budget);
        let is_last = metadata.is_empty() && data.is_empty();
        let follows = !is_last;
        let fragment_payload = Payload::new(md, d);

        if first {
            frames.push(build_head(&origin, follows, fragment_payload));
            first = false;
        } else {
            let mut flags = Flags::empty();
            if follows {
                flags |= Flags::FOLLOWS;
            }
            if is_last {
                if origin.complete {
                    flags |= Flags::COMPLETE;
                }
                if origin.next {
                    flags |= Flags::NEXT;
                }
            }
            frames.push(Frame::Payload(PayloadFrame::new(
                origin.stream_id,
                flags,
                fragment_payload,
            )));
        }

        if is_last {
            break;
        }
    }

    Some(frames)
}

fn build_head(origin: &Origin, follows: bool, payload: Payload) -> Frame {
    match origin.kind {
        Kind::RequestResponse => Frame::RequestResponse(RequestResponseFrame::new(
            origin.stream_id,
            follows,
            payload,
        )),
        Kind::RequestFnf => {
            Frame::RequestFnf(RequestFnfFrame::new(origin.stream_id, follows, payload))
        }
        Kind::RequestStream { initial_request_n } => {
            Frame::RequestStream(RequestStreamFrame::new(
                origin.stream_id,
                follows,
                initial_request_n,
                payload,
            ))
        }
        Kind::RequestChannel { initial_request_n } => {
            // The head's own COMPLETE bit means "the channel is closed immediately"; that is
            // carried by the chain's last fragment instead (see `origin.complete`), never here.
            Frame::RequestChannel(RequestChannelFrame::new(
                origin.stream_id,
                follows,
                false,
                initial_request_n,
                payload,
            ))
        }
        Kind::Payload => {
            let mut flags = Flags::empty();
            if follows {
                flags |= Flags::FOLLOWS;
            }
            Frame::Payload(PayloadFrame::new(origin.stream_id, flags, payload))
        }
    }
}

/// Fills `metadata` first, then `data`, up to `budget` total bytes, draining whichever bytes it
/// takes from the caller's buffers.
fn take_budget(
    metadata: &mut Bytes,
    data: &mut Bytes,
    budget: usize,
) -> (Option<Bytes>, Option<Bytes>) {
    if metadata.len() > budget {
        let md = metadata.split_to(budget);
        return (Some(md), None);
    }

    let md_len = metadata.len();
    let md = if md_len == 0 { None } else { Some(metadata.split_to(md_len)) };

    let remaining_budget = budget - md_len;
    let data_len = data.len().min(remaining_budget);
    let d = if data_len == 0 { None } else { Some(data.split_to(data_len)) };

    (md, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_within_max_returns_none() {
        let frame = Frame::RequestResponse(RequestResponseFrame::new(
            1,
            false,
            Payload::builder().set_data("small").build(),
        ));
        assert!(fragment(&frame, 1024).is_none());
    }

    #[test]
    fn request_channel_large_payload_reassembles_byte_for_byte() {
        let metadata = Bytes::from(vec![7u8; 1024 * 1024]);
        let data = Bytes::from(vec![9u8; 1024 * 1024]);

        const FRAME_HEADER_LEN: usize = 6;
        let max = 1024 + FRAME_HEADER_LEN + 3;

        let original = RequestChannelFrame::new(
            12345,
            false,
            true,
            7,
            Payload::builder()
                .set_metadata(metadata.clone())
                .set_data(data.clone())
                .build(),
        );
        let frame = Frame::RequestChannel(original.clone());

        let fragments = fragment(&frame, max).expect("should fragment");

        // Every non-terminal fragment must fill exactly to `max` once encoded; only the last
        // fragment may be shorter.
        for (i, f) in fragments.iter().enumerate() {
            if i != fragments.len() - 1 {
                assert_eq!(f.len(), max, "fragment {} not filled to max", i);
            } else {
                assert!(f.len() <= max);
            }
        }

        let mut reassembled_metadata = Vec::new();
        let mut reassembled_data = Vec::new();
        let last = fragments.len() - 1;
        for (i, f) in fragments.iter().enumerate() {
            match f {
                Frame::RequestChannel(rc) => {
                    assert_eq!(i, 0);
                    assert!(rc.is_follows());
                    assert!(!rc.is_complete());
                    if let Some(m) = rc.metadata() {
                        reassembled_metadata.extend_from_slice(m);
                    }
                    if let Some(d) = rc.data() {
                        reassembled_data.extend_from_slice(d);
                    }
                }
                Frame::Payload(p) => {
                    assert_eq!(i == last, !p.is_follows());
                    assert_eq!(i == last, p.is_complete());
                    assert_eq!(i == last, p.is_next());
                    if let Some(m) = p.metadata() {
                        reassembled_metadata.extend_from_slice(m);
                    }
                    if let Some(d) = p.data() {
                        reassembled_data.extend_from_slice(d);
                    }
                }
                _ => panic!("unexpected frame kind in fragment chain"),
            }
        }

        assert_eq!(reassembled_metadata, metadata.to_vec());
        assert_eq!(reassembled_data, data.to_vec());
    }

    #[test]
    fn fragments_round_trip_through_wire_encoding() {
        let metadata = Bytes::from(vec![1u8; 4096]);
        let data = Bytes::from(vec![2u8; 4096]);
        let frame = Frame::RequestResponse(RequestResponseFrame::new(
            1,
            false,
            Payload::builder()
                .set_metadata(metadata)
                .set_data(data)
                .build(),
        ));

        let fragments = fragment(&frame, 256).expect("should fragment");
        assert!(fragments.len() > 1);

        for f in &fragments {
            let mut buf = bytes::BytesMut::new();
            f.encode(&mut buf);
            let encoded_len = buf.len();
            let mut bytes = buf.freeze();
            let decoded = Frame::decode(&mut bytes).expect("fragment must decode");
            assert_eq!(decoded.len(), encoded_len);
        }
    }
}
