//! Stream registry and per-stream fragment reassembly buffers.
use crate::frame::Payload;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;

/// Lookup table of live streams, partitioned by the parity of their stream ID.
///
/// Streams whose ID is odd were initiated locally by a client-role peer; streams whose ID is
/// even were initiated locally by a server-role peer. Splitting the table this way means a
/// lookup never has to reason about who opened a given stream: the caller already knows which
/// half it wants based on whether it is looking up a stream it created or one its peer did.
pub(crate) struct StreamRegistry<T> {
    odd: DashMap<u32, T>,
    even: DashMap<u32, T>,
}

impl<T> StreamRegistry<T> {
    /// Creates an empty registry.
    pub(crate) fn new() -> Self {
        StreamRegistry { odd: DashMap::new(), even: DashMap::new() }
    }

    fn table(&self, stream_id: u32) -> &DashMap<u32, T> {
        if stream_id % 2 == 0 {
            &self.even
        } else {
            &self.odd
        }
    }

    /// Inserts `value` under `stream_id`, returning any value previously stored there.
    pub(crate) fn add(&self, stream_id: u32, value: T) -> Option<T> {
        self.table(stream_id).insert(stream_id, value)
    }

    /// Removes and returns the value stored under `stream_id`, if any.
    pub(crate) fn remove(&self, stream_id: u32) -> Option<T> {
        self.table(stream_id).remove(&stream_id).map(|(_, v)| v)
    }

    /// Returns true if `stream_id` is present in the registry.
    pub(crate) fn contains(&self, stream_id: u32) -> bool {
        self.table(stream_id).contains_key(&stream_id)
    }

    /// Returns the total number of live streams across both partitions.
    pub(crate) fn size(&self) -> usize {
        self.odd.len() + self.even.len()
    }

    /// Returns true if no streams are registered.
    pub(crate) fn is_empty(&self) -> bool {
        self.odd.is_empty() && self.even.is_empty()
    }
}

impl<T: Clone> StreamRegistry<T> {
    /// Returns a clone of the value stored under `stream_id`, if any.
    pub(crate) fn get(&self, stream_id: u32) -> Option<T> {
        self.table(stream_id).get(&stream_id).map(|v| v.clone())
    }
}

impl<T> Default for StreamRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates the metadata/data of a fragmented request or payload chain until the fragment
/// without `FOLLOWS` arrives.
///
/// Metadata accumulates in its entirety first; only once a fragment stops carrying `FOLLOWS`
/// metadata is data collection considered complete. This mirrors the order fragments are
/// produced in: [`crate::frame::fragment`] exhausts metadata before it ever touches data, so
/// reassembly exhausts it in the same order.
#[derive(Debug, Default)]
pub(crate) struct FollowsBuffer {
    metadata: BytesMut,
    data: BytesMut,
    has_metadata: bool,
}

impl FollowsBuffer {
    /// Creates an empty reassembly buffer.
    pub(crate) fn new() -> Self {
        FollowsBuffer::default()
    }

    /// Appends one more fragment's worth of metadata/data into the buffer.
    pub(crate) fn push(&mut self, metadata: Option<&Bytes>, data: Option<&Bytes>) {
        if let Some(metadata) = metadata {
            self.has_metadata = true;
            self.metadata.extend_from_slice(metadata);
        }
        if let Some(data) = data {
            self.data.extend_from_slice(data);
        }
    }

    /// Consumes the buffer, returning the reassembled logical payload.
    pub(crate) fn finish(self) -> Payload {
        let metadata =
            if self.has_metadata { Some(self.metadata.freeze()) } else { None };
        let data = if self.data.is_empty() && !self.has_metadata {
            None
        } else if self.data.is_empty() {
            None
        } else {
            Some(self.data.freeze())
        };
        Payload::new(metadata, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_by_parity() {
        let reg: StreamRegistry<&'static str> = StreamRegistry::new();
        reg.add(1, "client-initiated");
        reg.add(2, "server-initiated");
        assert_eq!(reg.size(), 2);
        assert_eq!(reg.get(1), Some("client-initiated"));
        assert_eq!(reg.get(2), Some("server-initiated"));
        assert!(reg.contains(1));
        assert!(reg.remove(1).is_some());
        assert!(!reg.contains(1));
        assert_eq!(reg.size(), 1);
    }

    #[test]
    fn empty_registry() {
        let reg: StreamRegistry<()> = StreamRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.get(4), None);
    }

    #[test]
    fn reassembles_metadata_then_data_in_order() {
        let mut buf = FollowsBuffer::new();
        buf.push(Some(&Bytes::from("met")), Some(&Bytes::from("da")));
        buf.push(Some(&Bytes::from("adata")), Some(&Bytes::from("ta")));
        let payload = buf.finish();
        assert_eq!(payload.metadata().unwrap(), &Bytes::from("metadata"));
        assert_eq!(payload.data().unwrap(), &Bytes::from("data"));
    }

    #[test]
    fn reassembly_with_no_metadata() {
        let mut buf = FollowsBuffer::new();
        buf.push(None, Some(&Bytes::from("chunk1")));
        buf.push(None, Some(&Bytes::from("chunk2")));
        let payload = buf.finish();
        assert!(payload.metadata().is_none());
        assert_eq!(payload.data().unwrap(), &Bytes::from("chunk1chunk2"));
    }
}
