//! The operation table: the canonical list of operations a peer exports and imports, carried
//! in the `data` section of a SETUP frame so the other side can discover it.
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

const MAGIC: [u8; 4] = [0x00, b'w', b'r', b's'];
const VERSION: u16 = 1;

/// The four RSocket interaction modes an operation can be invoked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationType {
    /// Request-Response.
    RequestResponse = 0,
    /// Fire-and-Forget.
    FireAndForget = 1,
    /// Request-Stream.
    RequestStream = 2,
    /// Request-Channel.
    RequestChannel = 3,
}

impl OperationType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(OperationType::RequestResponse),
            1 => Ok(OperationType::FireAndForget),
            2 => Ok(OperationType::RequestStream),
            3 => Ok(OperationType::RequestChannel),
            _ => Err(unsupported_table_version()),
        }
    }
}

/// Whether an operation is one this peer exports (serves) or imports (calls on the peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// This peer serves the operation.
    Export = 0,
    /// This peer calls the operation on its remote.
    Import = 1,
}

impl Direction {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Direction::Export),
            1 => Ok(Direction::Import),
            _ => Err(unsupported_table_version()),
        }
    }
}

/// A single named, indexed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Dense index within the (type, direction) bucket this operation belongs to.
    pub index: u32,
    /// Interaction mode this operation is invoked under.
    pub r#type: OperationType,
    /// Whether this peer exports or imports the operation.
    pub direction: Direction,
    /// Logical grouping the operation is defined under, e.g. a service name.
    pub namespace: String,
    /// The operation's name within its namespace.
    pub name: String,
}

#[derive(Default)]
struct Bucket {
    by_name: HashMap<(String, String), u32>,
    entries: Vec<Operation>,
}

/// The canonical table of operations a peer exports and imports.
///
/// Indices are dense and allocated per `(type, direction)` bucket, starting at 0. `export`
/// always appends a new entry; `import` is idempotent and returns the existing index for a
/// `(namespace, name)` pair it has already seen.
#[derive(Default)]
pub struct Table {
    buckets: HashMap<(OperationType, Direction), Bucket>,
}

impl Table {
    /// Creates an empty table.
    pub fn new() -> Self {
        Table::default()
    }

    /// Registers an operation this peer serves, returning its dense index within its bucket.
    ///
    /// Unlike [`import`], every call appends a new entry, even for a name already registered.
    ///
    /// [`import`]: Table::import
    pub fn export(
        &mut self,
        r#type: OperationType,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> u32 {
        self.insert(r#type, Direction::Export, namespace.into(), name.into())
    }

    /// Like [`export`], but falls back to the given default namespace if `namespace` is empty.
    ///
    /// [`export`]: Table::export
    pub fn export_with_default_namespace(
        &mut self,
        r#type: OperationType,
        namespace: impl Into<String>,
        name: impl Into<String>,
        default_namespace: &str,
    ) -> u32 {
        let namespace = namespace.into();
        let namespace =
            if namespace.is_empty() { default_namespace.to_string() } else { namespace };
        self.insert(r#type, Direction::Export, namespace, name.into())
    }

    /// Registers an operation this peer intends to call on its remote.
    ///
    /// Idempotent: a second call with the same `(namespace, name)` returns the index assigned
    /// the first time.
    pub fn import(
        &mut self,
        r#type: OperationType,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> u32 {
        let namespace = namespace.into();
        let name = name.into();
        let key = (r#type, Direction::Import);
        if let Some(existing) = self
            .buckets
            .get(&key)
            .and_then(|b| b.by_name.get(&(namespace.clone(), name.clone())))
        {
            return *existing;
        }
        self.insert(r#type, Direction::Import, namespace, name)
    }

    fn insert(
        &mut self,
        r#type: OperationType,
        direction: Direction,
        namespace: String,
        name: String,
    ) -> u32 {
        let bucket = self.buckets.entry((r#type, direction)).or_default();
        let index = bucket.entries.len() as u32;
        bucket.by_name.insert((namespace.clone(), name.clone()), index);
        bucket.entries.push(Operation {
            index,
            r#type,
            direction,
            namespace,
            name,
        });
        index
    }

    /// Resolves the export index a peer's table assigned to `(type, namespace, name)`.
    ///
    /// Used after a SETUP exchange to bind a locally-registered import to the index the peer
    /// will expect on incoming request frames for that operation.
    pub fn export_index(
        &self,
        r#type: OperationType,
        namespace: &str,
        name: &str,
    ) -> Option<u32> {
        self.buckets
            .get(&(r#type, Direction::Export))
            .and_then(|b| b.by_name.get(&(namespace.to_string(), name.to_string())))
            .copied()
    }

    /// Looks up the operation registered at `index` within the `(type, direction)` bucket.
    pub fn lookup(
        &self,
        r#type: OperationType,
        direction: Direction,
        index: u32,
    ) -> Option<&Operation> {
        self.buckets
            .get(&(r#type, direction))
            .and_then(|b| b.entries.get(index as usize))
    }

    /// Returns every operation in the table, in no particular cross-bucket order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.buckets.values().flat_map(|b| b.entries.iter())
    }

    /// Serializes the table to its SETUP-carried binary form.
    ///
    /// Layout: magic `00 77 72 73`, `version: u16`, `count: u32`, then per-entry
    /// `type: u8, direction: u8, index: u32, namespace_len: u16 + bytes, name_len: u16 + bytes,
    /// reserved_len: u16 + bytes` (reserved is always empty on encode; decoders must skip it).
    pub fn serialize(&self) -> Bytes {
        let entries: Vec<&Operation> = self.iter().collect();
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u16(VERSION);
        buf.put_u32(entries.len() as u32);
        for op in entries {
            buf.put_u8(op.r#type as u8);
            buf.put_u8(op.direction as u8);
            buf.put_u32(op.index);
            buf.put_u16(op.namespace.len() as u16);
            buf.put_slice(op.namespace.as_bytes());
            buf.put_u16(op.name.len() as u16);
            buf.put_slice(op.name.as_bytes());
            // reserved_len, no reserved bytes written.
            buf.put_u16(0);
        }
        buf.freeze()
    }

    /// Parses a table from the bytes produced by [`serialize`].
    ///
    /// [`serialize`]: Table::serialize
    pub fn deserialize(mut bytes: Bytes) -> Result<Table> {
        if bytes.remaining() < 4 || bytes[..4] != MAGIC {
            return Err(invalid_magic());
        }
        bytes.advance(4);
        if bytes.remaining() < 2 {
            return Err(invalid_magic());
        }
        let version = bytes.get_u16();
        if version != VERSION {
            return Err(unsupported_table_version());
        }
        if bytes.remaining() < 4 {
            return Err(invalid_magic());
        }
        let count = bytes.get_u32();

        let mut table = Table::new();
        for _ in 0..count {
            if bytes.remaining() < 2 {
                return Err(invalid_magic());
            }
            let r#type = OperationType::from_u8(bytes.get_u8())?;
            let direction = Direction::from_u8(bytes.get_u8())?;
            if bytes.remaining() < 4 {
                return Err(invalid_magic());
            }
            let index = bytes.get_u32();
            let namespace = read_string(&mut bytes)?;
            let name = read_string(&mut bytes)?;
            let reserved_len = read_u16(&mut bytes)? as usize;
            if bytes.remaining() < reserved_len {
                return Err(invalid_magic());
            }
            bytes.advance(reserved_len);

            let bucket = table.buckets.entry((r#type, direction)).or_default();
            bucket.by_name.insert((namespace.clone(), name.clone()), index);
            // Entries may arrive out of index order across a decode; place by index so
            // `lookup` stays O(1) via Vec indexing.
            if bucket.entries.len() <= index as usize {
                bucket.entries.resize(
                    index as usize + 1,
                    Operation {
                        index: 0,
                        r#type,
                        direction,
                        namespace: String::new(),
                        name: String::new(),
                    },
                );
            }
            bucket.entries[index as usize] =
                Operation { index, r#type, direction, namespace, name };
        }
        Ok(table)
    }
}

fn read_u16(bytes: &mut Bytes) -> Result<u16> {
    if bytes.remaining() < 2 {
        return Err(invalid_magic());
    }
    Ok(bytes.get_u16())
}

fn read_string(bytes: &mut Bytes) -> Result<String> {
    let len = read_u16(bytes)? as usize;
    if bytes.remaining() < len {
        return Err(invalid_magic());
    }
    let raw = bytes.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| invalid_magic())
}

fn invalid_magic() -> Error {
    crate::error::table_decode_error("invalid operation table magic or truncated buffer")
}

fn unsupported_table_version() -> Error {
    crate::error::table_decode_error("unsupported operation table version")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_always_appends() {
        let mut table = Table::new();
        let a = table.export(OperationType::RequestResponse, "ns", "op");
        let b = table.export(OperationType::RequestResponse, "ns", "op");
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn import_dedupes() {
        let mut table = Table::new();
        let a = table.import(OperationType::RequestStream, "ns", "op");
        let b = table.import(OperationType::RequestStream, "ns", "op");
        assert_eq!(a, b);
        let c = table.import(OperationType::RequestStream, "ns", "other");
        assert_ne!(a, c);
    }

    #[test]
    fn indices_are_dense_per_bucket() {
        let mut table = Table::new();
        table.export(OperationType::RequestResponse, "ns", "a");
        table.export(OperationType::RequestResponse, "ns", "b");
        table.export(OperationType::RequestStream, "ns", "c");
        assert_eq!(
            table
                .lookup(OperationType::RequestStream, Direction::Export, 0)
                .unwrap()
                .name,
            "c"
        );
    }

    #[test]
    fn round_trips_through_serialize_deserialize() {
        let mut table = Table::new();
        table.export(OperationType::RequestResponse, "greeting", "sayHello");
        table.import(OperationType::RequestStream, "counter", "countToN");

        let bytes = table.serialize();
        let decoded = Table::deserialize(bytes).unwrap();

        let op = decoded
            .lookup(OperationType::RequestResponse, Direction::Export, 0)
            .unwrap();
        assert_eq!(op.namespace, "greeting");
        assert_eq!(op.name, "sayHello");

        let op = decoded
            .lookup(OperationType::RequestStream, Direction::Import, 0)
            .unwrap();
        assert_eq!(op.namespace, "counter");
        assert_eq!(op.name, "countToN");
    }

    #[test]
    fn bad_magic_fails() {
        let bytes = Bytes::from_static(b"\x01bad\x00\x01\x00\x00\x00\x00");
        assert!(Table::deserialize(bytes).is_err());
    }

    #[test]
    fn unsupported_version_fails() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u16(2); // unsupported version
        buf.put_u32(0);
        assert!(Table::deserialize(buf.freeze()).is_err());
    }
}
