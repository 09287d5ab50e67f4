//! The RSocket prelude.
pub use crate::config::{ConnectionConfig, RuntimeConfig};
pub use crate::connection::{
    ByteShuttle, DuplexConnection, GuestConnection, HostConnection, Role, Session,
    SessionBuilder, TcpConnection,
};
pub use crate::payload::{
    Data, Metadata, Payload, PayloadBuilder, PayloadChunks,
};
pub use crate::reactive::{Flux, FluxSubscribe, Mono, MonoSubscribe, SignalType, Subscription};

#[doc(inline)]
pub use super::mimetype::DEFAULT_MIMETYPE;
