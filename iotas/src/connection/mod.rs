//! RSocket transport session between client and server.
mod buf;

mod conn;
mod counter;
mod socket;
mod stream_id;
mod tcp;
mod wasm;

pub use self::conn::{ConnectionStatus, DuplexConnection};
pub use self::counter::RequestCounter;
pub use self::socket::{Role, Session, SessionBuilder};
pub use self::stream_id::StreamIdProvider;
pub use self::tcp::TcpConnection;
pub use self::wasm::{ByteShuttle, GuestConnection, GuestWaker, HostConnection, RingConnection};

pub(crate) use self::buf::{FollowsBuffer, StreamRegistry};
pub(crate) use self::conn::{FrameFlux, FrameMono};
