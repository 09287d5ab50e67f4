use crate::error::Result;
use crate::frame::Frame;

use std::future::Future;
use std::pin::Pin;
use tokio_stream::Stream;

/// A one-shot asynchronous value, scoped to frame-level transport plumbing.
///
/// Distinct from the crate's public [`crate::reactive::Mono`]: a `DuplexConnection` moves raw
/// `Frame`s and is driven by `tokio`'s task executor like any other `Future`, while the
/// reactive primitives are cold, callback-driven publishers with no executor underneath them
/// at all (so they also work inside a WASM guest with no task runtime).
pub(crate) type FrameMono<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A stream of asynchronously produced values, scoped to frame-level transport plumbing. See
/// [`FrameMono`].
pub(crate) type FrameFlux<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Represents a network connection over `RSocket` to send/receive data.
pub trait DuplexConnection: Send + Sync {
    /// Send a frame to the remote peer.
    ///
    /// Do nothing if the underlying connection is closed.
    fn send(&self, frame: Frame) -> FrameMono<Result<()>>;

    /// Similar to [`send`], but doesn't wait for response.
    fn send_and_forget(&self, frame: Frame) -> Result<()>;

    /// Send a stream of frames to the remote peer.
    ///
    /// Do nothing if the underlying connection is closed.
    fn send_stream(&self, frames: FrameFlux<Frame>);

    /// Returns a stream of frames received on this connection.
    fn receive(&self) -> FrameFlux<Frame>;

    /// Open the underlying connection.
    fn connect(&self);

    /// Close the underlying connection.
    fn close(&self);

    /// Returns a stream that immediately publishes the currrent connection status and thereafter
    /// updates as it changes.
    fn connection_status(&self) -> FrameFlux<ConnectionStatus>;
}

/// Describes connection status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection established or pending.
    Unconnected,
    /// `connect()` is called but a connection is not yet established.
    Connecting,
    /// Connection is established.
    Connected,
    /// Connection has been closed via `close()`.
    Closed,
    /// Connection has been closed for any other reason.
    Error(String),
}
