//! Helpers shared by unit and integration tests: an in-process duplex connection pair so the
//! engine and transport glue can be exercised without opening a real socket.
use crate::connection::{ConnectionStatus, DuplexConnection, FrameFlux, FrameMono};
use crate::error::Result;
use crate::frame::Frame;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

/// One half of an in-memory, loopback-free pair of [`DuplexConnection`]s. Frames sent on one
/// end arrive, unmodified, on the `receive()` stream of the other.
pub(crate) struct InMemoryConnection {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    status: std::sync::Mutex<Option<mpsc::Receiver<ConnectionStatus>>>,
    status_tx: mpsc::Sender<ConnectionStatus>,
    closed: Arc<AtomicBool>,
}

impl InMemoryConnection {
    /// Builds a connected pair: frames sent into `a` are observed on `b.receive()` and vice
    /// versa.
    pub(crate) fn pair() -> (InMemoryConnection, InMemoryConnection) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
        let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
        let (a_status_tx, a_status_rx) = mpsc::channel(4);
        let (b_status_tx, b_status_rx) = mpsc::channel(4);

        let a = InMemoryConnection {
            outbound: a_to_b_tx,
            inbound: std::sync::Mutex::new(Some(b_to_a_rx)),
            status: std::sync::Mutex::new(Some(a_status_rx)),
            status_tx: a_status_tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let b = InMemoryConnection {
            outbound: b_to_a_tx,
            inbound: std::sync::Mutex::new(Some(a_to_b_rx)),
            status: std::sync::Mutex::new(Some(b_status_rx)),
            status_tx: b_status_tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (a, b)
    }
}

impl DuplexConnection for InMemoryConnection {
    fn send(&self, frame: Frame) -> FrameMono<Result<()>> {
        let result = self
            .outbound
            .send(frame)
            .map_err(|_| crate::error::connection_close());
        Box::pin(async move { result })
    }

    fn send_and_forget(&self, frame: Frame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| crate::error::connection_close())
    }

    fn send_stream(&self, mut frames: FrameFlux<Frame>) {
        let tx = self.outbound.clone();
        crate::runtime::spawn(async move {
            use tokio_stream::StreamExt;
            while let Some(frame) = frames.next().await {
                if tx.send(frame).is_err() {
                    break;
                }
            }
        });
    }

    fn receive(&self) -> FrameFlux<Frame> {
        let rx = self.inbound.lock().unwrap().take().expect(
            "InMemoryConnection::receive() called more than once per side",
        );
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn connect(&self) {
        let _ = self.status_tx.try_send(ConnectionStatus::Connected);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.status_tx.try_send(ConnectionStatus::Closed);
    }

    fn connection_status(&self) -> FrameFlux<ConnectionStatus> {
        let rx = self
            .status
            .lock()
            .unwrap()
            .take()
            .expect("connection_status() called more than once per side");
        Box::pin(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::codec::CancelFrame;

    #[tokio::test]
    async fn frames_cross_from_a_to_b() {
        let (a, b) = InMemoryConnection::pair();
        let mut incoming = b.receive();
        a.send_and_forget(Frame::Cancel(CancelFrame::new(1))).unwrap();

        use tokio_stream::StreamExt;
        let frame = incoming.next().await.unwrap();
        assert_eq!(frame, Frame::Cancel(CancelFrame::new(1)));
    }
}
