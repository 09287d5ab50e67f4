//! TCP implementation of [`DuplexConnection`] (§4.8): one reader task and one writer task per
//! socket, framing each [`Frame`] with the wire's 3-byte big-endian length prefix.
use crate::connection::{ConnectionStatus, DuplexConnection, FrameFlux, FrameMono};
use crate::error::{self, Result};
use crate::frame::{Encode, Frame, U24};
use crate::runtime;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

/// A [`DuplexConnection`] over a live [`TcpStream`], usable on either the dialing or the
/// accepting side — both halves are symmetric once the socket is established.
pub struct TcpConnection {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    status: Mutex<Option<mpsc::Receiver<ConnectionStatus>>>,
    status_tx: mpsc::Sender<ConnectionStatus>,
    closed: Arc<AtomicBool>,
}

impl TcpConnection {
    /// Dials `addr` and wraps the resulting socket.
    pub async fn connect(addr: impl ToSocketAddrs, max_frame_size: usize) -> Result<TcpConnection> {
        let stream = TcpStream::connect(addr).await?;
        Ok(TcpConnection::from_stream(stream, max_frame_size))
    }

    /// Wraps an already-established socket, e.g. one returned by `TcpListener::accept`.
    pub fn from_stream(stream: TcpStream, max_frame_size: usize) -> TcpConnection {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::channel(4);
        let closed = Arc::new(AtomicBool::new(false));

        let _ = status_tx.try_send(ConnectionStatus::Connecting);

        runtime::spawn(write_loop(write_half, outbound_rx));
        runtime::spawn(read_loop(
            read_half,
            inbound_tx,
            status_tx.clone(),
            closed.clone(),
            max_frame_size,
        ));

        TcpConnection {
            outbound: outbound_tx,
            inbound: Mutex::new(Some(inbound_rx)),
            status: Mutex::new(Some(status_rx)),
            status_tx,
            closed,
        }
    }
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut outbound_rx: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = outbound_rx.recv().await {
        let mut buf = BytesMut::with_capacity(3 + frame.len());
        U24::from_usize(frame.len()).encode(&mut buf);
        frame.encode(&mut buf);
        if write_half.write_all(&buf).await.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    inbound_tx: mpsc::UnboundedSender<Frame>,
    status_tx: mpsc::Sender<ConnectionStatus>,
    closed: Arc<AtomicBool>,
    max_frame_size: usize,
) {
    let result = read_frames(&mut read_half, &inbound_tx, max_frame_size).await;
    closed.store(true, Ordering::SeqCst);
    match result {
        Ok(()) => {
            let _ = status_tx.try_send(ConnectionStatus::Closed);
        }
        Err(e) => {
            tracing::warn!(error = %e, "TCP connection closed with error");
            let _ = status_tx.try_send(ConnectionStatus::Error(e.to_string()));
        }
    }
}

async fn read_frames(
    read_half: &mut OwnedReadHalf,
    inbound_tx: &mpsc::UnboundedSender<Frame>,
    max_frame_size: usize,
) -> io::Result<()> {
    let mut length_buf = [0u8; 3];
    loop {
        if let Err(e) = read_half.read_exact(&mut length_buf).await {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Ok(());
            }
            return Err(e);
        }
        let frame_len =
            U24::new(length_buf[0], u16::from_be_bytes([length_buf[1], length_buf[2]])).into_usize();
        if frame_len > max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame length {} exceeds max_frame_size {}", frame_len, max_frame_size),
            ));
        }
        let mut body = vec![0u8; frame_len];
        read_half.read_exact(&mut body).await?;
        let mut body = Bytes::from(body);
        match Frame::decode(&mut body) {
            Ok(frame) => {
                if inbound_tx.send(frame).is_err() {
                    return Ok(());
                }
            }
            Err(e) => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
            }
        }
    }
}

impl DuplexConnection for TcpConnection {
    fn send(&self, frame: Frame) -> FrameMono<Result<()>> {
        let result = self.outbound.send(frame).map_err(|_| error::connection_close());
        Box::pin(async move { result })
    }

    fn send_and_forget(&self, frame: Frame) -> Result<()> {
        self.outbound.send(frame).map_err(|_| error::connection_close())
    }

    fn send_stream(&self, mut frames: FrameFlux<Frame>) {
        let tx = self.outbound.clone();
        runtime::spawn(async move {
            use tokio_stream::StreamExt;
            while let Some(frame) = frames.next().await {
                if tx.send(frame).is_err() {
                    break;
                }
            }
        });
    }

    fn receive(&self) -> FrameFlux<Frame> {
        let rx = self
            .inbound
            .lock()
            .unwrap()
            .take()
            .expect("TcpConnection::receive() called more than once");
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
            .expect("connection_status() called more than once");
        Box::pin(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::codec::{CancelFrame, RequestFnfFrame};
    use crate::payload::Payload;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_cross_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            TcpConnection::from_stream(stream, 1 << 20)
        });
        let client = TcpConnection::connect(addr, 1 << 20).await.unwrap();
        let server = accept.await.unwrap();

        let mut incoming = server.receive();
        client.send_and_forget(Frame::Cancel(CancelFrame::new(42))).unwrap();

        use tokio_stream::StreamExt;
        let frame = incoming.next().await.unwrap();
        assert_eq!(frame, Frame::Cancel(CancelFrame::new(42)));
    }

    #[tokio::test]
    async fn oversized_frame_closes_with_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            TcpConnection::from_stream(stream, 16)
        });
        let client = TcpConnection::connect(addr, 1 << 20).await.unwrap();
        let server = accept.await.unwrap();

        let mut status = server.connection_status();
        let oversized = Payload::builder().set_data(vec![0u8; 64]).build();
        client
            .send_and_forget(Frame::RequestFnf(RequestFnfFrame::new(1, false, oversized)))
            .unwrap();

        use tokio_stream::StreamExt;
        // Drain the initial Connecting notification, then expect an Error transition once the
        // reader observes a frame past the tiny max_frame_size.
        assert_eq!(status.next().await, Some(ConnectionStatus::Connecting));
        match status.next().await {
            Some(ConnectionStatus::Error(_)) => {}
            other => panic!("expected Error status, got {:?}", other),
        }
    }
}
