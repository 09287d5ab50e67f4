//! The interaction engine: the per-stream state machines for the four RSocket interaction
//! modes (request/response, fire-and-forget, request/stream, request/channel), driving the
//! frame codec on one side and the reactive primitives on the other.
//!
//! One [`Engine`] is owned by exactly one connection (see [`crate::connection::socket`]);
//! it is transport-agnostic — it only ever touches [`Frame`]s and a [`DuplexConnection`] to
//! send them, never raw bytes or sockets.
mod initiator;
pub(crate) mod metadata;
mod responder;
mod stream;

use crate::connection::{DuplexConnection, Role, StreamIdProvider, StreamRegistry};
use crate::error::{self, Result};
use crate::frame::{codec::*, Flags, Frame};
use crate::operations::{OperationType, Table};
use crate::payload::Payload;
use crate::registry::Registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

pub(crate) use self::stream::{Inbound, PendingRequest, StreamEntry};

/// Drives one connection's stream multiplexing.
///
/// Owns the stream ID allocator and registry, the local operation table (exports this side
/// serves, imports it intends to call), the peer's table once SETUP completes, and the
/// [`Registry`] of handlers bound to the local table's exported indices.
pub(crate) struct Engine {
    role: Role,
    connection: Arc<Box<dyn DuplexConnection>>,
    stream_ids: StreamIdProvider,
    registry: Arc<Registry>,
    local_table: RwLock<Table>,
    peer_table: RwLock<Option<Table>>,
    streams: StreamRegistry<Arc<StreamEntry>>,
    setup_sent: AtomicBool,
    setup_received: AtomicBool,
    max_frame_size: usize,
}

impl Engine {
    /// Creates a new engine for one connection. `local_table`/`registry` should already carry
    /// every operation this side intends to export or import before [`Engine::send_setup`] is
    /// called — the table is serialized into the outbound SETUP and is read-only thereafter.
    pub(crate) fn new(
        role: Role,
        connection: Arc<Box<dyn DuplexConnection>>,
        registry: Arc<Registry>,
        local_table: Table,
        max_frame_size: usize,
    ) -> Arc<Engine> {
        let stream_ids = match role {
            Role::Client => StreamIdProvider::new_for_client(),
            Role::Server => StreamIdProvider::new_for_server(),
        };
        Arc::new(Engine {
            role,
            connection,
            stream_ids,
            registry,
            local_table: RwLock::new(local_table),
            peer_table: RwLock::new(None),
            streams: StreamRegistry::new(),
            setup_sent: AtomicBool::new(false),
            setup_received: AtomicBool::new(false),
            max_frame_size,
        })
    }

    /// Writes this side's SETUP frame, embedding its operation table. Idempotent: a second
    /// call is a no-op, since SETUP must be sent exactly once per connection.
    pub(crate) fn send_setup(
        &self,
        keepalive_interval: std::time::Duration,
        keepalive_timeout: std::time::Duration,
    ) {
        if self.setup_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let table = self.local_table.read().unwrap().serialize();
        let setup = SetupFrame::builder()
            .set_keepalive_interval(keepalive_interval.as_millis() as u32)
            .set_keepalive_timeout(keepalive_timeout.as_millis() as u32)
            .set_data(table)
            .build();
        self.send(Frame::Setup(setup));
    }

    /// Returns true once this side has both sent and received SETUP.
    pub(crate) fn handshake_complete(&self) -> bool {
        self.setup_sent.load(Ordering::SeqCst) && self.setup_received.load(Ordering::SeqCst)
    }

    /// Dispatches one decoded inbound frame. This is the sole entry point the transport
    /// glue's receive loop calls.
    pub(crate) fn dispatch(self: &Arc<Self>, frame: Frame) {
        if !self.setup_received.load(Ordering::SeqCst) {
            match frame {
                Frame::Setup(f) => return self.handle_setup(f),
                _ => {
                    warn!("non-SETUP frame received before handshake completed, closing");
                    self.send(Frame::Error(ErrorFrame::new(
                        0,
                        ErrorFrame::CONNECTION_ERROR,
                        Some(bytes::Bytes::from_static(b"SETUP must be the first frame")),
                    )));
                    self.connection.close();
                    return;
                }
            }
        }

        match frame {
            Frame::Setup(_) => {
                warn!("duplicate SETUP received, rejecting");
                self.send_connection_error(error::setup_already_seen());
            }
            Frame::Lease(_) | Frame::Resume(_) => {
                self.send(Frame::Error(ErrorFrame::new(
                    0,
                    ErrorFrame::UNSUPPORTED_SETUP,
                    Some(bytes::Bytes::from_static(b"LEASE/RESUME are not supported")),
                )));
            }
            Frame::Keepalive(_) | Frame::ResumeOk(_) => {
                // Liveness-only; the core makes no resumption guarantees (§1 non-goals).
            }
            Frame::RequestResponse(f) => {
                let (stream_id, follows, payload) = (f.stream_id(), f.is_follows(), f.payload());
                self.handle_request(stream_id, OperationType::RequestResponse, follows, None, payload);
            }
            Frame::RequestFnf(f) => {
                let (stream_id, follows, payload) = (f.stream_id(), f.is_follows(), f.payload());
                self.handle_request(stream_id, OperationType::FireAndForget, follows, None, payload);
            }
            Frame::RequestStream(f) => {
                let (stream_id, follows, n) = (f.stream_id(), f.is_follows(), f.initial_request_n());
                self.handle_request(stream_id, OperationType::RequestStream, follows, Some(n), f.payload());
            }
            Frame::RequestChannel(f) => self.handle_request_channel(f),
            Frame::RequestN(f) => self.handle_request_n(f),
            Frame::Cancel(f) => self.handle_cancel(f),
            Frame::Payload(f) => self.handle_payload(f),
            Frame::Error(f) => self.handle_error(f),
            Frame::MetadataPush(_) => {
                // Out of core scope beyond acknowledging receipt; applications wanting
                // metadata-push semantics layer it above the core (§1 scope).
            }
        }
    }

    fn handle_setup(&self, frame: SetupFrame) {
        if frame.is_lease() || frame.is_resume() {
            self.send(Frame::Error(ErrorFrame::new(
                0,
                ErrorFrame::UNSUPPORTED_SETUP,
                Some(bytes::Bytes::from_static(b"LEASE/RESUME are not supported")),
            )));
            self.connection.close();
            return;
        }
        let data = match frame.data() {
            Some(d) => d.clone(),
            None => {
                self.send_invalid_setup("SETUP carried no operation table");
                return;
            }
        };
        let table = match Table::deserialize(data) {
            Ok(t) => t,
            Err(_) => {
                self.send_invalid_setup("SETUP data is not a valid operation table");
                return;
            }
        };
        *self.peer_table.write().unwrap() = Some(table);
        self.setup_received.store(true, Ordering::SeqCst);
        debug!(role = ?self.role_debug(), "SETUP handshake received");
    }

    fn send_invalid_setup(&self, msg: &'static str) {
        self.send(Frame::Error(ErrorFrame::new(
            0,
            ErrorFrame::INVALID_SETUP,
            Some(bytes::Bytes::from_static(msg.as_bytes())),
        )));
        self.connection.close();
    }

    fn role_debug(&self) -> &'static str {
        match self.role {
            Role::Client => "client",
            Role::Server => "server",
        }
    }

    fn handle_request_n(&self, frame: RequestNFrame) {
        if let Some(entry) = self.streams.get(frame.stream_id()) {
            entry.request(frame.request_n() as u64);
        }
        // Silently ignored for an absent stream, per §9: no wire error, trace only.
    }

    fn handle_cancel(&self, frame: CancelFrame) {
        if let Some(entry) = self.streams.remove(frame.stream_id()) {
            entry.cancel_local();
        }
    }

    /// Handles one inbound `PAYLOAD` frame, which is either a reassembly continuation of a
    /// still-incomplete request (see [`PendingRequest`]), or ordinary response/channel content
    /// for an already-dispatched stream.
    fn handle_payload(self: &Arc<Self>, frame: PayloadFrame) {
        let stream_id = frame.stream_id();
        let entry = match self.streams.get(stream_id) {
            Some(e) => e,
            None => {
                self.send(Frame::Error(ErrorFrame::new(
                    stream_id,
                    ErrorFrame::INVALID,
                    Some(bytes::Bytes::from_static(b"unknown stream")),
                )));
                return;
            }
        };

        let is_follows = frame.is_follows();
        let is_complete = frame.is_complete();
        let is_next = frame.is_next();
        let payload = frame.payload();

        let finished = {
            let mut reassembly = entry.reassembly.lock().unwrap();
            if is_follows {
                reassembly
                    .get_or_insert_with(crate::connection::FollowsBuffer::new)
                    .push(payload.metadata(), payload.data());
                None
            } else if reassembly.is_some() {
                let mut buf = reassembly.take().unwrap();
                buf.push(payload.metadata(), payload.data());
                Some(buf.finish())
            } else {
                Some(payload)
            }
        };

        let payload = match finished {
            Some(p) => p,
            None => return,
        };

        if let Some(pending) = entry.take_pending_request() {
            return match pending.mode {
                OperationType::RequestChannel => {
                    let n = pending.initial_request_n.unwrap_or(0);
                    self.dispatch_request_channel(stream_id, n, is_complete, payload)
                }
                mode => self.dispatch_request(stream_id, mode, pending.initial_request_n, payload),
            };
        }

        if is_next {
            entry.deliver_next(payload.clone());
        }
        if is_complete {
            // A response/request-response's single value arrives as NEXT|COMPLETE together.
            if is_next {
                entry.deliver_success(payload);
            }
            entry.deliver_complete();
            self.streams.remove(stream_id);
        } else if is_next {
            // Stream completions carry no payload of their own; a lone NEXT on a Mono-shaped
            // inbound (malformed peer) is delivered as success without removing the stream,
            // matching "at most one terminal frame" being the receiver's responsibility to
            // enforce upstream, not the engine's.
            if matches!(&*entry.inbound.lock().unwrap(), Inbound::Mono(_)) {
                entry.deliver_success(payload);
                self.streams.remove(stream_id);
            }
        }
    }

    fn handle_error(&self, frame: ErrorFrame) {
        let stream_id = frame.stream_id();
        if stream_id == 0 {
            warn!(code = frame.error_code(), "connection-level error received");
            return;
        }
        if let Some(entry) = self.streams.remove(stream_id) {
            let message = frame.data_utf8().map(str::to_string);
            entry.deliver_error(error::from_wire(frame.error_code(), message));
        }
    }

    fn send_connection_error(&self, err: crate::Error) {
        self.send(Frame::Error(ErrorFrame::new(
            0,
            err.to_wire_code(),
            Some(bytes::Bytes::from(err.to_wire_message())),
        )));
    }

    /// Sends `frame`, fragmenting it first if it exceeds this connection's configured maximum.
    fn send(&self, frame: Frame) {
        match crate::frame::fragment(&frame, self.max_frame_size) {
            Some(fragments) => {
                for f in fragments {
                    self.send_one(f);
                }
            }
            None => self.send_one(frame),
        }
    }

    fn send_one(&self, frame: Frame) {
        if let Err(err) = self.connection.send_and_forget(frame) {
            warn!(%err, "failed to write frame, connection likely closed");
        }
    }

    fn next_stream_id(&self) -> u32 {
        let (id, _first_cycle) = self.stream_ids.next();
        id
    }

    /// Resolves the peer's export index for `(mode, namespace, name)`, the operation ID this
    /// side must stamp on an outbound request's metadata prefix for the peer's dispatch to
    /// find the right handler. Requires SETUP to have completed.
    fn resolve_peer_export(&self, mode: OperationType, namespace: &str, name: &str) -> Result<u32> {
        let peer = self.peer_table.read().unwrap();
        let table = peer.as_ref().ok_or_else(error::handler_not_found)?;
        table.export_index(mode, namespace, name).ok_or_else(error::handler_not_found)
    }

    /// Sends an outbound `REQUEST_N`, clamping demand to the 31-bit wire field.
    fn send_request_n(&self, stream_id: u32, n: u64) {
        let n = n.min(crate::frame::MAX_U31 as u64) as u32;
        if n == 0 {
            return;
        }
        self.send(Frame::RequestN(RequestNFrame::new(stream_id, n)));
    }

    /// Tears down `stream_id` locally and notifies the peer with a `CANCEL` frame.
    fn send_cancel(&self, stream_id: u32) {
        self.streams.remove(stream_id);
        self.send(Frame::Cancel(CancelFrame::new(stream_id)));
    }

    /// Sends a single successful response (`NEXT|COMPLETE`) or an `ERROR`, and closes the
    /// stream either way. Used by request/response responders.
    fn respond_single(&self, stream_id: u32, result: crate::Result<Payload>) {
        match result {
            Ok(payload) => {
                self.streams.remove(stream_id);
                self.send(Frame::Payload(PayloadFrame::new(
                    stream_id,
                    Flags::NEXT | Flags::COMPLETE,
                    payload,
                )));
            }
            Err(err) => self.respond_error(stream_id, err),
        }
    }

    /// Sends one `NEXT` item of a stream/channel response, or an `ERROR` if the item itself is
    /// an application-level failure.
    fn respond_next(&self, stream_id: u32, result: crate::Result<Payload>) {
        match result {
            Ok(payload) => {
                self.send(Frame::Payload(PayloadFrame::new(stream_id, Flags::NEXT, payload)));
            }
            Err(err) => self.respond_error(stream_id, err),
        }
    }

    /// Closes `stream_id` with a bare `COMPLETE`.
    fn respond_complete(&self, stream_id: u32) {
        self.streams.remove(stream_id);
        self.send(Frame::Payload(PayloadFrame::new(stream_id, Flags::COMPLETE, Payload::default())));
    }

    /// Closes `stream_id` with an `ERROR` frame translating `err`'s wire code/message.
    fn respond_error(&self, stream_id: u32, err: crate::Error) {
        self.streams.remove(stream_id);
        self.send(Frame::Error(ErrorFrame::new(
            stream_id,
            err.to_wire_code(),
            Some(bytes::Bytes::from(err.to_wire_message())),
        )));
    }

    /// Sends a liveness-only `KEEPALIVE`. The core makes no resumption guarantees (§1
    /// non-goals), so `last_received_position` is always 0 and `respond` is never set.
    pub(crate) fn send_keepalive(&self) {
        self.send(Frame::Keepalive(KeepaliveFrame::new(0, None, false)));
    }

    /// Rejects a request whose operation_id could not be resolved to a handler, before any
    /// stream bookkeeping was created for it.
    fn reject_request(&self, stream_id: u32, err: crate::Error) {
        self.send(Frame::Error(ErrorFrame::new(
            stream_id,
            err.to_wire_code(),
            Some(bytes::Bytes::from(err.to_wire_message())),
        )));
    }
}
