//! Responder-side dispatch: resolving an inbound request's operation_id to a handler bound in
//! this connection's [`Registry`](crate::registry::Registry), then driving the handler's
//! reactive return value through to outbound `PAYLOAD`/`ERROR` frames.
use super::stream::{Inbound, PendingRequest, StreamEntry};
use super::{metadata, Engine};
use crate::connection::FollowsBuffer;
use crate::error;
use crate::frame::codec::RequestChannelFrame;
use crate::operations::OperationType;
use crate::payload::Payload;
use crate::reactive::{Flux, FluxSink, FluxSubscribe, MonoSubscribe};

use std::sync::{Arc, Mutex};
use tracing::warn;

impl Engine {
    /// Entry point for `REQUEST_RESPONSE`/`REQUEST_FNF`/`REQUEST_STREAM` frames. `REQUEST_CHANNEL`
    /// has its own entry point below, since it also opens an inbound half.
    pub(super) fn handle_request(
        self: &Arc<Self>,
        stream_id: u32,
        mode: OperationType,
        is_follows: bool,
        initial_request_n: Option<u32>,
        payload: Payload,
    ) {
        if is_follows {
            let entry = StreamEntry::new(Inbound::None);
            entry.set_pending_request(PendingRequest { mode, initial_request_n });
            let mut reassembly = FollowsBuffer::new();
            reassembly.push(payload.metadata(), payload.data());
            *entry.reassembly.lock().unwrap() = Some(reassembly);
            self.streams.add(stream_id, entry);
            return;
        }
        self.dispatch_request(stream_id, mode, initial_request_n, payload);
    }

    /// Entry point for `REQUEST_CHANNEL` frames.
    pub(super) fn handle_request_channel(self: &Arc<Self>, frame: RequestChannelFrame) {
        let stream_id = frame.stream_id();
        let is_follows = frame.is_follows();
        let is_complete = frame.is_complete();
        let initial_request_n = frame.initial_request_n();
        let payload = frame.payload();

        if is_follows {
            let entry = StreamEntry::new(Inbound::None);
            entry.set_pending_request(PendingRequest {
                mode: OperationType::RequestChannel,
                initial_request_n: Some(initial_request_n),
            });
            let mut reassembly = FollowsBuffer::new();
            reassembly.push(payload.metadata(), payload.data());
            *entry.reassembly.lock().unwrap() = Some(reassembly);
            self.streams.add(stream_id, entry);
            return;
        }

        self.dispatch_request_channel(stream_id, initial_request_n, is_complete, payload);
    }

    /// Invoked once a (possibly reassembled) request/response, fire-and-forget or
    /// request/stream payload is fully available: resolves the routing prefix and invokes the
    /// bound handler, if any.
    pub(super) fn dispatch_request(
        self: &Arc<Self>,
        stream_id: u32,
        mode: OperationType,
        initial_request_n: Option<u32>,
        payload: Payload,
    ) {
        let routed = match metadata::unwrap(payload) {
            Ok(r) => r,
            Err(err) => return self.reject_request(stream_id, err),
        };

        match mode {
            OperationType::RequestResponse => {
                let handler = match self.registry.request_response(routed.operation_id) {
                    Some(h) => h,
                    None => return self.reject_request(stream_id, error::handler_not_found()),
                };
                let entry = StreamEntry::new(Inbound::None);
                self.streams.add(stream_id, entry.clone());
                let engine = self.clone();
                let engine_err = self.clone();
                handler(routed.payload).subscribe(
                    MonoSubscribe::new()
                        .on_subscribe(move |sub| entry.bind_subscription(sub))
                        .on_success(move |result| engine.respond_single(stream_id, result))
                        .on_error(move |err| engine_err.respond_error(stream_id, err)),
                );
            }
            OperationType::FireAndForget => {
                match self.registry.fire_and_forget(routed.operation_id) {
                    Some(handler) => handler(routed.payload),
                    None => warn!(stream_id, "fire-and-forget: no handler bound"),
                }
            }
            OperationType::RequestStream => {
                let handler = match self.registry.request_stream(routed.operation_id) {
                    Some(h) => h,
                    None => return self.reject_request(stream_id, error::handler_not_found()),
                };
                let entry = StreamEntry::new(Inbound::None);
                self.streams.add(stream_id, entry.clone());
                let n = initial_request_n.unwrap_or(0) as u64;
                let engine = self.clone();
                let engine_complete = self.clone();
                let engine_err = self.clone();
                handler(routed.payload).subscribe(
                    FluxSubscribe::new()
                        .no_request()
                        .on_subscribe(move |sub| {
                            entry.bind_subscription(sub.clone());
                            sub.request(n);
                        })
                        .on_next(move |result| engine.respond_next(stream_id, result))
                        .on_complete(move || engine_complete.respond_complete(stream_id))
                        .on_error(move |err| engine_err.respond_error(stream_id, err)),
                );
            }
            OperationType::RequestChannel => {
                unreachable!("request/channel is dispatched via dispatch_request_channel")
            }
        }
    }

    /// Invoked once a (possibly reassembled) request/channel's first item is fully available:
    /// resolves the routing prefix, invokes the bound handler with the remaining items exposed
    /// as a `Flux`, and wires both directions of the channel to the wire.
    pub(super) fn dispatch_request_channel(
        self: &Arc<Self>,
        stream_id: u32,
        initial_request_n: u32,
        is_complete: bool,
        payload: Payload,
    ) {
        let routed = match metadata::unwrap(payload) {
            Ok(r) => r,
            Err(err) => return self.reject_request(stream_id, err),
        };

        let handler = match self.registry.request_channel(routed.operation_id) {
            Some(h) => h,
            None => return self.reject_request(stream_id, error::handler_not_found()),
        };

        let entry = StreamEntry::new(Inbound::None);
        self.streams.add(stream_id, entry.clone());

        let captured_sink: Arc<Mutex<Option<FluxSink<crate::Result<Payload>>>>> =
            Arc::new(Mutex::new(None));
        let captured_sink_create = captured_sink.clone();
        let engine_initial = self.clone();
        let engine_request = self.clone();
        let engine_cancel = self.clone();
        let inbound = Flux::create(move |sink| {
            // Unlike REQUEST_STREAM/REQUEST_CHANNEL's initial_request_n, there's no frame left
            // to piggyback this stream's first grant of demand on — the channel is already open —
            // so whatever the handler's subscribe auto-requested has to go out as a real REQUEST_N.
            let initial = sink.outstanding();
            sink.on_request(move |n| engine_request.send_request_n(stream_id, n));
            sink.on_cancel(move || engine_cancel.send_cancel(stream_id));
            engine_initial.send_request_n(stream_id, initial);
            if is_complete {
                sink.complete();
            }
            *captured_sink_create.lock().unwrap() = Some(sink);
        });

        let outbound = handler(routed.payload, inbound);

        let n = initial_request_n as u64;
        let engine = self.clone();
        let engine_complete = self.clone();
        let engine_err = self.clone();
        outbound.subscribe(
            FluxSubscribe::new()
                .no_request()
                .on_subscribe({
                    let entry = entry.clone();
                    move |sub| {
                        entry.bind_subscription(sub.clone());
                        sub.request(n);
                    }
                })
                .on_next(move |result| engine.respond_next(stream_id, result))
                .on_complete(move || engine_complete.respond_complete(stream_id))
                .on_error(move |err| engine_err.respond_error(stream_id, err)),
        );

        if let Some(sink) = captured_sink.lock().unwrap().take() {
            entry.set_inbound(Inbound::Flux(sink));
        }
    }
}
