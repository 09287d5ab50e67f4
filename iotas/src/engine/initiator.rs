//! Initiator-side calls: resolving a named operation against the peer's operation table (set
//! once `SETUP` completes), allocating a stream, and wiring the caller's [`Mono`]/[`Flux`] to the
//! wire's `REQUEST_N`/`CANCEL`/`PAYLOAD`/`ERROR` frames for that stream.
use super::stream::{Inbound, StreamEntry};
use super::{metadata, Engine};
use crate::frame::codec::{RequestChannelFrame, RequestFnfFrame, RequestResponseFrame, RequestStreamFrame};
use crate::frame::Frame;
use crate::operations::OperationType;
use crate::payload::Payload;
use crate::reactive::{Flux, FluxSubscribe, Mono};

use std::sync::{Arc, Mutex};

impl Engine {
    /// Calls a peer-exported request/response operation.
    pub(crate) fn call_request_response(
        self: &Arc<Self>,
        namespace: &str,
        name: &str,
        payload: Payload,
    ) -> Mono<crate::Result<Payload>> {
        let engine = self.clone();
        let namespace = namespace.to_string();
        let name = name.to_string();
        Mono::create(move |sink| {
            let operation_id =
                match engine.resolve_peer_export(OperationType::RequestResponse, &namespace, &name) {
                    Ok(id) => id,
                    Err(err) => return sink.error(err),
                };
            let stream_id = engine.next_stream_id();
            let entry = StreamEntry::new(Inbound::Mono(sink.clone()));
            engine.streams.add(stream_id, entry);
            sink.on_cancel({
                let engine = engine.clone();
                move || engine.send_cancel(stream_id)
            });
            let wrapped = metadata::wrap(operation_id, 0, payload);
            engine.send(Frame::RequestResponse(RequestResponseFrame::new(stream_id, false, wrapped)));
        })
    }

    /// Calls a peer-exported fire-and-forget operation. There is no response, so this
    /// completes as soon as the frame has been handed to the connection.
    pub(crate) fn call_fire_and_forget(
        self: &Arc<Self>,
        namespace: &str,
        name: &str,
        payload: Payload,
    ) -> crate::Result<()> {
        let operation_id = self.resolve_peer_export(OperationType::FireAndForget, namespace, name)?;
        let stream_id = self.next_stream_id();
        let wrapped = metadata::wrap(operation_id, 0, payload);
        self.send(Frame::RequestFnf(RequestFnfFrame::new(stream_id, false, wrapped)));
        Ok(())
    }

    /// Calls a peer-exported request/stream operation. The returned `Flux`'s demand drives
    /// outbound `REQUEST_N` frames; cancelling it sends `CANCEL`.
    pub(crate) fn call_request_stream(
        self: &Arc<Self>,
        namespace: &str,
        name: &str,
        payload: Payload,
    ) -> Flux<crate::Result<Payload>> {
        let engine = self.clone();
        let namespace = namespace.to_string();
        let name = name.to_string();
        Flux::create(move |sink| {
            let operation_id =
                match engine.resolve_peer_export(OperationType::RequestStream, &namespace, &name) {
                    Ok(id) => id,
                    Err(err) => return sink.error(err),
                };
            let stream_id = engine.next_stream_id();
            let entry = StreamEntry::new(Inbound::Flux(sink.clone()));
            engine.streams.add(stream_id, entry);

            let initial = sink.outstanding();
            sink.on_request({
                let engine = engine.clone();
                move |n| engine.send_request_n(stream_id, n)
            });
            sink.on_cancel({
                let engine = engine.clone();
                move || engine.send_cancel(stream_id)
            });

            let wrapped = metadata::wrap(operation_id, 0, payload);
            let initial_request_n = initial.min(crate::frame::MAX_U31 as u64) as u32;
            engine.send(Frame::RequestStream(RequestStreamFrame::new(
                stream_id,
                false,
                initial_request_n,
                wrapped,
            )));
        })
    }

    /// Calls a peer-exported request/channel operation: `payloads` is this side's outbound
    /// half, drained and sent as the channel's items; the returned `Flux` is the peer's
    /// responses.
    pub(crate) fn call_request_channel(
        self: &Arc<Self>,
        namespace: &str,
        name: &str,
        payloads: Flux<crate::Result<Payload>>,
    ) -> Flux<crate::Result<Payload>> {
        let engine = self.clone();
        let namespace = namespace.to_string();
        let name = name.to_string();
        Flux::create(move |inbound_sink| {
            let operation_id =
                match engine.resolve_peer_export(OperationType::RequestChannel, &namespace, &name) {
                    Ok(id) => id,
                    Err(err) => return inbound_sink.error(err),
                };
            let stream_id = engine.next_stream_id();
            let entry = StreamEntry::new(Inbound::Flux(inbound_sink.clone()));
            engine.streams.add(stream_id, entry.clone());

            // The demand we grant the peer for its response items rides on the channel's
            // first frame, same as REQUEST_STREAM's `initial_request_n`.
            let initial_request_n = inbound_sink.outstanding().min(crate::frame::MAX_U31 as u64) as u32;
            inbound_sink.on_request({
                let engine = engine.clone();
                move |n| engine.send_request_n(stream_id, n)
            });
            inbound_sink.on_cancel({
                let engine = engine.clone();
                move || engine.send_cancel(stream_id)
            });

            let first_sent = Arc::new(Mutex::new(false));
            let engine_next = engine.clone();
            let engine_complete = engine.clone();
            let engine_err = engine.clone();

            // `no_request()`: this side's outbound items are only ever pulled by the peer's own
            // REQUEST_N frames for this stream, forwarded into the bound subscription by
            // `handle_request_n` — never auto-drained locally.
            payloads.subscribe(
                FluxSubscribe::new()
                    .no_request()
                    .on_subscribe({
                        let entry = entry.clone();
                        move |sub| entry.bind_subscription(sub)
                    })
                    .on_next({
                        let first_sent = first_sent.clone();
                        move |result| match result {
                            Ok(item) => send_channel_item(
                                &engine_next,
                                stream_id,
                                operation_id,
                                initial_request_n,
                                &first_sent,
                                item,
                            ),
                            Err(err) => engine_next.respond_error(stream_id, err),
                        }
                    })
                    .on_complete(move || {
                        send_channel_complete(&engine_complete, stream_id, operation_id, &first_sent)
                    })
                    .on_error(move |err| engine_err.respond_error(stream_id, err)),
            );
        })
    }
}

/// Sends one outbound channel item: the first becomes the `REQUEST_CHANNEL` frame itself
/// (carrying the routing prefix and this side's granted demand for the peer's responses),
/// every later one a plain `PAYLOAD{NEXT}`.
fn send_channel_item(
    engine: &Arc<Engine>,
    stream_id: u32,
    operation_id: u32,
    initial_request_n: u32,
    first_sent: &Mutex<bool>,
    item: Payload,
) {
    let mut first_sent = first_sent.lock().unwrap();
    if !*first_sent {
        *first_sent = true;
        let wrapped = metadata::wrap(operation_id, 0, item);
        engine.send(Frame::RequestChannel(RequestChannelFrame::new(
            stream_id,
            false,
            false,
            initial_request_n,
            wrapped,
        )));
    } else {
        drop(first_sent);
        engine.send(Frame::Payload(crate::frame::codec::PayloadFrame::new(
            stream_id,
            crate::frame::Flags::NEXT,
            item,
        )));
    }
}

/// Closes this side's outbound half of a channel: a bare `PAYLOAD{COMPLETE}` if at least one
/// item went out as the `REQUEST_CHANNEL` frame already, or an empty, immediately-complete
/// `REQUEST_CHANNEL` if the caller's outbound `Flux` never produced anything.
fn send_channel_complete(engine: &Arc<Engine>, stream_id: u32, operation_id: u32, first_sent: &Mutex<bool>) {
    let first_sent = *first_sent.lock().unwrap();
    if first_sent {
        engine.send(Frame::Payload(crate::frame::codec::PayloadFrame::new(
            stream_id,
            crate::frame::Flags::COMPLETE,
            Payload::default(),
        )));
    } else {
        let wrapped = metadata::wrap(operation_id, 0, Payload::default());
        engine.send(Frame::RequestChannel(RequestChannelFrame::new(stream_id, false, true, 0, wrapped)));
    }
}
