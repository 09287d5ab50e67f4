//! Per-stream bookkeeping the engine keeps alive between dispatching frames for it.
//!
//! A [`StreamEntry`] bundles two independent concerns that every one of the four interaction
//! modes needs some subset of: where this stream's inbound PAYLOAD/ERROR content is delivered
//! (`inbound`), and which local producer's demand/cancellation this stream's REQUEST_N/CANCEL
//! frames drive (`local_subscription`). Which fields a given stream actually uses depends on
//! its mode and which side (initiator/responder) this entry belongs to — see `engine/mod.rs`'s
//! dispatch for the per-mode wiring.
use crate::connection::FollowsBuffer;
use crate::error::Error;
use crate::operations::OperationType;
use crate::payload::Payload;
use crate::reactive::{FluxSink, MonoSink, Subscription};

use std::sync::{Arc, Mutex};

/// Where this stream's inbound, reassembled content is delivered.
pub(super) enum Inbound {
    /// A single eventual response (initiator-side request/response).
    Mono(MonoSink<crate::Result<Payload>>),
    /// A sequence of responses (initiator-side request/stream, or either side's
    /// request/channel inbound half).
    Flux(FluxSink<crate::Result<Payload>>),
    /// No further inbound content is ever expected; the entry exists only so a CANCEL frame
    /// has somewhere to land (responder-side request/response and request/stream).
    None,
}

/// Which handler a stream's request is headed for, once its (possibly fragmented) payload has
/// fully reassembled. Set only while a REQUEST_* frame's FOLLOWS chain is still in flight.
pub(super) struct PendingRequest {
    pub(super) mode: OperationType,
    pub(super) initial_request_n: Option<u32>,
}

/// One live stream's routing: how inbound content reaches the application, and how the
/// stream's demand/cancellation frames reach whichever local producer is generating its
/// outbound content.
pub(super) struct StreamEntry {
    pub(super) inbound: Mutex<Inbound>,
    local_subscription: Mutex<Option<Arc<dyn Subscription>>>,
    pub(super) reassembly: Mutex<Option<FollowsBuffer>>,
    pub(super) pending_request: Mutex<Option<PendingRequest>>,
}

impl StreamEntry {
    pub(super) fn new(inbound: Inbound) -> Arc<StreamEntry> {
        Arc::new(StreamEntry {
            inbound: Mutex::new(inbound),
            local_subscription: Mutex::new(None),
            reassembly: Mutex::new(None),
            pending_request: Mutex::new(None),
        })
    }

    /// Marks this stream as awaiting a request reassembly, so a later non-FOLLOWS `PAYLOAD`
    /// continuation is routed back into handler dispatch instead of treated as a response item.
    pub(super) fn set_pending_request(&self, pending: PendingRequest) {
        *self.pending_request.lock().unwrap() = Some(pending);
    }

    /// Takes and clears the pending request marker, if this stream has one.
    pub(super) fn take_pending_request(&self) -> Option<PendingRequest> {
        self.pending_request.lock().unwrap().take()
    }

    /// Replaces this entry's inbound routing, once it is known (e.g. once a request/channel
    /// handler has been invoked and its inbound `FluxSink` captured).
    pub(super) fn set_inbound(&self, inbound: Inbound) {
        *self.inbound.lock().unwrap() = inbound;
    }

    /// Binds the subscription whose `request`/`cancel` this stream's REQUEST_N/CANCEL frames
    /// should drive. Set once, from the `on_subscribe` callback of whichever local producer
    /// (a handler's returned publisher, or an initiator's own outbound channel) owns this
    /// stream's demand.
    pub(super) fn bind_subscription(&self, sub: Arc<dyn Subscription>) {
        *self.local_subscription.lock().unwrap() = Some(sub);
    }

    /// Forwards demand received via an inbound REQUEST_N frame. A no-op if this stream has no
    /// demand-gated local producer (e.g. a responder's request/response handler).
    pub(super) fn request(&self, n: u64) {
        if let Some(sub) = self.local_subscription.lock().unwrap().as_ref() {
            sub.request(n);
        }
    }

    /// Forwards a locally observed cancellation (inbound CANCEL, or connection teardown) to
    /// the local producer, if any, and — for a request/channel's bidirectional shape — tells
    /// its `Flux`-shaped inbound half no further items are coming either.
    pub(super) fn cancel_local(&self) {
        if let Some(sub) = self.local_subscription.lock().unwrap().take() {
            sub.cancel();
        }
        if let Inbound::Flux(sink) = &*self.inbound.lock().unwrap() {
            sink.complete();
        }
    }

    /// Delivers one `NEXT` item to a `Flux`-shaped inbound sink. A no-op for any other shape.
    pub(super) fn deliver_next(&self, payload: Payload) {
        if let Inbound::Flux(sink) = &*self.inbound.lock().unwrap() {
            sink.next(Ok(payload));
        }
    }

    /// Delivers `COMPLETE` to a `Flux`-shaped inbound sink. A no-op for any other shape.
    pub(super) fn deliver_complete(&self) {
        if let Inbound::Flux(sink) = &*self.inbound.lock().unwrap() {
            sink.complete();
        }
    }

    /// Delivers the single successful response to a `Mono`-shaped inbound sink. A no-op for
    /// any other shape.
    pub(super) fn deliver_success(&self, payload: Payload) {
        if let Inbound::Mono(sink) = &*self.inbound.lock().unwrap() {
            sink.success(Ok(payload));
        }
    }

    /// Delivers a terminal error to whichever inbound sink this stream has, translating an
    /// inbound ERROR frame (or a connection-level failure) into the shape's own error signal.
    pub(super) fn deliver_error(&self, err: Error) {
        match &*self.inbound.lock().unwrap() {
            Inbound::Mono(sink) => sink.error(err),
            Inbound::Flux(sink) => sink.error(err),
            Inbound::None => {}
        }
    }
}
