//! The handler registry: maps an exported operation's dense index to the closure that serves
//! it, one table per interaction mode.
//!
//! Grounded on `invoke/handlers.go`'s `requestResponseHandlers`/`GetRequestResponseHandler`
//! pattern (and its three siblings for FNF/RS/RC): an append-only, index-keyed slice per mode.
//! The source keeps these as package-level globals because a WASM guest only ever hosts one
//! component; here each [`Registry`] is owned by the connection/runtime it serves instead, so
//! multiple iotas can coexist in one process.
use crate::payload::Payload;
use crate::reactive::{Flux, Mono};
use crate::Result;

use std::sync::{Arc, RwLock};

/// Serves a request/response operation.
pub(crate) type RequestResponseHandler =
    Arc<dyn Fn(Payload) -> Mono<Result<Payload>> + Send + Sync>;
/// Serves a fire-and-forget operation.
pub(crate) type FireAndForgetHandler = Arc<dyn Fn(Payload) + Send + Sync>;
/// Serves a request/stream operation.
pub(crate) type RequestStreamHandler = Arc<dyn Fn(Payload) -> Flux<Result<Payload>> + Send + Sync>;
/// Serves a request/channel operation; receives the initial payload plus the inbound channel
/// of further payloads from the requester.
pub(crate) type RequestChannelHandler =
    Arc<dyn Fn(Payload, Flux<Result<Payload>>) -> Flux<Result<Payload>> + Send + Sync>;

#[derive(Default)]
struct Bucket<H> {
    handlers: RwLock<Vec<H>>,
}

impl<H: Clone> Bucket<H> {
    fn push(&self, handler: H) -> u32 {
        let mut handlers = self.handlers.write().unwrap();
        let index = handlers.len() as u32;
        handlers.push(handler);
        index
    }

    fn get(&self, operation_id: u32) -> Option<H> {
        self.handlers.read().unwrap().get(operation_id as usize).cloned()
    }
}

/// The handlers this side of a connection has exported, keyed by interaction mode and dense
/// per-mode index. The index a handler is registered at must agree with the index its
/// `(namespace, name)` was assigned in the corresponding [`crate::operations::Table`] export
/// bucket — the engine dispatches purely on the numeric `operation_id` carried in a request's
/// metadata prefix, never on name.
#[derive(Default)]
pub(crate) struct Registry {
    request_response: Bucket<RequestResponseHandler>,
    fire_and_forget: Bucket<FireAndForgetHandler>,
    request_stream: Bucket<RequestStreamHandler>,
    request_channel: Bucket<RequestChannelHandler>,
}

impl Registry {
    /// Creates an empty registry.
    pub(crate) fn new() -> Self {
        Registry::default()
    }

    /// Registers a request/response handler, returning its dense export index.
    pub(crate) fn export_request_response(&self, handler: RequestResponseHandler) -> u32 {
        self.request_response.push(handler)
    }

    /// Looks up the request/response handler at `operation_id`, if exported.
    pub(crate) fn request_response(&self, operation_id: u32) -> Option<RequestResponseHandler> {
        self.request_response.get(operation_id)
    }

    /// Registers a fire-and-forget handler, returning its dense export index.
    pub(crate) fn export_fire_and_forget(&self, handler: FireAndForgetHandler) -> u32 {
        self.fire_and_forget.push(handler)
    }

    /// Looks up the fire-and-forget handler at `operation_id`, if exported.
    pub(crate) fn fire_and_forget(&self, operation_id: u32) -> Option<FireAndForgetHandler> {
        self.fire_and_forget.get(operation_id)
    }

    /// Registers a request/stream handler, returning its dense export index.
    pub(crate) fn export_request_stream(&self, handler: RequestStreamHandler) -> u32 {
        self.request_stream.push(handler)
    }

    /// Looks up the request/stream handler at `operation_id`, if exported.
    pub(crate) fn request_stream(&self, operation_id: u32) -> Option<RequestStreamHandler> {
        self.request_stream.get(operation_id)
    }

    /// Registers a request/channel handler, returning its dense export index.
    pub(crate) fn export_request_channel(&self, handler: RequestChannelHandler) -> u32 {
        self.request_channel.push(handler)
    }

    /// Looks up the request/channel handler at `operation_id`, if exported.
    pub(crate) fn request_channel(&self, operation_id: u32) -> Option<RequestChannelHandler> {
        self.request_channel.get(operation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_are_densely_indexed_per_mode() {
        let registry = Registry::new();
        let a = registry.export_fire_and_forget(Arc::new(|_| {}));
        let b = registry.export_fire_and_forget(Arc::new(|_| {}));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn unregistered_operation_id_misses() {
        let registry = Registry::new();
        assert!(registry.fire_and_forget(0).is_none());
    }

    #[test]
    fn request_response_handler_round_trips() {
        let registry = Registry::new();
        let index = registry.export_request_response(Arc::new(|payload: Payload| {
            Mono::just(Ok(payload))
        }));
        let handler = registry.request_response(index).unwrap();
        let (value, err) = handler(Payload::builder().set_data("hi").build()).block();
        assert!(err.is_none());
        assert_eq!(value.unwrap().unwrap().data().unwrap().as_ref(), b"hi");
    }
}
