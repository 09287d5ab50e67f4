//! Reactive stream primitives: [`Mono`] and [`Flux`], the publisher/subscriber pair every
//! operation boundary in the interaction engine is expressed through.
//!
//! These are cold, callback-driven publishers in the spirit of the source runtime's `rx`
//! package, not adapters over [`std::future::Future`]/[`futures`]-style polling: a publisher is
//! a closure that receives a sink once subscribed, and a subscriber is a bundle of callbacks
//! plus a `no_request` flag. This keeps the contract identical on both the multithreaded native
//! host and the single-threaded cooperative WASM guest, where there is no task executor to poll
//! anything.
mod flow;
mod flux;
mod mono;
mod processor;
mod subscription;

pub use self::flow::Flow;
pub use self::flux::{Flux, FluxSink, FluxSubscribe, OnFluxSubscribe};
pub use self::mono::{Mono, MonoSink, MonoSubscribe};
pub use self::processor::Processor;
pub use self::subscription::{Subscription, REQUEST_MAX};

/// The terminal signal delivered to a subscriber's `finally` callback.
///
/// Exactly one of these is ever delivered per subscription, matching whichever of
/// `on_complete`/`on_success`, `cancel()`, or `on_error` actually occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// The publisher ran to completion (Flux `on_complete` or Mono `on_success`).
    Complete,
    /// The subscription was cancelled before a terminal signal arrived.
    Cancel,
    /// The publisher terminated with an error.
    Error,
}
