//! The control handle a subscriber uses to request demand or cancel.

/// Sentinel "unbounded" demand, kept distinct from an arithmetic sum of `request()` calls so a
/// responder can tell "the consumer asked for everything" apart from "the consumer happened to
/// request exactly this many, so far".
pub const REQUEST_MAX: u64 = 0x7FFF_FFFF;

/// The handle by which a subscriber requests more items or cancels a subscription.
///
/// `request` is additive: each call licenses `n` further `on_next` deliveries on top of any
/// still outstanding. `cancel` is idempotent; calling it more than once, or after the
/// publisher has already reached a terminal signal, has no effect.
pub trait Subscription: Send + Sync {
    /// Requests `n` further items.
    fn request(&self, n: u64);

    /// Cancels the subscription, releasing any producer resources.
    fn cancel(&self);
}

/// A [`Subscription`] that does nothing; used for publishers with nothing to request, such as
/// an already-resolved [`crate::reactive::Mono`].
pub(crate) struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}
    fn cancel(&self) {}
}
