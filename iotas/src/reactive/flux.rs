//! `Flux<T>`: a publisher of zero or more `on_next(T)` signals followed by one terminal
//! `{complete | error}`, gated by a [`Subscription`]'s outstanding demand.
use super::subscription::{Subscription, REQUEST_MAX};
use super::SignalType;
use crate::error::Error;

use std::sync::{Arc, Mutex};

type OnNext<T> = Arc<dyn Fn(T) + Send + Sync>;
type OnComplete = Box<dyn FnOnce() + Send>;
type OnError = Box<dyn FnOnce(Error) + Send>;
type Finally = Box<dyn FnOnce(SignalType) + Send>;

/// The handle passed to a [`FluxSubscribe`]'s `on_subscribe` callback.
pub type OnFluxSubscribe = Box<dyn FnOnce(Arc<dyn Subscription>) + Send>;

/// The bundle of callbacks a [`Flux`] is subscribed with.
///
/// Mirrors the source runtime's `flux.Subscribe[T]`. `on_next` may fire any number of times
/// up to the demand issued via the [`Subscription`]; `on_complete`/`on_error` fire exactly
/// once each and are mutually exclusive, followed by `finally`.
///
/// Unless `no_request` is set, subscribing immediately requests [`REQUEST_MAX`] — the common
/// case of "just give me everything". A responder that wants `REQUEST_N`-gated demand calls
/// `no_request()` and drives [`Subscription::request`] itself as demand becomes available; the
/// producer side can in turn observe every such call via [`FluxSink::on_request`].
pub struct FluxSubscribe<T> {
    on_next: Option<OnNext<T>>,
    on_complete: Option<OnComplete>,
    on_error: Option<OnError>,
    on_subscribe: Option<OnFluxSubscribe>,
    finally: Option<Finally>,
    no_request: bool,
}

impl<T: 'static> Default for FluxSubscribe<T> {
    fn default() -> Self {
        FluxSubscribe {
            on_next: None,
            on_complete: None,
            on_error: None,
            on_subscribe: None,
            finally: None,
            no_request: false,
        }
    }
}

impl<T: 'static> FluxSubscribe<T> {
    /// Creates an empty subscriber; attach callbacks with the builder methods below.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback invoked for each produced item, up to outstanding demand.
    pub fn on_next(mut self, f: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.on_next = Some(Arc::new(f));
        self
    }

    /// Sets the callback invoked once the publisher completes normally.
    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Sets the callback invoked if the publisher errors.
    pub fn on_error(mut self, f: impl FnOnce(Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Sets the callback that receives the [`Subscription`] handle once subscribed.
    pub fn on_subscribe(mut self, f: impl FnOnce(Arc<dyn Subscription>) + Send + 'static) -> Self {
        self.on_subscribe = Some(Box::new(f));
        self
    }

    /// Sets the callback invoked exactly once with the terminal signal.
    pub fn finally(mut self, f: impl FnOnce(SignalType) + Send + 'static) -> Self {
        self.finally = Some(Box::new(f));
        self
    }

    /// Suppresses the automatic `request(REQUEST_MAX)` normally issued once subscribed.
    pub fn no_request(mut self) -> Self {
        self.no_request = true;
        self
    }
}

struct State<T> {
    closed: bool,
    outstanding: u64,
    on_next: Option<OnNext<T>>,
    on_complete: Option<OnComplete>,
    on_error: Option<OnError>,
    finally: Option<Finally>,
    producer_cancel: Option<Box<dyn Fn() + Send>>,
    producer_request: Option<Box<dyn Fn(u64) + Send>>,
}

/// The producer-facing half of a [`Flux`]: the value passed into the closure given to
/// [`Flux::create`].
pub struct FluxSink<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for FluxSink<T> {
    fn clone(&self) -> Self {
        FluxSink { state: self.state.clone() }
    }
}

impl<T> FluxSink<T> {
    /// Registers the callback invoked if the subscriber cancels before a terminal signal.
    pub fn on_cancel(&self, f: impl Fn() + Send + 'static) {
        self.state.lock().unwrap().producer_cancel = Some(Box::new(f));
    }

    /// Registers the callback invoked every time the subscriber's [`Subscription::request`] is
    /// called after this point, translating each additional increment of demand into a pull
    /// from wherever this producer's items actually come from (e.g. an outbound `REQUEST_N`
    /// frame to a remote peer).
    ///
    /// Does not retroactively fire for the automatic initial request that already ran before
    /// `source` started (see [`outstanding`](FluxSink::outstanding) to read that).
    pub fn on_request(&self, f: impl Fn(u64) + Send + 'static) {
        self.state.lock().unwrap().producer_request = Some(Box::new(f));
    }

    /// Returns the demand currently licensed to this producer.
    ///
    /// A producer whose initial supply is determined by demand (rather than, say, a
    /// fixed iterator) reads this once `source` starts to learn what the subscriber's
    /// automatic initial request (or an eagerly-issued manual one) already licensed.
    pub fn outstanding(&self) -> u64 {
        self.state.lock().unwrap().outstanding
    }

    /// Delivers one item, decrementing outstanding demand. A no-op, including the decrement,
    /// once the subscription is closed — a cancelled or completed consumer is never re-entered.
    pub fn next(&self, value: T) {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return;
        }
        if st.outstanding == 0 {
            return;
        }
        if st.outstanding != REQUEST_MAX {
            st.outstanding -= 1;
        }
        let cb = st.on_next.clone();
        drop(st);
        if let Some(f) = cb {
            f(value);
        }
    }

    /// Delivers the terminal `Complete` signal. A no-op once already closed.
    pub fn complete(&self) {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return;
        }
        st.closed = true;
        let on_complete = st.on_complete.take();
        let fin = st.finally.take();
        drop(st);
        if let Some(cb) = on_complete {
            cb();
        }
        if let Some(fin) = fin {
            fin(SignalType::Complete);
        }
    }

    /// Delivers the terminal `Error` signal. A no-op once already closed.
    pub fn error(&self, err: Error) {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return;
        }
        st.closed = true;
        let on_error = st.on_error.take();
        let fin = st.finally.take();
        drop(st);
        if let Some(cb) = on_error {
            cb(err);
        }
        if let Some(fin) = fin {
            fin(SignalType::Error);
        }
    }
}

struct FluxSubscription<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T: Send + 'static> Subscription for FluxSubscription<T> {
    fn request(&self, n: u64) {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return;
        }
        st.outstanding = if st.outstanding == REQUEST_MAX || n == REQUEST_MAX {
            REQUEST_MAX
        } else {
            st.outstanding.saturating_add(n)
        };
        if let Some(cb) = &st.producer_request {
            cb(n);
        }
    }

    fn cancel(&self) {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return;
        }
        st.closed = true;
        st.on_next = None;
        st.on_complete = None;
        st.on_error = None;
        let cancel_cb = st.producer_cancel.take();
        let fin = st.finally.take();
        drop(st);
        if let Some(cb) = cancel_cb {
            cb();
        }
        if let Some(fin) = fin {
            fin(SignalType::Cancel);
        }
    }
}

type Source<T> = Box<dyn FnOnce(FluxSink<T>) + Send>;

/// A publisher of zero or more items followed by one terminal `{complete | error}`.
pub struct Flux<T> {
    source: Source<T>,
}

impl<T: Send + 'static> Flux<T> {
    /// Builds a `Flux` whose producer logic lives in `source`, invoked once, synchronously,
    /// when [`subscribe`](Flux::subscribe) is called. The sink is free to call `next` any
    /// number of times up to outstanding demand before a terminal signal.
    pub fn create(source: impl FnOnce(FluxSink<T>) + Send + 'static) -> Self {
        Flux { source: Box::new(source) }
    }

    /// Builds a `Flux` that emits every item of `items` in order, then completes.
    pub fn from_iter(items: impl IntoIterator<Item = T> + Send + 'static) -> Self
    where
        T: 'static,
    {
        Flux::create(move |sink| {
            for item in items {
                sink.next(item);
            }
            sink.complete();
        })
    }

    /// Builds a `Flux` that fails immediately with `err` once subscribed.
    pub fn from_error(err: Error) -> Self {
        Flux::create(move |sink| sink.error(err))
    }

    /// Subscribes to this publisher, invoking the producer closure and wiring `sub`'s
    /// callbacks to its signals.
    pub fn subscribe(self, sub: FluxSubscribe<T>) {
        let state = Arc::new(Mutex::new(State {
            closed: false,
            outstanding: 0,
            on_next: sub.on_next,
            on_complete: sub.on_complete,
            on_error: sub.on_error,
            finally: sub.finally,
            producer_cancel: None,
            producer_request: None,
        }));
        let sink = FluxSink { state: state.clone() };
        let handle: Arc<dyn Subscription> = Arc::new(FluxSubscription { state: state.clone() });
        if let Some(on_subscribe) = sub.on_subscribe {
            on_subscribe(handle.clone());
        }
        if !sub.no_request {
            handle.request(REQUEST_MAX);
        }
        (self.source)(sink);
    }

    /// Maps each produced item through `f`; an error from `f` terminates the flux with that
    /// error instead of forwarding the item, and cancels the upstream subscription.
    ///
    /// Demand and cancellation both propagate through the map: a `request(n)` on the mapped
    /// flux's subscription forwards `n` to the upstream subscription, and a `cancel()` forwards
    /// to it too — so a chain of `.map()`s built over a demand-gated source (such as a stream
    /// bridged to wire `REQUEST_N`/`CANCEL` frames) behaves exactly as if subscribed directly.
    pub fn map<U, F>(self, f: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> crate::Result<U> + Send + Sync + 'static,
    {
        Flux::create(move |sink| {
            let sink_next = sink.clone();
            let sink_complete = sink.clone();
            let sink_err = sink.clone();
            // Demand already licensed to us by the time this producer starts — the automatic
            // initial `request(REQUEST_MAX)` a default (non-`no_request`) subscribe issues runs
            // before this closure does, so it would otherwise never reach our upstream.
            let initial = sink.outstanding();
            let upstream_sub: Arc<Mutex<Option<Arc<dyn Subscription>>>> = Arc::new(Mutex::new(None));
            let upstream_sub2 = upstream_sub.clone();
            let upstream_sub_req = upstream_sub.clone();
            let upstream_sub_cancel = upstream_sub.clone();
            sink.on_request(move |n| {
                if let Some(up) = upstream_sub_req.lock().unwrap().as_ref() {
                    up.request(n);
                }
            });
            sink.on_cancel(move || {
                if let Some(up) = upstream_sub_cancel.lock().unwrap().take() {
                    up.cancel();
                }
            });
            self.subscribe(
                FluxSubscribe::new()
                    .no_request()
                    .on_subscribe(move |upstream| {
                        if initial > 0 {
                            upstream.request(initial);
                        }
                        *upstream_sub2.lock().unwrap() = Some(upstream);
                    })
                    .on_next(move |value| match f(value) {
                        Ok(mapped) => sink_next.next(mapped),
                        Err(err) => {
                            if let Some(sub) = upstream_sub.lock().unwrap().take() {
                                sub.cancel();
                            }
                            sink_err.error(err);
                        }
                    })
                    .on_complete(move || sink_complete.complete())
                    .on_error(move |err| sink.error(err)),
            );
        })
    }

    /// Collects every item into a `Vec`, blocking the calling thread until the publisher's
    /// terminal signal arrives. Not available on `wasm32`; see [`crate::reactive::Mono::block`].
    #[cfg(not(target_arch = "wasm32"))]
    pub fn block(self) -> (Vec<T>, Option<Error>)
    where
        T: Send + 'static,
    {
        use std::sync::mpsc;
        let items: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
        let items2 = items.clone();
        let (tx, rx) = mpsc::channel();
        let tx_complete = tx.clone();
        std::thread::spawn(move || {
            self.subscribe(
                FluxSubscribe::new()
                    .on_next(move |v| items2.lock().unwrap().push(v))
                    .on_complete(move || {
                        let _ = tx_complete.send(None);
                    })
                    .on_error(move |err| {
                        let _ = tx.send(Some(err));
                    }),
            );
        });
        let err = rx.recv().unwrap_or(None);
        let collected = std::mem::take(&mut *items.lock().unwrap());
        (collected, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn emits_items_then_completes() {
        let (items, err) = Flux::from_iter(vec![1, 2, 3]).block();
        assert_eq!(items, vec![1, 2, 3]);
        assert!(err.is_none());
    }

    #[test]
    fn respects_request_n_gating() {
        let delivered = Arc::new(AtomicU64::new(0));
        let delivered2 = delivered.clone();
        let sub_handle: Arc<Mutex<Option<Arc<dyn Subscription>>>> = Arc::new(Mutex::new(None));
        let sub_handle2 = sub_handle.clone();

        Flux::from_iter(vec![10, 20, 30, 40]).subscribe(
            FluxSubscribe::new()
                .no_request()
                .on_subscribe(move |sub| *sub_handle2.lock().unwrap() = Some(sub))
                .on_next(move |_| {
                    delivered2.fetch_add(1, Ordering::SeqCst);
                }),
        );

        // `create`'s source runs synchronously inside `subscribe`, so with zero initial demand
        // nothing should have been delivered yet.
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn map_propagates_error_and_cancels_upstream() {
        let cancelled = Arc::new(AtomicU64::new(0));
        let cancelled2 = cancelled.clone();
        let err_count = Arc::new(AtomicU64::new(0));
        let err_count2 = err_count.clone();

        let flux = Flux::create(move |sink| {
            sink.on_cancel(move || {
                cancelled2.fetch_add(1, Ordering::SeqCst);
            });
            sink.next(1);
            sink.next(2);
        });

        flux.map(|v| {
            if v == 2 {
                Err(crate::error::stream_not_found())
            } else {
                Ok(v)
            }
        })
        .subscribe(FluxSubscribe::new().on_error(move |_| {
            err_count2.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(err_count.load(Ordering::SeqCst), 1);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn complete_and_error_are_each_idempotent() {
        let complete_calls = Arc::new(AtomicU64::new(0));
        let complete_calls2 = complete_calls.clone();

        Flux::<i32>::create(move |sink| {
            sink.complete();
            sink.complete();
        })
        .subscribe(FluxSubscribe::new().on_complete(move || {
            complete_calls2.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(complete_calls.load(Ordering::SeqCst), 1);
    }
}
