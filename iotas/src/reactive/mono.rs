//! `Mono<T>`: a publisher that produces exactly one `{success(T) | error}`.
use super::subscription::{Subscription, REQUEST_MAX};
use super::SignalType;
use crate::error::Error;

use std::sync::{Arc, Mutex};

type OnSuccess<T> = Box<dyn FnOnce(T) + Send>;
type OnError = Box<dyn FnOnce(Error) + Send>;
type OnSubscribe = Box<dyn FnOnce(Arc<dyn Subscription>) + Send>;
type Finally = Box<dyn FnOnce(SignalType) + Send>;

/// The bundle of callbacks a [`Mono`] is subscribed with.
///
/// Mirrors the source runtime's `mono.Subscribe[T]`: exactly one of `on_success`/`on_error`
/// fires, followed by `finally` with the matching [`SignalType`].
pub struct MonoSubscribe<T> {
    on_success: Option<OnSuccess<T>>,
    on_error: Option<OnError>,
    on_subscribe: Option<OnSubscribe>,
    finally: Option<Finally>,
    no_request: bool,
}

impl<T: 'static> Default for MonoSubscribe<T> {
    fn default() -> Self {
        MonoSubscribe {
            on_success: None,
            on_error: None,
            on_subscribe: None,
            finally: None,
            no_request: false,
        }
    }
}

impl<T: 'static> MonoSubscribe<T> {
    /// Creates an empty subscriber; attach callbacks with the builder methods below.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback invoked with the produced value.
    pub fn on_success(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Sets the callback invoked if the publisher errors.
    pub fn on_error(mut self, f: impl FnOnce(Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Sets the callback that receives the [`Subscription`] handle once subscribed.
    pub fn on_subscribe(
        mut self,
        f: impl FnOnce(Arc<dyn Subscription>) + Send + 'static,
    ) -> Self {
        self.on_subscribe = Some(Box::new(f));
        self
    }

    /// Sets the callback invoked exactly once with the terminal signal.
    pub fn finally(mut self, f: impl FnOnce(SignalType) + Send + 'static) -> Self {
        self.finally = Some(Box::new(f));
        self
    }

    /// Suppresses the automatic `request(REQUEST_MAX)` normally issued once `on_subscribe`
    /// fires.
    pub fn no_request(mut self) -> Self {
        self.no_request = true;
        self
    }
}

struct State<T> {
    closed: bool,
    signal: Option<SignalType>,
    on_success: Option<OnSuccess<T>>,
    on_error: Option<OnError>,
    finally: Option<Finally>,
    producer_cancel: Option<Box<dyn Fn() + Send>>,
}

/// The producer-facing half of a [`Mono`]: the value passed into the closure given to
/// [`Mono::create`].
pub struct MonoSink<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for MonoSink<T> {
    fn clone(&self) -> Self {
        MonoSink { state: self.state.clone() }
    }
}

impl<T> MonoSink<T> {
    /// Registers the callback invoked if the subscriber cancels before a terminal signal.
    pub fn on_cancel(&self, f: impl Fn() + Send + 'static) {
        self.state.lock().unwrap().producer_cancel = Some(Box::new(f));
    }

    /// Delivers the single successful value, then the terminal `Complete` signal.
    ///
    /// A no-op if the sink already delivered a terminal signal (including via `cancel()`).
    pub fn success(&self, value: T) {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return;
        }
        st.closed = true;
        st.signal = Some(SignalType::Complete);
        if let Some(cb) = st.on_success.take() {
            drop(st);
            cb(value);
            let mut st = self.state.lock().unwrap();
            if let Some(fin) = st.finally.take() {
                drop(st);
                fin(SignalType::Complete);
            }
        } else if let Some(fin) = st.finally.take() {
            drop(st);
            fin(SignalType::Complete);
        }
    }

    /// Delivers an error, then the terminal `Error` signal.
    pub fn error(&self, err: Error) {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return;
        }
        st.closed = true;
        st.signal = Some(SignalType::Error);
        if let Some(cb) = st.on_error.take() {
            drop(st);
            cb(err);
        } else {
            drop(st);
        }
        let mut st = self.state.lock().unwrap();
        if let Some(fin) = st.finally.take() {
            drop(st);
            fin(SignalType::Error);
        }
    }
}

struct MonoSubscription<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T: Send + 'static> Subscription for MonoSubscription<T> {
    fn request(&self, _n: u64) {
        // A single-value publisher has nothing further to request once subscribed; requesting
        // is meaningful only as the signal that delivery may begin, which `Mono::subscribe`
        // already handles by invoking the producer closure synchronously.
    }

    fn cancel(&self) {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return;
        }
        st.closed = true;
        st.signal = Some(SignalType::Cancel);
        st.on_success = None;
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

type Source<T> = Box<dyn FnOnce(MonoSink<T>) + Send>;

/// A publisher that produces exactly one `{success(T) | error}`.
pub struct Mono<T> {
    source: Source<T>,
}

impl<T: Send + 'static> Mono<T> {
    /// Builds a `Mono` whose producer logic lives in `source`, invoked once, synchronously,
    /// when [`subscribe`](Mono::subscribe) is called.
    pub fn create(source: impl FnOnce(MonoSink<T>) + Send + 'static) -> Self {
        Mono { source: Box::new(source) }
    }

    /// Builds a `Mono` that resolves immediately with `value` once subscribed.
    pub fn just(value: T) -> Self {
        Mono::create(move |sink| sink.success(value))
    }

    /// Builds a `Mono` that fails immediately with `err` once subscribed.
    pub fn from_error(err: Error) -> Self {
        Mono::create(move |sink| sink.error(err))
    }

    /// Subscribes to this publisher, invoking the producer closure and wiring `sub`'s
    /// callbacks to its eventual signal.
    pub fn subscribe(self, sub: MonoSubscribe<T>) {
        let state = Arc::new(Mutex::new(State {
            closed: false,
            signal: None,
            on_success: sub.on_success,
            on_error: sub.on_error,
            finally: sub.finally,
            producer_cancel: None,
        }));
        let sink = MonoSink { state: state.clone() };
        if let Some(on_subscribe) = sub.on_subscribe {
            let handle: Arc<dyn Subscription> =
                Arc::new(MonoSubscription { state: state.clone() });
            on_subscribe(handle.clone());
            if !sub.no_request {
                handle.request(REQUEST_MAX);
            }
        }
        (self.source)(sink);
    }

    /// Maps the produced value through `f`, which may itself fail; a `f`-returned error
    /// becomes this `Mono`'s error signal.
    pub fn map<U, F>(self, f: F) -> Mono<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> crate::Result<U> + Send + 'static,
    {
        Mono::create(move |sink| {
            let sink_err = sink.clone();
            self.subscribe(
                MonoSubscribe::new()
                    .on_success(move |value| match f(value) {
                        Ok(mapped) => sink.success(mapped),
                        Err(err) => sink.error(err),
                    })
                    .on_error(move |err| sink_err.error(err)),
            );
        })
    }

    /// Runs this `Mono` to completion on a dedicated OS thread and blocks the calling thread
    /// until its terminal signal arrives, returning `(value, error)` with exactly one side
    /// populated.
    ///
    /// Not available on `wasm32`: the single-threaded cooperative guest regime has nothing to
    /// block on a worker with. See §4.5/§5 of the design for the distinction.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn block(self) -> (Option<T>, Option<Error>)
    where
        T: Send + 'static,
    {
        use std::sync::mpsc;
        let (tx, rx) = mpsc::channel();
        let tx_err = tx.clone();
        std::thread::spawn(move || {
            self.subscribe(
                MonoSubscribe::new()
                    .on_success(move |value| {
                        let _ = tx.send((Some(value), None));
                    })
                    .on_error(move |err| {
                        let _ = tx_err.send((None, Some(err)));
                    }),
            );
        });
        rx.recv().unwrap_or((None, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn delivers_success_then_complete() {
        let got = Arc::new(Mutex::new(None));
        let got2 = got.clone();
        let completed = Arc::new(AtomicBool::new(false));
        let completed2 = completed.clone();

        Mono::just(42).subscribe(
            MonoSubscribe::new()
                .on_success(move |v| *got2.lock().unwrap() = Some(v))
                .finally(move |sig| {
                    assert_eq!(sig, SignalType::Complete);
                    completed2.store(true, Ordering::SeqCst);
                }),
        );

        assert_eq!(*got.lock().unwrap(), Some(42));
        assert!(completed.load(Ordering::SeqCst));
    }

    #[test]
    fn error_short_circuits_success() {
        let err_seen = Arc::new(AtomicBool::new(false));
        let err_seen2 = err_seen.clone();
        let success_seen = Arc::new(AtomicBool::new(false));
        let success_seen2 = success_seen.clone();

        Mono::<i32>::from_error(crate::error::stream_not_found()).subscribe(
            MonoSubscribe::new()
                .on_success(move |_| success_seen2.store(true, Ordering::SeqCst))
                .on_error(move |_| err_seen2.store(true, Ordering::SeqCst)),
        );

        assert!(err_seen.load(Ordering::SeqCst));
        assert!(!success_seen.load(Ordering::SeqCst));
    }

    #[test]
    fn map_propagates_errors() {
        let err_seen = Arc::new(AtomicBool::new(false));
        let err_seen2 = err_seen.clone();

        Mono::just(2)
            .map(|_| Err(crate::error::stream_not_found()))
            .subscribe(MonoSubscribe::new().on_error(move |_| {
                err_seen2.store(true, Ordering::SeqCst);
            }));

        assert!(err_seen.load(Ordering::SeqCst));
    }

    #[test]
    fn map_composes() {
        let got = Arc::new(Mutex::new(None));
        let got2 = got.clone();
        Mono::just(2)
            .map(|v| Ok(v + 1))
            .map(|v| Ok(v * 10))
            .subscribe(MonoSubscribe::new().on_success(move |v| *got2.lock().unwrap() = Some(v)));
        assert_eq!(*got.lock().unwrap(), Some(30));
    }

    #[test]
    fn block_returns_success() {
        let (value, err) = Mono::just("hi").block();
        assert_eq!(value, Some("hi"));
        assert!(err.is_none());
    }

    #[test]
    fn cancel_after_complete_is_noop() {
        let state = Arc::new(Mutex::new(State::<i32> {
            closed: false,
            signal: None,
            on_success: None,
            on_error: None,
            finally: None,
            producer_cancel: None,
        }));
        let sub = MonoSubscription { state: state.clone() };
        sub.state.lock().unwrap().closed = true;
        sub.state.lock().unwrap().signal = Some(SignalType::Complete);
        sub.cancel();
        assert_eq!(state.lock().unwrap().signal, Some(SignalType::Complete));
    }
}
