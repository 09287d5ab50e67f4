//! [`Processor`]: a single-value bridge between producer and subscriber, letting a value be
//! delivered before anyone has subscribed yet.
//!
//! Grounded on the need in the interaction engine to resolve a request before the caller has
//! had a chance to attach subscriber callbacks: the RSocket initiator side constructs a
//! `Processor`, hands its [`Mono`] half back to the caller, and completes it later once the
//! PAYLOAD/ERROR frame for that stream id arrives.
use super::mono::{Mono, MonoSink, MonoSubscribe};
use crate::error::Error;

use std::sync::{Arc, Mutex};

enum Buffered<T> {
    Success(T),
    Error(Error),
}

struct Inner<T> {
    sink: Option<MonoSink<T>>,
    buffered: Option<Buffered<T>>,
}

/// A one-shot success/error slot that can be resolved before or after its [`Mono`] half is
/// subscribed to.
pub struct Processor<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Send + 'static> Processor<T> {
    /// Creates a new, unresolved processor.
    pub fn new() -> Self {
        Processor { inner: Arc::new(Mutex::new(Inner { sink: None, buffered: None })) }
    }

    /// Resolves the processor with a value, delivering immediately if already subscribed, or
    /// buffering it for delivery once it is.
    pub fn success(&self, value: T) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(sink) = inner.sink.take() {
            drop(inner);
            sink.success(value);
        } else {
            inner.buffered = Some(Buffered::Success(value));
        }
    }

    /// Resolves the processor with an error, delivering immediately if already subscribed, or
    /// buffering it for delivery once it is.
    pub fn error(&self, err: Error) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(sink) = inner.sink.take() {
            drop(inner);
            sink.error(err);
        } else {
            inner.buffered = Some(Buffered::Error(err));
        }
    }

    /// Returns the publisher half of this processor. Subscribing replays a buffered signal
    /// immediately, or, if none arrived yet, waits for a future [`Processor::success`] /
    /// [`Processor::error`] call.
    pub fn mono(&self) -> Mono<T> {
        let inner = self.inner.clone();
        Mono::create(move |sink| {
            let mut inner = inner.lock().unwrap();
            match inner.buffered.take() {
                Some(Buffered::Success(value)) => {
                    drop(inner);
                    sink.success(value);
                }
                Some(Buffered::Error(err)) => {
                    drop(inner);
                    sink.error(err);
                }
                None => {
                    inner.sink = Some(sink);
                }
            }
        })
    }
}

impl<T: Send + 'static> Default for Processor<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_before_subscribe_is_buffered() {
        let proc = Processor::new();
        proc.success(7);
        let (value, err) = proc.mono().block();
        assert_eq!(value, Some(7));
        assert!(err.is_none());
    }

    #[test]
    fn resolve_after_subscribe_is_delivered_live() {
        let proc = Processor::new();
        let mono = proc.mono();
        let got = Arc::new(Mutex::new(None));
        let got2 = got.clone();
        mono.subscribe(MonoSubscribe::new().on_success(move |v| *got2.lock().unwrap() = Some(v)));
        proc.success(9);
        assert_eq!(*got.lock().unwrap(), Some(9));
    }

    #[test]
    fn error_is_buffered_too() {
        let proc: Processor<i32> = Processor::new();
        proc.error(crate::error::stream_not_found());
        let (value, err) = proc.mono().block();
        assert!(value.is_none());
        assert!(err.is_some());
    }
}
