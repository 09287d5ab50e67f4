//! [`Flow`]: a sequence of steps run one after another, each optionally waiting on a group of
//! [`Awaitable`]s before the next step starts.
//!
//! Optional sugar, not used by the interaction engine itself; grounded on the source runtime's
//! `rx/flow` package, which the original uses to stitch together WASM guest invocations that
//! each kick off async work and only need to serialize on completion, not on every intermediate
//! value. Kept narrow: no `Notify`/`NoRequest` passthrough, since nothing in this crate needs it.
use super::mono::{Mono, MonoSink};
use super::SignalType;
use crate::error::Error;

use std::io;
use std::sync::{Arc, Mutex};

/// Something a [`Flow`] step can wait on before the next step starts.
///
/// `start` kicks off the work (a step's outcome may already be running by the time it's
/// returned, in which case `start` is a no-op); `notify` registers a callback fired exactly
/// once, with the work's terminal [`SignalType`].
pub trait Awaitable: Send + Sync {
    /// Ensures the awaited work is running.
    fn start(&self);
    /// Registers `f` to run once when the awaited work reaches a terminal signal.
    fn notify(&self, f: Box<dyn FnOnce(SignalType) + Send>);
}

/// A group of [`Awaitable`]s a step waits on collectively before the flow advances.
pub type Group = Vec<Arc<dyn Awaitable>>;

/// What a step produced: either the flow's final result, or a group to wait on before running
/// the next queued step.
pub enum StepOutcome<T> {
    /// The flow is finished, successfully.
    Success(T),
    /// The flow is finished, with an error.
    Error(Error),
    /// Wait for every [`Awaitable`] in this group before advancing to the next step.
    Await(Group),
}

type StepFn<T> = Box<dyn FnOnce() -> StepOutcome<T> + Send>;

struct Inner<T> {
    steps: Vec<StepFn<T>>,
    sink: Option<MonoSink<T>>,
}

/// A sequence of steps, each run only once the previous step's await group has fully
/// completed.
pub struct Flow<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Send + 'static> Flow<T> {
    /// Creates an empty flow; add work with [`Flow::step`].
    pub fn new() -> Self {
        Flow { inner: Arc::new(Mutex::new(Inner { steps: Vec::new(), sink: None })) }
    }

    /// Appends a step to the sequence.
    pub fn step(self, f: impl FnOnce() -> StepOutcome<T> + Send + 'static) -> Self {
        self.inner.lock().unwrap().steps.push(Box::new(f));
        self
    }

    /// Runs the flow, returning a [`Mono`] that resolves once the final step completes (or any
    /// step reports an error).
    pub fn mono(self) -> Mono<T> {
        let inner = self.inner;
        Mono::create(move |sink| {
            inner.lock().unwrap().sink = Some(sink);
            Self::advance(inner);
        })
    }

    fn advance(inner: Arc<Mutex<Inner<T>>>) {
        let next_step = {
            let mut guard = inner.lock().unwrap();
            if guard.steps.is_empty() {
                None
            } else {
                Some(guard.steps.remove(0))
            }
        };
        let Some(step) = next_step else {
            let sink = inner.lock().unwrap().sink.take();
            if let Some(sink) = sink {
                sink.error(crate::error::Error::new(
                    crate::error::Kind::Invalid,
                    Some(io::Error::new(io::ErrorKind::Other, "flow has no steps")),
                ));
            }
            return;
        };
        match step() {
            StepOutcome::Success(value) => {
                if let Some(sink) = inner.lock().unwrap().sink.take() {
                    sink.success(value);
                }
            }
            StepOutcome::Error(err) => {
                if let Some(sink) = inner.lock().unwrap().sink.take() {
                    sink.error(err);
                }
            }
            StepOutcome::Await(group) => {
                if group.is_empty() {
                    Self::advance(inner);
                    return;
                }
                let remaining = Arc::new(std::sync::atomic::AtomicUsize::new(group.len()));
                for awaitable in &group {
                    let inner = inner.clone();
                    let remaining = remaining.clone();
                    awaitable.notify(Box::new(move |_signal| {
                        if remaining.fetch_sub(1, std::sync::atomic::Ordering::SeqCst) == 1 {
                            Self::advance(inner);
                        }
                    }));
                }
                for awaitable in &group {
                    awaitable.start();
                }
            }
        }
    }
}

impl<T: Send + 'static> Default for Flow<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Immediate {
        notified: StdMutex<Option<Box<dyn FnOnce(SignalType) + Send>>>,
    }

    impl Awaitable for Immediate {
        fn start(&self) {
            if let Some(f) = self.notified.lock().unwrap().take() {
                f(SignalType::Complete);
            }
        }
        fn notify(&self, f: Box<dyn FnOnce(SignalType) + Send>) {
            *self.notified.lock().unwrap() = Some(f);
        }
    }

    #[test]
    fn single_step_resolves() {
        let (value, err) = Flow::new().step(|| StepOutcome::Success(5)).mono().block();
        assert_eq!(value, Some(5));
        assert!(err.is_none());
    }

    #[test]
    fn waits_for_await_group_before_next_step() {
        let flow = Flow::new()
            .step(|| {
                let awaitable: Arc<dyn Awaitable> =
                    Arc::new(Immediate { notified: StdMutex::new(None) });
                StepOutcome::Await(vec![awaitable])
            })
            .step(|| StepOutcome::Success(99));
        let (value, err) = flow.mono().block();
        assert_eq!(value, Some(99));
        assert!(err.is_none());
    }

    #[test]
    fn error_step_short_circuits() {
        let flow = Flow::new()
            .step(|| StepOutcome::Error(crate::error::stream_not_found()))
            .step(|| StepOutcome::Success(1));
        let (value, err) = flow.mono().block();
        assert!(value.is_none());
        assert!(err.is_some());
    }
}
