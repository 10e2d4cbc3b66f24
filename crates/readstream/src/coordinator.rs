//! Producer coordination: one cycle at a time, exactly one end.
//!
//! The coordinator owns the producer and decides, once per fetch request,
//! whether to run it. A cycle is one call to [`Producer::produce`] plus the
//! settlement of every pending emission it created. Settlement is a counted
//! join: `pending` holds one slot for the synchronous body and one per
//! outstanding future, and the zero-crossing is the only place a cycle
//! completes.
//!
//! ```text
//!            fetch (buffer wants more)
//!   Idle ───────────────────────────────▶ InFlight
//!    ▲                                       │
//!    └──────────── pending == 0 ─────────────┤
//!                                            │ end-marker / external end / fault
//!                                            ▼
//!                                          Ended
//! ```
//!
//! # Admission
//!
//! Anything emitted once the stream has ended is dropped. A future admitted
//! before the end keeps its slot: if the producer itself ended the stream,
//! the future's value is still forwarded when it resolves, and the consumer
//! sees the end only after the cycle settles. An external end or a fault
//! discards late values and is visible as soon as the buffer drains.
//!
//! The producer never runs while the state lock is held, so it may call
//! back into its [`Emitter`] freely.

use crate::buffer::ReadBuffer;
use crate::emission::{Emission, IntoEmission, PendingEmission};
#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_no_fetch_after_end, debug_assert_not_reopened,
    debug_assert_pending_outstanding, debug_assert_single_in_flight,
};
use crate::error::StreamError;
use crate::producer::Producer;
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tokio::runtime::Handle;

/// Consecutive producer cycles that may add nothing to the buffer before a
/// fetch request gives up its turn and reschedules the consumer.
const IDLE_CYCLE_BUDGET: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// No cycle running; the next fetch request may dispatch the producer.
    Idle,
    /// A cycle is running or waiting for its pending emissions.
    InFlight,
    /// The end-marker has been observed. Terminal.
    Ended,
}

/// What ended the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndCause {
    /// The producer returned or emitted the end-marker.
    Producer,
    /// `ReadStream::end`, `EndSignal::end` or the consumer going away.
    External,
    /// The producer failed or a pending emission was rejected.
    Fault,
}

/// How an emission reached the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Emitted, returned or pushed just now.
    Fresh,
    /// The resolved output of a future admitted earlier.
    Settled,
}

struct State<T> {
    phase: Phase,
    /// Outstanding settlements: the running synchronous body plus every
    /// admitted future that has not resolved.
    pending: usize,
    end: Option<EndCause>,
    /// Taken out while the synchronous body runs.
    producer: Option<Box<dyn Producer<T>>>,
    buffer: ReadBuffer<T>,
    /// Fault waiting to be reported to the consumer.
    fault: Option<StreamError>,
    /// The consumer has seen the terminal `None`.
    closed: bool,
    consumer: Option<Waker>,
    invocations: u64,
    /// Values accepted into the buffer so far.
    accepted: u64,
}

impl<T> State<T> {
    fn drops(&self, admission: Admission) -> bool {
        match (self.end, admission) {
            (None, _) => false,
            (Some(EndCause::Producer), Admission::Settled) => false,
            (Some(_), _) => true,
        }
    }

    /// Whether the consumer may be told the stream is over.
    fn is_drained(&self) -> bool {
        if !self.buffer.is_empty() {
            return false;
        }
        match self.end {
            None => false,
            Some(EndCause::Producer) => self.pending == 0,
            Some(EndCause::External | EndCause::Fault) => true,
        }
    }

    fn take_consumer(&mut self) -> Option<Waker> {
        self.consumer.take()
    }
}

/// Shared core behind a stream, its emitters and its end signals.
pub(crate) struct Coordinator<T> {
    state: Mutex<State<T>>,
}

impl<T: Send + 'static> Coordinator<T> {
    pub(crate) fn new(producer: Box<dyn Producer<T>>, buffer: ReadBuffer<T>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                phase: Phase::Idle,
                pending: 0,
                end: None,
                producer: Some(producer),
                buffer,
                fault: None,
                closed: false,
                consumer: None,
                invocations: 0,
                accepted: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // The producer never runs under the lock, so a poisoned lock only
        // means a panic inside this module; the state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The fetch routine. Runs producer cycles for as long as the buffer
    /// wants more and each cycle settles synchronously. A no-op while a
    /// cycle is in flight or after the end.
    ///
    /// Returns `true` if it stopped early because [`IDLE_CYCLE_BUDGET`]
    /// cycles in a row added nothing; the caller must arrange to be polled
    /// again.
    pub(crate) fn on_fetch_requested(self: &Arc<Self>) -> bool {
        let mut idle = 0;
        while let Some((mut producer, accepted)) = self.begin_cycle() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                producer.produce(Emitter::new(Arc::clone(self)))
            }));
            self.restore(producer);

            match outcome {
                Ok(Ok(emission)) => {
                    self.admit(emission, Admission::Fresh);
                }
                Ok(Err(err)) => self.fail(StreamError::producer(err)),
                Err(payload) => self.fail(StreamError::panicked(payload.as_ref())),
            }

            // Release the synchronous body's slot. If futures are still
            // outstanding the last one to resolve resumes fetching.
            if !self.settle_one() {
                return false;
            }

            if self.lock().accepted == accepted {
                idle += 1;
                if idle >= IDLE_CYCLE_BUDGET {
                    tracing::trace!(cycles = idle, "producer idle, yielding");
                    return true;
                }
            } else {
                idle = 0;
            }
        }
        false
    }

    /// Claims the producer for a new cycle, along with the number of values
    /// accepted before it starts.
    fn begin_cycle(&self) -> Option<(Box<dyn Producer<T>>, u64)> {
        let mut state = self.lock();
        if state.phase != Phase::Idle || state.pending > 0 || !state.buffer.wants_more() {
            return None;
        }

        // Idle with nothing pending, so no other body may hold the producer.
        #[cfg(debug_assertions)]
        debug_assert_single_in_flight!(state.producer.is_none());

        let producer = state.producer.take()?;
        state.phase = Phase::InFlight;
        state.pending = 1;
        state.invocations += 1;
        tracing::trace!(invocation = state.invocations, "dispatching producer");
        Some((producer, state.accepted))
    }

    fn restore(&self, producer: Box<dyn Producer<T>>) {
        let mut state = self.lock();

        #[cfg(debug_assertions)]
        debug_assert_single_in_flight!(state.producer.is_some());

        state.producer = Some(producer);
    }

    /// Decrements the counted join. Returns `true` when this settlement
    /// completed a cycle and the stream can fetch again.
    fn settle_one(&self) -> bool {
        let mut state = self.lock();

        #[cfg(debug_assertions)]
        debug_assert_pending_outstanding!(state.pending);

        state.pending = state.pending.saturating_sub(1);
        if state.pending > 0 {
            return false;
        }

        #[cfg(debug_assertions)]
        let was_ended = state.end.is_some();
        let resumable = match state.phase {
            Phase::InFlight | Phase::Idle => {
                #[cfg(debug_assertions)]
                debug_assert_no_fetch_after_end!(state.end.is_some());

                state.phase = Phase::Idle;
                tracing::trace!(invocation = state.invocations, "cycle settled");
                true
            }
            Phase::Ended => false,
        };

        #[cfg(debug_assertions)]
        debug_assert_not_reopened!(was_ended, state.end.is_some());

        let waker = state.take_consumer();
        drop(state);
        if let Some(waker) = waker {
            waker.wake();
        }
        resumable
    }

    /// Routes one emission. Returns `false` if it was dropped, or for
    /// values, if the buffer is at its high-water mark.
    fn admit(self: &Arc<Self>, emission: Emission<T>, admission: Admission) -> bool {
        match emission {
            Emission::Nothing => !self.lock().drops(admission),
            Emission::Value(value) => self.forward(value, admission),
            Emission::End => self.end_with(EndCause::Producer),
            Emission::Pending(fut) => self.spawn_pending(fut, admission),
        }
    }

    fn forward(&self, value: T, admission: Admission) -> bool {
        let mut state = self.lock();
        if state.drops(admission) {
            tracing::trace!(?admission, "dropping value emitted after end");
            return false;
        }
        let has_capacity = state.buffer.accept(value);
        state.accepted += 1;
        let waker = state.take_consumer();
        drop(state);
        if let Some(waker) = waker {
            waker.wake();
        }
        has_capacity
    }

    fn spawn_pending(self: &Arc<Self>, fut: PendingEmission<T>, admission: Admission) -> bool {
        let handle = {
            let mut state = self.lock();
            if state.drops(admission) {
                tracing::trace!(?admission, "dropping pending emission after end");
                return false;
            }
            let Ok(handle) = Handle::try_current() else {
                drop(state);
                self.fail(StreamError::NoRuntime);
                return false;
            };
            state.pending += 1;
            handle
        };

        let this = Arc::clone(self);
        handle.spawn(async move {
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(outcome) => outcome.map_err(StreamError::rejected),
                Err(payload) => Err(StreamError::panicked(payload.as_ref())),
            };
            this.resolve(outcome);
        });
        true
    }

    /// Admits a settled future's output and releases its slot. The last
    /// settlement of a cycle resumes fetching.
    fn resolve(self: &Arc<Self>, outcome: Result<Emission<T>, StreamError>) {
        match outcome {
            Ok(emission) => {
                self.admit(emission, Admission::Settled);
            }
            Err(err) => self.fail(err),
        }
        if self.settle_one() && self.on_fetch_requested() {
            let waker = self.lock().take_consumer();
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }

    /// Transitions to `Ended`. Only the first call has an effect.
    fn end_with(&self, cause: EndCause) -> bool {
        let mut state = self.lock();
        if state.end.is_some() {
            return false;
        }
        state.end = Some(cause);
        state.phase = Phase::Ended;
        tracing::debug!(
            ?cause,
            pending = state.pending,
            invocations = state.invocations,
            "stream ended"
        );
        let waker = state.take_consumer();
        drop(state);
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Tears the stream down with `err`, discarding buffered values.
    ///
    /// Ignored once the consumer has seen the end, after an external end
    /// (whose outstanding emissions are discarded wholesale), or after an
    /// earlier fault.
    fn fail(&self, err: StreamError) {
        let mut state = self.lock();
        if state.closed || matches!(state.end, Some(EndCause::External | EndCause::Fault)) {
            tracing::trace!(error = %err, "ignoring fault on a finished stream");
            return;
        }
        tracing::warn!(error = %err, invocations = state.invocations, "producer fault");
        state.end = Some(EndCause::Fault);
        state.phase = Phase::Ended;
        state.buffer.clear();
        state.fault = Some(err);
        let waker = state.take_consumer();
        drop(state);
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Direct external push of a value, admitted like a synchronous emit.
    pub(crate) fn push(self: &Arc<Self>, value: T) -> bool {
        self.forward(value, Admission::Fresh)
    }

    /// Direct external push of the end-marker.
    pub(crate) fn end_externally(&self) -> bool {
        self.end_with(EndCause::External)
    }

    pub(crate) fn poll_next(self: &Arc<Self>, cx: &mut Context<'_>) -> Poll<Option<Result<T, StreamError>>> {
        let yielded = self.on_fetch_requested();

        let mut state = self.lock();
        if let Some(err) = state.fault.take() {
            return Poll::Ready(Some(Err(err)));
        }
        if let Some(item) = state.buffer.pop() {
            return Poll::Ready(Some(Ok(item)));
        }
        if state.is_drained() {
            state.closed = true;
            return Poll::Ready(None);
        }
        match &state.consumer {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => state.consumer = Some(cx.waker().clone()),
        }
        if yielded {
            cx.waker().wake_by_ref();
        }
        Poll::Pending
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.lock().end.is_some()
    }

    pub(crate) fn invocations(&self) -> u64 {
        self.lock().invocations
    }

    pub(crate) fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }
}

/// Anything that can be ended from outside; lets [`EndSignal`](crate::EndSignal)
/// stay independent of the item type.
pub(crate) trait Terminate: Send + Sync {
    fn terminate(&self) -> bool;
    fn is_terminated(&self) -> bool;
}

impl<T: Send + 'static> Terminate for Coordinator<T> {
    fn terminate(&self) -> bool {
        self.end_externally()
    }

    fn is_terminated(&self) -> bool {
        self.is_ended()
    }
}

/// The emit capability handed to a producer on every cycle.
///
/// Cloneable and `'static`, so async producers can move it into the future
/// they return. Values emitted after the stream ended are dropped silently.
pub struct Emitter<T> {
    coordinator: Arc<Coordinator<T>>,
}

impl<T: Send + 'static> Emitter<T> {
    pub(crate) fn new(coordinator: Arc<Coordinator<T>>) -> Self {
        Self { coordinator }
    }

    /// Emits anything convertible into an [`Emission`].
    ///
    /// Returns `false` if the emission was dropped because the stream has
    /// ended, or if a value filled the buffer to its high-water mark. An
    /// `Err` fails the stream.
    pub fn emit<E: IntoEmission<T>>(&self, emission: E) -> bool {
        match emission.into_emission() {
            Ok(emission) => self.coordinator.admit(emission, Admission::Fresh),
            Err(err) => {
                self.coordinator.fail(StreamError::producer(err));
                false
            }
        }
    }

    /// Pushes a value. Returns whether the buffer has room for more.
    pub fn push(&self, value: T) -> bool {
        self.coordinator.push(value)
    }

    /// Emits a future; its output is handled when it resolves, and the
    /// producer is not called again until it has.
    pub fn push_future<F, R>(&self, fut: F) -> bool
    where
        F: Future<Output = R> + Send + 'static,
        R: IntoEmission<T>,
    {
        self.coordinator
            .admit(Emission::pending(fut), Admission::Fresh)
    }

    /// Emits the end-marker. Returns `true` if this call ended the stream.
    pub fn end(&self) -> bool {
        self.coordinator.end_with(EndCause::Producer)
    }

    /// Returns `true` once the stream has ended, for any reason.
    pub fn is_ended(&self) -> bool {
        self.coordinator.is_ended()
    }
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::count_one;
    use crate::error::BoxError;
    use crate::producer::FnProducer;
    use futures::task::noop_waker_ref;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator_with_mark<F, R>(mark: usize, f: F) -> Arc<Coordinator<u32>>
    where
        F: FnMut(Emitter<u32>) -> R + Send + 'static,
        R: IntoEmission<u32>,
    {
        Coordinator::new(
            Box::new(FnProducer::new(f)),
            ReadBuffer::new(mark, count_one::<u32>),
        )
    }

    fn coordinator<F, R>(f: F) -> Arc<Coordinator<u32>>
    where
        F: FnMut(Emitter<u32>) -> R + Send + 'static,
        R: IntoEmission<u32>,
    {
        coordinator_with_mark(16, f)
    }

    fn drain(coordinator: &Arc<Coordinator<u32>>) -> Vec<Result<u32, StreamError>> {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut out = Vec::new();
        while let Poll::Ready(Some(item)) = coordinator.poll_next(&mut cx) {
            out.push(item);
        }
        out
    }

    #[test]
    fn sync_cycles_fill_to_high_water_mark() {
        let mut next = 0u32;
        let c = coordinator(move |_| {
            next += 1;
            Some(next)
        });
        c.on_fetch_requested();
        assert_eq!(c.buffered_len(), 16);
        assert_eq!(c.invocations(), 16);
        assert_eq!(c.lock().phase, Phase::Idle);
    }

    #[test]
    fn fetch_is_a_no_op_while_in_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let c = coordinator(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        {
            let mut state = c.lock();
            state.phase = Phase::InFlight;
            state.pending = 1;
        }
        c.on_fetch_requested();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn end_is_observed_once() {
        let c = coordinator(|_| Emission::End);
        c.on_fetch_requested();
        assert!(c.is_ended());
        assert!(!c.end_externally());
        assert_eq!(c.lock().end, Some(EndCause::Producer));
        assert!(drain(&c).is_empty());
        assert!(c.lock().closed);
    }

    #[test]
    fn emits_after_end_are_dropped() {
        let c = coordinator(|emitter: Emitter<u32>| {
            assert!(emitter.push(1));
            assert!(emitter.end());
            assert!(!emitter.push(2));
            Some(3)
        });
        c.on_fetch_requested();
        let values: Vec<u32> = drain(&c).into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![1]);
        assert_eq!(c.invocations(), 1);
    }

    #[test]
    fn producer_error_tears_down() {
        // A mark of one keeps the first value from being read ahead and
        // then discarded by the fault.
        let mut first = true;
        let c = coordinator_with_mark(1, move |emitter: Emitter<u32>| -> Result<(), BoxError> {
            if first {
                first = false;
                emitter.push(1);
                return Ok(());
            }
            Err("boom".into())
        });
        let out = drain(&c);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Ok(1)));
        assert!(matches!(out[1], Err(StreamError::Producer(_))));
        assert_eq!(c.lock().end, Some(EndCause::Fault));
    }

    #[test]
    fn pending_without_runtime_faults() {
        let c = coordinator(|emitter: Emitter<u32>| {
            emitter.push_future(async { Some(1) });
        });
        let out = drain(&c);
        assert!(matches!(out.as_slice(), [Err(StreamError::NoRuntime)]));
        assert_eq!(c.invocations(), 1);
    }

    #[test]
    fn future_after_end_is_dropped_without_runtime() {
        let c = coordinator(|emitter: Emitter<u32>| {
            emitter.push(1);
            emitter.push(2);
            emitter.end();
            assert!(!emitter.push_future(async { Some(3) }));
        });
        let values: Vec<u32> = drain(&c).into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(c.lock().end, Some(EndCause::Producer));
    }

    #[test]
    fn producer_panic_becomes_fault() {
        let c = coordinator(|_: Emitter<u32>| -> Option<u32> { panic!("sensor offline") });
        let out = drain(&c);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Err(StreamError::Panicked(msg)) if &**msg == "sensor offline"));
        assert_eq!(c.lock().end, Some(EndCause::Fault));
        assert_eq!(c.invocations(), 1);
    }

    #[test]
    fn idle_producer_gives_up_its_turn() {
        let c = coordinator(|_: Emitter<u32>| {});
        assert!(c.on_fetch_requested());
        assert_eq!(c.invocations(), IDLE_CYCLE_BUDGET as u64);
        assert_eq!(c.lock().phase, Phase::Idle);

        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(c.poll_next(&mut cx).is_pending());
        assert_eq!(c.invocations(), 2 * IDLE_CYCLE_BUDGET as u64);
    }

    #[test]
    fn values_reset_the_idle_budget() {
        let mut calls = 0u32;
        let c = coordinator(move |_: Emitter<u32>| {
            calls += 1;
            // One value every twentieth call, ending after the fourth.
            match calls {
                80 => Emission::End,
                n if n % 20 == 0 => Emission::Value(n),
                _ => Emission::Nothing,
            }
        });
        assert!(!c.on_fetch_requested());
        let values: Vec<u32> = drain(&c).into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![20, 40, 60]);
        assert_eq!(c.invocations(), 80);
    }

    #[tokio::test]
    async fn producer_end_waits_for_outstanding_futures() {
        let c = coordinator(|emitter: Emitter<u32>| {
            emitter.push_future(async {
                tokio::task::yield_now().await;
                Some(5)
            });
            Emission::End
        });
        c.on_fetch_requested();
        {
            let state = c.lock();
            assert_eq!(state.phase, Phase::Ended);
            assert_eq!(state.pending, 1);
            assert!(!state.is_drained());
        }
        while c.lock().pending > 0 {
            tokio::task::yield_now().await;
        }
        let values: Vec<u32> = drain(&c).into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![5]);
    }
}
