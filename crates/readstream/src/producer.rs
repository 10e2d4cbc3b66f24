//! The fetch routine a stream drives.

use crate::coordinator::Emitter;
use crate::emission::{Emission, IntoEmission};
use crate::error::BoxError;
use std::future::Future;

/// Source of stream data, invoked once per cycle.
///
/// Implement this trait to build a custom stream by overriding the fetch
/// routine directly; [`read`](crate::read) wraps a closure in the same
/// trait. The returned emission is handled exactly like one passed to
/// [`Emitter::emit`]. Returning `Err` fails the stream and no further
/// cycles are started.
///
/// The coordinator never calls `produce` again until everything the
/// previous call emitted, synchronously or not, has settled.
pub trait Producer<T>: Send {
    fn produce(&mut self, emitter: Emitter<T>) -> Result<Emission<T>, BoxError>;
}

/// Adapter for `FnMut(Emitter<T>) -> impl IntoEmission<T>`.
pub(crate) struct FnProducer<F> {
    f: F,
}

impl<F> FnProducer<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f }
    }
}

impl<T, F, R> Producer<T> for FnProducer<F>
where
    F: FnMut(Emitter<T>) -> R + Send,
    R: IntoEmission<T>,
{
    fn produce(&mut self, emitter: Emitter<T>) -> Result<Emission<T>, BoxError> {
        (self.f)(emitter).into_emission()
    }
}

/// Adapter for closures returning a future; every cycle is asynchronous.
pub(crate) struct AsyncFnProducer<F> {
    f: F,
}

impl<F> AsyncFnProducer<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f }
    }
}

impl<T, F, Fut, R> Producer<T> for AsyncFnProducer<F>
where
    T: 'static,
    F: FnMut(Emitter<T>) -> Fut + Send,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoEmission<T>,
{
    fn produce(&mut self, emitter: Emitter<T>) -> Result<Emission<T>, BoxError> {
        Ok(Emission::pending((self.f)(emitter)))
    }
}
