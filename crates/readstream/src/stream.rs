//! The consumer-facing stream.

use crate::buffer::{count_bytes, count_one, Measure, ReadBuffer};
use crate::config::ReadOptions;
use crate::coordinator::{Coordinator, Emitter};
use crate::end_signal::EndSignal;
use crate::error::StreamError;
use crate::producer::Producer;
use bytes::Bytes;
use futures_core::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_stream::StreamExt;

/// A readable stream fed by a [`Producer`].
///
/// Implements `futures::Stream`. Items are `Ok(value)` in emission order,
/// followed by either the end (`None`) or a single `Err` and then `None`.
///
/// # Backpressure
///
/// The producer is only asked for more while the buffer is below its
/// high-water mark; polling the stream is what requests the next cycle.
/// Synchronous cycles run inline on the polling task. Pending emissions are
/// driven on the ambient tokio runtime, and the cycle that follows them runs
/// on the task that settled the last one.
///
/// # Ending
///
/// The stream ends when the producer emits the end-marker (after every
/// emission of that cycle settles), when [`end`](Self::end) or an
/// [`EndSignal`] is called, or when the stream is dropped.
pub struct ReadStream<T: Send + 'static> {
    coordinator: Arc<Coordinator<T>>,
}

impl<T: Send + 'static> ReadStream<T> {
    /// Creates an object-mode stream around `producer`.
    ///
    /// This is the extension point for custom streams: implement
    /// [`Producer`] on your own type instead of passing a closure to
    /// [`read`](crate::read).
    pub fn new<P: Producer<T> + 'static>(producer: P) -> Self {
        Self::with_options(ReadOptions::default(), producer)
    }

    /// Creates a stream with explicit options.
    ///
    /// Byte mode needs items whose size is known; for any other item type
    /// `object_mode = false` is ignored and items count one each. Use
    /// [`ReadStream::bytes_with_options`] for byte streams.
    pub fn with_options<P: Producer<T> + 'static>(options: ReadOptions, producer: P) -> Self {
        if !options.object_mode {
            tracing::warn!("byte mode requires Bytes items; counting items as objects");
        }
        let buffer = ReadBuffer::new(options.effective_high_water_mark(), count_one::<T>);
        Self::from_parts(Box::new(producer), buffer)
    }

    fn from_parts(producer: Box<dyn Producer<T>>, buffer: ReadBuffer<T>) -> Self {
        Self {
            coordinator: Coordinator::new(producer, buffer),
        }
    }

    /// Pushes a value directly into the buffer, bypassing the producer.
    ///
    /// Returns whether the buffer has room for more. Dropped (returning
    /// `false`) once the stream has ended.
    pub fn push(&self, value: T) -> bool {
        self.coordinator.push(value)
    }

    /// Pushes the end-marker directly. Returns `true` if this call ended the
    /// stream. In-flight and future emissions are discarded.
    pub fn end(&self) -> bool {
        self.coordinator.end_externally()
    }

    /// Returns a cloneable signal that ends this stream from another task.
    pub fn end_signal(&self) -> EndSignal {
        EndSignal::new(self.coordinator.clone())
    }

    /// Returns an emit handle bound to this stream, for pushing from outside
    /// a producer cycle.
    pub fn emitter(&self) -> Emitter<T> {
        Emitter::new(Arc::clone(&self.coordinator))
    }

    /// Returns `true` once the end-marker has been observed from any source.
    ///
    /// Buffered values may still be waiting to be read.
    pub fn is_ended(&self) -> bool {
        self.coordinator.is_ended()
    }

    /// Number of times the producer has been invoked.
    pub fn invocations(&self) -> u64 {
        self.coordinator.invocations()
    }

    /// Number of values accepted but not yet read.
    pub fn buffered_len(&self) -> usize {
        self.coordinator.buffered_len()
    }

    /// Drives the stream to completion, discarding its values.
    ///
    /// Resolves to `Ok(())` once the stream has ended and every accepted
    /// value has been drained, or to the stream's error.
    pub async fn finished(mut self) -> Result<(), StreamError> {
        while let Some(item) = self.next().await {
            item?;
        }
        Ok(())
    }
}

impl ReadStream<Bytes> {
    /// Creates a byte-oriented stream: the high-water mark counts bytes.
    pub fn bytes_with_options<P: Producer<Bytes> + 'static>(
        options: ReadOptions,
        producer: P,
    ) -> Self {
        let measure: Measure<Bytes> = if options.object_mode {
            count_one::<Bytes>
        } else {
            count_bytes::<Bytes>
        };
        let buffer = ReadBuffer::new(options.effective_high_water_mark(), measure);
        Self::from_parts(Box::new(producer), buffer)
    }
}

impl<T: Send + 'static> Stream for ReadStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.coordinator.poll_next(cx)
    }
}

impl<T: Send + 'static> Drop for ReadStream<T> {
    fn drop(&mut self) {
        // Nobody is left to read: stop the producer.
        if self.coordinator.end_externally() {
            tracing::trace!("stream dropped before it ended");
        }
    }
}

impl<T: Send + 'static> fmt::Debug for ReadStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStream")
            .field("ended", &self.is_ended())
            .field("invocations", &self.invocations())
            .field("buffered", &self.buffered_len())
            .finish()
    }
}
