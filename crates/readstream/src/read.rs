//! Stream construction from closures.

use crate::config::ReadOptions;
use crate::coordinator::Emitter;
use crate::emission::IntoEmission;
use crate::producer::{AsyncFnProducer, FnProducer};
use crate::stream::ReadStream;
use bytes::Bytes;
use std::future::Future;

/// Creates an object-mode stream from a producer closure.
///
/// The closure is called once per cycle with an [`Emitter`]. It may push
/// any number of values (or futures of values) through the emitter and may
/// return `()`, an `Option<T>` (`None` ends the stream), an
/// [`Emission`](crate::Emission), or a `Result` of any of these.
///
/// # Example
///
/// ```ignore
/// use readstream::{read, Emitter, StreamExt};
///
/// let mut values = vec![1, 2, 3].into_iter();
/// let stream = read(move |_: Emitter<u32>| values.next());
/// let values: Vec<u32> = stream.collect::<Result<_, _>>().await?;
/// assert_eq!(values, [1, 2, 3]);
/// ```
pub fn read<T, F, R>(producer: F) -> ReadStream<T>
where
    T: Send + 'static,
    F: FnMut(Emitter<T>) -> R + Send + 'static,
    R: IntoEmission<T>,
{
    read_with(ReadOptions::default(), producer)
}

/// Creates a stream from a producer closure with explicit options.
///
/// # Arguments
///
/// * `options` - Object mode and high-water mark
/// * `producer` - Called once per cycle, see [`read`]
pub fn read_with<T, F, R>(options: ReadOptions, producer: F) -> ReadStream<T>
where
    T: Send + 'static,
    F: FnMut(Emitter<T>) -> R + Send + 'static,
    R: IntoEmission<T>,
{
    ReadStream::with_options(options, FnProducer::new(producer))
}

/// Creates a stream from an async producer closure.
///
/// Each cycle's future is driven on the ambient tokio runtime. Its output
/// is treated like a synchronous return value, and the next cycle starts
/// only after it resolves.
///
/// # Example
///
/// ```ignore
/// let mut values = vec![1, 2, 3].into_iter();
/// let stream = read_async(move |_: Emitter<u32>| {
///     let next = values.next();
///     async move { next }
/// });
/// ```
pub fn read_async<T, F, Fut, R>(producer: F) -> ReadStream<T>
where
    T: Send + 'static,
    F: FnMut(Emitter<T>) -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoEmission<T>,
{
    ReadStream::new(AsyncFnProducer::new(producer))
}

/// Creates a byte-oriented stream from a producer closure.
///
/// Unless `options` selects object mode, the high-water mark counts bytes.
pub fn read_bytes<F, R>(options: ReadOptions, producer: F) -> ReadStream<Bytes>
where
    F: FnMut(Emitter<Bytes>) -> R + Send + 'static,
    R: IntoEmission<Bytes>,
{
    ReadStream::bytes_with_options(options, FnProducer::new(producer))
}
