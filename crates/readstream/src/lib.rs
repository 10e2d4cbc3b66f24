//! Push-Based Readable Streams
//!
//! This crate turns a single "produce the next value(s)" callback into a
//! [`Stream`](futures_core::Stream) with backpressure and an exactly-once end.
//!
//! # Features
//!
//! - **Sync or async producers**: return a value, push several through the
//!   [`Emitter`], or hand back futures; all of them land in one ordered stream
//! - **One cycle at a time**: the producer is never re-invoked until every
//!   emission of its previous call has settled
//! - **Backpressure**: the producer is only asked for more while the buffer
//!   is below its high-water mark
//! - **Exactly-once end**: the end-marker is honored once, from whichever
//!   source observes it first; later emissions are dropped
//! - **External end**: [`ReadStream::end`] and [`EndSignal`] stop production
//!   immediately, even mid-cycle
//!
//! # Example
//!
//! ```ignore
//! use readstream::{read, Emitter, StreamExt};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut values = vec![1, 2, 3].into_iter();
//!     let mut stream = read(move |emitter: Emitter<u64>| {
//!         match values.next() {
//!             // Values can also arrive later
//!             Some(v) => { emitter.push_future(async move { Some(v) }); }
//!             None => { emitter.end(); }
//!         }
//!     });
//!
//!     while let Some(item) = stream.next().await {
//!         println!("Received: {}", item.unwrap());
//!     }
//! }
//! ```

mod buffer;
mod config;
mod coordinator;
mod emission;
mod end_signal;
mod error;
mod invariants;
mod producer;
mod read;
mod stream;

pub use config::{ReadOptions, DEFAULT_BYTE_HIGH_WATER_MARK, DEFAULT_OBJECT_HIGH_WATER_MARK};
pub use coordinator::Emitter;
pub use emission::{Emission, IntoEmission, PendingEmission};
pub use end_signal::EndSignal;
pub use error::{BoxError, StreamError};
pub use producer::Producer;
pub use read::{read, read_async, read_bytes, read_with};
pub use stream::ReadStream;

// Re-export useful stream combinators
pub use tokio_stream::StreamExt;
