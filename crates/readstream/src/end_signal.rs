//! Ending a stream from outside the producer.

use crate::coordinator::Terminate;
use std::fmt;
use std::sync::Arc;

/// A cloneable handle that pushes the end-marker into a stream.
///
/// Obtained from [`ReadStream::end_signal`](crate::ReadStream::end_signal).
/// The end takes effect immediately, even mid-cycle: anything the producer
/// emits afterwards is dropped, no further cycles start, and the consumer
/// sees the end once already-buffered values are drained.
///
/// Multiple clones can trigger the end - only the first one has effect,
/// subsequent calls are no-ops.
#[derive(Clone)]
pub struct EndSignal {
    target: Arc<dyn Terminate>,
}

impl EndSignal {
    pub(crate) fn new(target: Arc<dyn Terminate>) -> Self {
        Self { target }
    }

    /// Ends the stream. Returns `true` if this call ended it.
    ///
    /// Never blocks and never fails.
    pub fn end(&self) -> bool {
        self.target.terminate()
    }

    /// Returns `true` once the stream has ended, for any reason.
    pub fn is_ended(&self) -> bool {
        self.target.is_terminated()
    }
}

impl fmt::Debug for EndSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndSignal")
            .field("ended", &self.is_ended())
            .finish()
    }
}
