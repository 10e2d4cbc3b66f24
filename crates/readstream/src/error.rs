//! Error types for readstream operations.

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by producers and their pending emissions.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced to the consumer of a [`ReadStream`](crate::ReadStream).
///
/// A stream reports at most one error, after which it yields `None`.
/// Sources are held behind `Arc` so the error can be cloned into every
/// place that observes the fault.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The producer failed while running its synchronous body.
    #[error("producer failed: {0}")]
    Producer(#[source] Arc<dyn StdError + Send + Sync + 'static>),

    /// A pending emission (emitted or returned) resolved to an error.
    #[error("pending emission rejected: {0}")]
    Rejected(#[source] Arc<dyn StdError + Send + Sync + 'static>),

    /// The producer or one of its pending emissions panicked.
    #[error("producer panicked: {0}")]
    Panicked(Arc<str>),

    /// A pending emission was produced outside of a tokio runtime.
    #[error("no async runtime available to drive a pending emission")]
    NoRuntime,
}

impl StreamError {
    pub(crate) fn producer(err: BoxError) -> Self {
        Self::Producer(Arc::from(err))
    }

    pub(crate) fn rejected(err: BoxError) -> Self {
        Self::Rejected(Arc::from(err))
    }

    /// Builds a [`StreamError::Panicked`] from a caught panic payload.
    pub(crate) fn panicked(payload: &(dyn Any + Send)) -> Self {
        let message: Arc<str> = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).into()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.as_str().into()
        } else {
            "non-string panic payload".into()
        };
        Self::Panicked(message)
    }

    /// Returns `true` if the failure came from user code rather than the
    /// environment the stream runs in.
    #[inline]
    pub fn is_producer_fault(&self) -> bool {
        matches!(self, Self::Producer(_) | Self::Rejected(_) | Self::Panicked(_))
    }

    /// Returns `true` for every variant: no stream error is recoverable.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_source() {
        let err = StreamError::producer("boom".into());
        assert_eq!(err.to_string(), "producer failed: boom");

        let err = StreamError::rejected("late".into());
        assert_eq!(err.to_string(), "pending emission rejected: late");
        assert!(err.source().is_some());
    }

    #[test]
    fn classification() {
        assert!(StreamError::producer("x".into()).is_producer_fault());
        assert!(!StreamError::NoRuntime.is_producer_fault());
        assert!(StreamError::NoRuntime.is_terminal());
    }

    #[test]
    fn panic_payloads() {
        let err = StreamError::panicked(&"sensor offline");
        assert_eq!(err.to_string(), "producer panicked: sensor offline");
        assert!(err.is_producer_fault());

        let err = StreamError::panicked(&String::from("formatted 7"));
        assert_eq!(err.to_string(), "producer panicked: formatted 7");

        let err = StreamError::panicked(&42_u8);
        assert_eq!(err.to_string(), "producer panicked: non-string panic payload");
    }
}
