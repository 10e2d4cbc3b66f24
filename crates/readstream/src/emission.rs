//! The shapes a producer can hand to the stream.
//!
//! A producer may return (or emit) nothing, a value, the end-marker, or a
//! future that eventually resolves to any of these. [`Emission`] is the
//! tagged form of that choice; [`IntoEmission`] converts the return types
//! producers naturally write into it.

use crate::error::BoxError;
use pin_project_lite::pin_project;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A boxed future resolving to another emission.
pub type PendingEmission<T> =
    Pin<Box<dyn Future<Output = Result<Emission<T>, BoxError>> + Send + 'static>>;

/// One unit of producer output.
pub enum Emission<T> {
    /// No value this cycle. Not the end of the stream.
    Nothing,
    /// A value to forward to the buffer.
    Value(T),
    /// The end-marker: no more data will be produced.
    End,
    /// A value that is not ready yet. Resolved recursively until a
    /// `Nothing`, `Value` or `End` is reached.
    Pending(PendingEmission<T>),
}

impl<T: 'static> Emission<T> {
    /// Wraps a future whose output converts into an emission.
    pub fn pending<F, R>(fut: F) -> Self
    where
        F: Future<Output = R> + Send + 'static,
        R: IntoEmission<T>,
    {
        Self::Pending(Box::pin(Resolve {
            fut,
            _item: PhantomData,
        }))
    }
}

impl<T> Emission<T> {
    /// Returns `true` for the end-marker.
    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Returns `true` if the emission still has to be awaited.
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl<T> From<T> for Emission<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Emission<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("Nothing"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::End => f.write_str("End"),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Conversion from a producer's return type into an [`Emission`].
///
/// | Type | Emission |
/// |------|----------|
/// | `()` | `Nothing` |
/// | `Option<T>` | `Some(v)` → `Value(v)`, `None` → `End` |
/// | `Emission<T>` | itself |
/// | `Result<R, E>` | `Ok(r)` converts `r`, `Err(e)` fails the stream |
pub trait IntoEmission<T> {
    fn into_emission(self) -> Result<Emission<T>, BoxError>;
}

impl<T> IntoEmission<T> for Emission<T> {
    #[inline]
    fn into_emission(self) -> Result<Emission<T>, BoxError> {
        Ok(self)
    }
}

impl<T> IntoEmission<T> for () {
    #[inline]
    fn into_emission(self) -> Result<Emission<T>, BoxError> {
        Ok(Emission::Nothing)
    }
}

impl<T> IntoEmission<T> for Option<T> {
    #[inline]
    fn into_emission(self) -> Result<Emission<T>, BoxError> {
        Ok(self.map_or(Emission::End, Emission::Value))
    }
}

impl<T, R, E> IntoEmission<T> for Result<R, E>
where
    R: IntoEmission<T>,
    E: Into<BoxError>,
{
    #[inline]
    fn into_emission(self) -> Result<Emission<T>, BoxError> {
        self.map_err(Into::into)?.into_emission()
    }
}

pin_project! {
    /// Maps a future's output through [`IntoEmission`].
    struct Resolve<F, T> {
        #[pin]
        fut: F,
        _item: PhantomData<fn() -> T>,
    }
}

impl<F, R, T> Future for Resolve<F, T>
where
    F: Future<Output = R>,
    R: IntoEmission<T>,
{
    type Output = Result<Emission<T>, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().fut.poll(cx).map(IntoEmission::into_emission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert<R: IntoEmission<u32>>(r: R) -> Result<Emission<u32>, BoxError> {
        r.into_emission()
    }

    #[test]
    fn option_maps_none_to_end() {
        assert!(matches!(convert(Some(3)), Ok(Emission::Value(3))));
        assert!(matches!(convert(None::<u32>), Ok(Emission::End)));
    }

    #[test]
    fn unit_is_nothing() {
        assert!(matches!(convert(()), Ok(Emission::Nothing)));
    }

    #[test]
    fn result_propagates_error() {
        let err = convert(Err::<Option<u32>, _>("bad")).unwrap_err();
        assert_eq!(err.to_string(), "bad");
        assert!(matches!(convert(Ok::<_, BoxError>(Some(1))), Ok(Emission::Value(1))));
    }

    #[tokio::test]
    async fn pending_resolves_through_conversion() {
        let emission = Emission::<u32>::pending(async { Some(7) });
        assert!(emission.is_pending());
        let Emission::Pending(fut) = emission else {
            panic!("expected a pending emission");
        };
        assert!(matches!(fut.await, Ok(Emission::Value(7))));
    }

    #[test]
    fn debug_hides_future() {
        let emission = Emission::<u32>::pending(async {});
        assert_eq!(format!("{emission:?}"), "Pending(..)");
        assert_eq!(format!("{:?}", Emission::Value(1)), "Value(1)");
    }
}
