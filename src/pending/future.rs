//! Caller-side handle for a pending result.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use rmpv::Value;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::codec::MsgPackCodec;
use crate::error::{Result, TarantoolError};

/// Sending half of a pending result. Resolvable once.
pub type ResultSlot = oneshot::Sender<Result<Value>>;

/// Create a linked slot and future.
pub fn response_channel() -> (ResultSlot, ResponseFuture<Value>) {
    let (tx, rx) = oneshot::channel();
    (tx, ResponseFuture::waiting(rx, Ok))
}

enum State {
    Waiting(oneshot::Receiver<Result<Value>>),
    Ready(Option<TarantoolError>),
}

/// A result that completes when the matching response is decoded or the
/// connection fails.
///
/// Dropping it abandons interest in the result; the request itself stays
/// in flight.
#[must_use = "a ResponseFuture does nothing unless awaited"]
pub struct ResponseFuture<T> {
    state: State,
    convert: fn(Value) -> Result<T>,
}

impl<T> ResponseFuture<T> {
    pub(crate) fn waiting(
        rx: oneshot::Receiver<Result<Value>>,
        convert: fn(Value) -> Result<T>,
    ) -> Self {
        Self {
            state: State::Waiting(rx),
            convert,
        }
    }

    /// A future that is already failed, e.g. by argument validation.
    pub(crate) fn failed(err: TarantoolError, convert: fn(Value) -> Result<T>) -> Self {
        Self {
            state: State::Ready(Some(err)),
            convert,
        }
    }

    /// Re-target the conversion applied to the resolved value.
    pub(crate) fn map_value<U>(self, convert: fn(Value) -> Result<U>) -> ResponseFuture<U> {
        ResponseFuture {
            state: self.state,
            convert,
        }
    }
}

impl ResponseFuture<Value> {
    /// Deserialize the resolved payload into `U`.
    ///
    /// ```ignore
    /// let rows: Vec<(u32, String)> = client
    ///     .select(512, 0, 10, 0, IteratorType::All, &())
    ///     .decode()
    ///     .await?;
    /// ```
    pub fn decode<U: DeserializeOwned>(self) -> ResponseFuture<U> {
        self.map_value(MsgPackCodec::from_value::<U>)
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(Ok(value))) => Poll::Ready((this.convert)(value)),
                Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(err)),
                // Slot dropped without an answer: the driver went away.
                Poll::Ready(Err(_)) => Poll::Ready(Err(TarantoolError::ConnectionClosed)),
            },
            State::Ready(err) => Poll::Ready(Err(err
                .take()
                .unwrap_or(TarantoolError::ConnectionClosed))),
        }
    }
}
