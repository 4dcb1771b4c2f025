// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cancellable live-read streams.

use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};

use super::backend::{DbError, ListenerRx};

/// A live stream of decoded snapshots.
///
/// The backend listener stays registered until [`Subscription::unsubscribe`]
/// is called or the subscription is dropped.
pub struct Subscription<T> {
    inner: Option<BoxStream<'static, Result<T, DbError>>>,
}

impl<T: Send + 'static> Subscription<T> {
    pub(crate) fn from_listener<E, F>(rx: ListenerRx<E>, mut map: F) -> Self
    where
        E: Send + 'static,
        F: FnMut(E) -> Result<T, DbError> + Send + 'static,
    {
        let stream = listener_stream(rx).map(move |event| event.and_then(&mut map));
        Self {
            inner: Some(stream.boxed()),
        }
    }

    /// Like [`Subscription::from_listener`], threading state across events.
    pub(crate) fn from_listener_with_state<E, S, F>(rx: ListenerRx<E>, state: S, map: F) -> Self
    where
        E: Send + 'static,
        S: Send + 'static,
        F: FnMut(&mut S, E) -> Result<T, DbError> + Send + 'static,
    {
        let stream = listener_stream(rx).scan((state, map), |(state, map), event| {
            let item = event.and_then(|e| map(state, e));
            futures_util::future::ready(Some(item))
        });
        Self {
            inner: Some(stream.boxed()),
        }
    }
}

impl<T> Subscription<T> {
    /// Release the backend listener. Further polls yield `None`.
    pub fn unsubscribe(&mut self) {
        self.inner = None;
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, DbError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut() {
            Some(stream) => stream.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

fn listener_stream<E: Send + 'static>(
    rx: ListenerRx<E>,
) -> impl Stream<Item = Result<E, DbError>> + Send + 'static {
    futures_util::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((event, rx))
    })
}

/// A document payload annotated with its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithId<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}
