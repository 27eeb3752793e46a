//! This module contains the [`Subscription`] type a consumer reads its blocks from.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::mpsc;

/// The receiving half of a consumer. It is created together with a
/// [`ConsumerHandle`](crate::ConsumerHandle) and is primarily used via its [`futures::Stream`] API.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub(crate) const fn from_receiver(receiver: mpsc::UnboundedReceiver<T>) -> Subscription<T> {
        Subscription { receiver }
    }

    /// Whether no item is currently queued.
    ///
    /// Items sent after this returns are of course not accounted for.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Takes the next queued item without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> futures::Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
