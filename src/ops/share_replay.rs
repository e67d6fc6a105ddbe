//! Multicast with replay and auto-connect.
//!
//! `share_replay(count)` puts a [`ReplaySubject`] in front of the source.
//! Subscribers attach to the subject; the source itself is subscribed only
//! once, when the first subscriber arrives. Late subscribers receive the last
//! `count` values before live ones, and the stored completion once the source
//! has terminated.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use tracing::debug;

use crate::{publisher::Publisher, subject::ReplaySubject, subscriber::SharedSubscriber};

/// Publisher created by [`PublisherExt::share_replay`](crate::publisher::PublisherExt::share_replay).
pub struct ShareReplay<S: Publisher> {
  inner: Arc<ShareInner<S>>,
}

struct ShareInner<S: Publisher> {
  source: S,
  subject: ReplaySubject<S::Output, S::Failure>,
  connected: AtomicBool,
}

impl<S: Publisher> Clone for ShareReplay<S> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<S: Publisher> ShareReplay<S> {
  pub(crate) fn new(source: S, count: usize) -> Self {
    Self {
      inner: Arc::new(ShareInner {
        source,
        subject: ReplaySubject::new(count),
        connected: AtomicBool::new(false),
      }),
    }
  }

  pub fn is_connected(&self) -> bool { self.inner.connected.load(Ordering::Acquire) }
}

impl<S> Publisher for ShareReplay<S>
where
  S: Publisher,
  S::Output: Clone + Send + 'static,
  S::Failure: Clone + Send + 'static,
{
  type Output = S::Output;
  type Failure = S::Failure;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<S::Output, S::Failure>) {
    self.inner.subject.receive_subscriber(subscriber);
    if !self.inner.connected.swap(true, Ordering::AcqRel) {
      debug!("share_replay connecting to its source");
      self.inner.source.receive_subscriber(Arc::new(self.inner.subject.clone()));
    }
  }
}
