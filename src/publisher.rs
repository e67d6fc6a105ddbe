//! The producer side of the protocol and the combinator surface.

use std::sync::Arc;

use crate::{
  completion::Completion,
  event::{Event, ObserverType},
  ops::{
    concat_map::ConcatMap,
    filter_map::{FilterMap, MapFailure},
    share_replay::ShareReplay,
    with_latest_from::WithLatestFrom,
  },
  subscriber::{FnSubscriber, SharedSubscriber, Subscriber},
  subscription::SubscriptionHandle,
};

// ============================================================================
// Publisher Trait
// ============================================================================

/// Something that produces values for subscribers on demand.
///
/// `receive_subscriber` must hand the subscriber a subscription before
/// anything else, and may then deliver at most as many values as were
/// requested through it, followed by at most one completion.
pub trait Publisher: Send + Sync {
  type Output;
  type Failure;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<Self::Output, Self::Failure>);
}

/// Type-erased publisher.
pub type BoxedPublisher<T, E> = Arc<dyn Publisher<Output = T, Failure = E>>;

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
  type Output = P::Output;
  type Failure = P::Failure;

  #[inline]
  fn receive_subscriber(&self, subscriber: SharedSubscriber<Self::Output, Self::Failure>) {
    (**self).receive_subscriber(subscriber)
  }
}

// ============================================================================
// PublisherExt - Combinators
// ============================================================================

pub trait PublisherExt: Publisher + Sized + 'static {
  /// Attaches `subscriber` to this publisher.
  fn subscribe<S>(&self, subscriber: S)
  where
    S: Subscriber<Self::Output, Self::Failure> + 'static,
  {
    self.receive_subscriber(Arc::new(subscriber))
  }

  /// Subscribes with closures and unlimited demand.
  fn sink<F, C>(&self, on_value: F, on_completion: C) -> SubscriptionHandle
  where
    Self::Output: Send + 'static,
    Self::Failure: Send + 'static,
    F: FnMut(Self::Output) + Send + 'static,
    C: FnOnce(Completion<Self::Failure>) + Send + 'static,
  {
    let subscriber = FnSubscriber::new(on_value, on_completion);
    let handle = subscriber.handle();
    self.subscribe(subscriber);
    handle
  }

  /// Forwards everything into `observer` with unlimited demand.
  fn bind<O>(&self, observer: O) -> SubscriptionHandle
  where
    Self::Output: Send + 'static,
    Self::Failure: Send + 'static,
    O: ObserverType<Self::Output, Self::Failure> + 'static,
  {
    let observer = Arc::new(observer);
    let c_observer = observer.clone();
    self.sink(
      move |value| observer.on(Event::Next(value)),
      move |completion| c_observer.on(completion.into()),
    )
  }

  /// Maps every value to an inner publisher and emits the inner publishers'
  /// values one publisher after the other.
  fn concat_map<P, F>(self, transform: F) -> ConcatMap<Self, F, P>
  where
    P: Publisher<Failure = Self::Failure> + 'static,
    F: Fn(Self::Output) -> P + Send + Sync + 'static,
  {
    ConcatMap::new(self, transform)
  }

  /// Pairs every value with the latest value of `other`. Values arriving
  /// before `other` produced anything are dropped.
  fn with_latest_from<O>(self, other: O) -> WithLatestFrom<Self, O>
  where
    O: Publisher<Failure = Self::Failure> + 'static,
  {
    WithLatestFrom::new(self, other)
  }

  /// Transforms values, dropping those mapped to `None`.
  fn filter_map<Out, F>(self, transform: F) -> FilterMap<Self, F, Out>
  where
    F: Fn(Self::Output) -> Option<Out> + Send + Sync + 'static,
  {
    FilterMap::new(self, transform)
  }

  /// Transforms the failure type.
  fn map_failure<OutErr, F>(self, transform: F) -> MapFailure<Self, F, OutErr>
  where
    F: Fn(Self::Failure) -> OutErr + Send + Sync + 'static,
  {
    MapFailure::new(self, transform)
  }

  /// Shares one upstream subscription between all subscribers, replaying the
  /// last `count` values to late ones. Connects on the first subscriber.
  fn share_replay(self, count: usize) -> ShareReplay<Self>
  where
    Self::Output: Clone + Send + 'static,
    Self::Failure: Clone + Send + 'static,
  {
    ShareReplay::new(self, count)
  }

  /// Converts into a `futures::Stream` that pulls one value at a time.
  #[cfg(feature = "stream")]
  fn into_stream(self) -> crate::ops::into_stream::PublisherStream<Self::Output, Self::Failure>
  where
    Self::Output: Send + 'static,
    Self::Failure: Send + 'static,
  {
    crate::ops::into_stream::PublisherStream::new(&self)
  }
}

impl<P: Publisher + Sized + 'static> PublisherExt for P {}
