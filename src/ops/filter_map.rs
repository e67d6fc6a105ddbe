//! Value and failure transforms, both built on [`Sink`].

use std::{marker::PhantomData, sync::Arc};

use crate::{
  publisher::Publisher,
  sink::{Sink, SinkSubscription},
  subscriber::SharedSubscriber,
};

/// Publisher created by [`PublisherExt::filter_map`](crate::publisher::PublisherExt::filter_map).
///
/// Values mapped to `None` are dropped without consuming downstream demand.
pub struct FilterMap<S, F, Out> {
  source: S,
  transform: Arc<F>,
  _p: PhantomData<fn() -> Out>,
}

impl<S, F, Out> FilterMap<S, F, Out> {
  pub(crate) fn new(source: S, transform: F) -> Self {
    Self { source, transform: Arc::new(transform), _p: PhantomData }
  }
}

impl<S, F, Out> Publisher for FilterMap<S, F, Out>
where
  S: Publisher,
  S::Output: 'static,
  S::Failure: Send + 'static,
  Out: Send + 'static,
  F: Fn(S::Output) -> Option<Out> + Send + Sync + 'static,
{
  type Output = Out;
  type Failure = S::Failure;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<Out, S::Failure>) {
    let transform = self.transform.clone();
    let sink = Arc::new(
      Sink::new(subscriber.clone())
        .transform_value(move |value| transform(value))
        .transform_failure(Some),
    );
    subscriber.receive_subscription(Arc::new(SinkSubscription::new(sink.clone())));
    self.source.receive_subscriber(sink);
  }
}

/// Publisher created by [`PublisherExt::map_failure`](crate::publisher::PublisherExt::map_failure).
pub struct MapFailure<S, F, OutErr> {
  source: S,
  transform: Arc<F>,
  _p: PhantomData<fn() -> OutErr>,
}

impl<S, F, OutErr> MapFailure<S, F, OutErr> {
  pub(crate) fn new(source: S, transform: F) -> Self {
    Self { source, transform: Arc::new(transform), _p: PhantomData }
  }
}

impl<S, F, OutErr> Publisher for MapFailure<S, F, OutErr>
where
  S: Publisher,
  S::Output: Send + 'static,
  S::Failure: 'static,
  OutErr: Send + 'static,
  F: Fn(S::Failure) -> OutErr + Send + Sync + 'static,
{
  type Output = S::Output;
  type Failure = OutErr;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<S::Output, OutErr>) {
    let transform = self.transform.clone();
    let sink = Arc::new(
      Sink::new(subscriber.clone())
        .transform_value(Some)
        .transform_failure(move |err| Some(transform(err))),
    );
    subscriber.receive_subscription(Arc::new(SinkSubscription::new(sink.clone())));
    self.source.receive_subscriber(sink);
  }
}
