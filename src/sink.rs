//! Generic adapter between an upstream publisher and a downstream subscriber.
//!
//! A [`Sink`] subscribes itself to an upstream, runs every value and failure
//! through an optional transform, and hands the results to the downstream
//! through a [`DemandBuffer`]. Demand flows the other way: whatever the
//! downstream requests through the [`SinkSubscription`] is forwarded upstream.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::{
  completion::Completion,
  demand::Demand,
  demand_buffer::DemandBuffer,
  error::contract_violation,
  subscriber::{SharedSubscriber, Subscriber},
  subscription::{SharedSubscription, Subscription, SubscriptionExt},
};

type ValueTransform<In, Out> = Box<dyn Fn(In) -> Option<Out> + Send + Sync>;
type FailureTransform<InErr, OutErr> = Box<dyn Fn(InErr) -> Option<OutErr> + Send + Sync>;

pub struct Sink<In, InErr, Out, OutErr> {
  buffer: DemandBuffer<Out, OutErr>,
  upstream: Mutex<UpstreamState>,
  transform_value: Option<ValueTransform<In, Out>>,
  transform_failure: Option<FailureTransform<InErr, OutErr>>,
}

#[derive(Default)]
struct UpstreamState {
  subscription: Option<SharedSubscription>,
  cancelled: bool,
}

impl<In, InErr, Out, OutErr> Sink<In, InErr, Out, OutErr> {
  /// A sink without transforms. Add them with [`Sink::transform_value`] and
  /// [`Sink::transform_failure`]; a value or failure arriving without the
  /// matching transform is a contract violation.
  pub fn new(downstream: SharedSubscriber<Out, OutErr>) -> Self {
    Self {
      buffer: DemandBuffer::new(downstream),
      upstream: Mutex::new(UpstreamState::default()),
      transform_value: None,
      transform_failure: None,
    }
  }

  /// Maps upstream values; `None` filters the value out.
  pub fn transform_value<F>(mut self, transform: F) -> Self
  where
    F: Fn(In) -> Option<Out> + Send + Sync + 'static,
  {
    self.transform_value = Some(Box::new(transform));
    self
  }

  /// Maps upstream failures; `None` swallows the failure.
  pub fn transform_failure<F>(mut self, transform: F) -> Self
  where
    F: Fn(InErr) -> Option<OutErr> + Send + Sync + 'static,
  {
    self.transform_failure = Some(Box::new(transform));
    self
  }

  /// Adds downstream demand and forwards whatever becomes available upstream.
  pub fn demand(&self, demand: Demand) {
    let more = self.buffer.demand(demand);
    let upstream = self.upstream.lock().subscription.clone();
    if let Some(upstream) = upstream {
      upstream.request_if_needed(more);
    }
  }

  /// Cancels the upstream subscription. Only the first call has an effect.
  pub fn cancel_upstream(&self) {
    let subscription = {
      let mut upstream = self.upstream.lock();
      if upstream.cancelled {
        return;
      }
      upstream.cancelled = true;
      upstream.subscription.take()
    };
    if let Some(subscription) = subscription {
      trace!("sink cancelled its upstream");
      subscription.cancel();
    }
  }
}

impl<In, InErr, Out, OutErr> Drop for Sink<In, InErr, Out, OutErr> {
  fn drop(&mut self) { self.cancel_upstream() }
}

impl<In, InErr, Out, OutErr> Subscriber<In, InErr> for Sink<In, InErr, Out, OutErr>
where
  Out: Send,
  OutErr: Send,
{
  fn receive_subscription(&self, subscription: SharedSubscription) {
    {
      let mut upstream = self.upstream.lock();
      if !upstream.cancelled && upstream.subscription.is_none() {
        upstream.subscription = Some(subscription.clone());
      } else {
        drop(upstream);
        subscription.cancel();
        return;
      }
    }
    // Demand the downstream granted before the upstream arrived.
    subscription.request_if_needed(self.buffer.take_outstanding());
  }

  fn receive(&self, input: In) -> Demand {
    let Some(transform) = &self.transform_value else {
      contract_violation("Missing output transformation")
    };
    match transform(input) {
      Some(output) => self.buffer.try_buffer(output).unwrap_or(Demand::NONE),
      // The unit this value used is handed back.
      None => Demand::ONE,
    }
  }

  fn receive_completion(&self, completion: Completion<InErr>) {
    match completion {
      Completion::Finished => {
        self.buffer.try_complete(Completion::Finished);
      }
      Completion::Failure(err) => {
        let Some(transform) = &self.transform_failure else {
          contract_violation("Missing failure transformation")
        };
        match transform(err) {
          Some(err) => {
            self.buffer.try_complete(Completion::Failure(err));
          }
          None => trace!("sink swallowed an upstream failure"),
        }
      }
    }
    self.cancel_upstream();
  }
}

/// The subscription a [`Sink`] hands its downstream.
pub struct SinkSubscription<In, InErr, Out, OutErr> {
  sink: Mutex<Option<Arc<Sink<In, InErr, Out, OutErr>>>>,
}

impl<In, InErr, Out, OutErr> SinkSubscription<In, InErr, Out, OutErr> {
  pub fn new(sink: Arc<Sink<In, InErr, Out, OutErr>>) -> Self { Self { sink: Mutex::new(Some(sink)) } }
}

impl<In, InErr, Out, OutErr> Subscription for SinkSubscription<In, InErr, Out, OutErr>
where
  Sink<In, InErr, Out, OutErr>: Send + Sync,
{
  fn request(&self, demand: Demand) {
    demand.assert_non_zero();
    let sink = self.sink.lock().clone();
    if let Some(sink) = sink {
      sink.demand(demand);
    }
  }

  fn cancel(&self) {
    let sink = self.sink.lock().take();
    if let Some(sink) = sink {
      sink.cancel_upstream();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    event::Event,
    test_support::{SpySubscription, Recorder},
  };

  type Rec = Recorder<String, String>;

  fn sink_for(rec: &Arc<Rec>) -> Arc<Sink<i32, i32, String, String>> {
    Arc::new(
      Sink::new(rec.clone())
        .transform_value(|v: i32| (v % 2 == 0).then(|| v.to_string()))
        .transform_failure(|e: i32| (e > 0).then(|| format!("err {e}"))),
    )
  }

  #[test]
  fn forwards_demand_granted_before_upstream_arrives() {
    let rec = Rec::new();
    let sink = sink_for(&rec);
    sink.demand(Demand::max(3));

    let upstream = SpySubscription::new();
    sink.receive_subscription(upstream.clone());
    assert_eq!(upstream.requests(), vec![Demand::max(3)]);

    sink.demand(Demand::ONE);
    assert_eq!(upstream.requests(), vec![Demand::max(3), Demand::ONE]);
  }

  #[test]
  fn transforms_and_filters_values() {
    let rec = Rec::new();
    let sink = sink_for(&rec);
    sink.receive_subscription(SpySubscription::new());
    sink.demand(Demand::Unlimited);

    assert_eq!(sink.receive(1), Demand::ONE);
    sink.receive(2);
    sink.receive(4);
    assert_eq!(rec.values(), vec!["2".to_string(), "4".to_string()]);
  }

  #[test]
  fn finished_completes_and_cancels_upstream_once() {
    let rec = Rec::new();
    let sink = sink_for(&rec);
    let upstream = SpySubscription::new();
    sink.receive_subscription(upstream.clone());

    sink.receive_completion(Completion::Finished);
    sink.cancel_upstream();
    drop(sink);

    assert_eq!(rec.events(), vec![Event::Completed]);
    assert_eq!(upstream.cancels(), 1);
  }

  #[test]
  fn failure_is_mapped_or_swallowed() {
    let rec = Rec::new();
    let sink = sink_for(&rec);
    sink.receive_completion(Completion::Failure(3));
    assert_eq!(rec.events(), vec![Event::Error("err 3".to_string())]);

    let rec = Rec::new();
    let sink = sink_for(&rec);
    sink.receive_completion(Completion::Failure(-1));
    assert!(rec.events().is_empty());
  }

  #[test]
  fn downstream_cancel_cancels_upstream() {
    let rec = Rec::new();
    let sink = sink_for(&rec);
    let upstream = SpySubscription::new();
    sink.receive_subscription(upstream.clone());

    let subscription = SinkSubscription::new(sink);
    subscription.cancel();
    subscription.cancel();
    assert_eq!(upstream.cancels(), 1);
  }

  #[test]
  fn second_upstream_is_rejected() {
    let rec = Rec::new();
    let sink = sink_for(&rec);
    let first = SpySubscription::new();
    let second = SpySubscription::new();
    sink.receive_subscription(first.clone());
    sink.receive_subscription(second.clone());
    assert_eq!(first.cancels(), 0);
    assert_eq!(second.cancels(), 1);
  }

  #[test]
  #[should_panic(expected = "Missing output transformation")]
  fn value_without_transform_is_fatal() {
    let rec = Rec::new();
    let sink: Sink<i32, i32, String, String> = Sink::new(rec.clone());
    sink.receive(1);
  }

  #[test]
  #[should_panic(expected = "Missing failure transformation")]
  fn failure_without_transform_is_fatal() {
    let rec = Rec::new();
    let sink: Sink<i32, i32, String, String> = Sink::new(rec.clone());
    sink.receive_completion(Completion::Failure(1));
  }
}
