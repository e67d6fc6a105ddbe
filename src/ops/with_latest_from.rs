//! Latest-value gating.
//!
//! `source.with_latest_from(other)` pairs every value of `source` with the
//! most recent value of `other`. `other` is subscribed first, eagerly and with
//! unlimited demand; only its latest value is kept. Source values arriving
//! before `other` produced anything are dropped without consuming downstream
//! demand.
//!
//! A completion or failure from either side ends the whole operator: both
//! subscriptions are cancelled and the downstream receives exactly one
//! terminal event.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::{
  completion::Completion,
  demand::Demand,
  publisher::Publisher,
  subscriber::{SharedSubscriber, Subscriber},
  subscription::{SharedSubscription, Subscription, SubscriptionExt},
};

/// Publisher created by [`PublisherExt::with_latest_from`](crate::publisher::PublisherExt::with_latest_from).
pub struct WithLatestFrom<S, O> {
  source: S,
  other: O,
}

impl<S, O> WithLatestFrom<S, O> {
  pub(crate) fn new(source: S, other: O) -> Self { Self { source, other } }
}

impl<S, O> Publisher for WithLatestFrom<S, O>
where
  S: Publisher,
  O: Publisher<Failure = S::Failure>,
  S::Output: Send + 'static,
  O::Output: Clone + Send + 'static,
  S::Failure: Send + 'static,
{
  type Output = (S::Output, O::Output);
  type Failure = S::Failure;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<Self::Output, S::Failure>) {
    let core = Arc::new(LatestCore {
      state: Mutex::new(LatestState {
        downstream: Some(subscriber.clone()),
        latest: None,
        demand: Demand::NONE,
        pending: Demand::NONE,
        source: None,
        other: None,
        terminated: false,
      }),
    });
    subscriber.receive_subscription(Arc::new(LatestSubscription(Mutex::new(Some(core.clone())))));
    self.other.receive_subscriber(Arc::new(OtherSubscriber(core.clone())));
    self.source.receive_subscriber(Arc::new(SourceSubscriber(core)));
  }
}

struct LatestCore<A, B, E> {
  state: Mutex<LatestState<A, B, E>>,
}

struct LatestState<A, B, E> {
  // Released on teardown, so a finished chain does not keep it alive.
  downstream: Option<SharedSubscriber<(A, B), E>>,
  latest: Option<B>,
  // Downstream demand not yet used up by delivered pairs.
  demand: Demand,
  // Demand to relay once the source subscription arrives.
  pending: Demand,
  source: Option<SharedSubscription>,
  other: Option<SharedSubscription>,
  terminated: bool,
}

impl<A, B, E> LatestCore<A, B, E> {
  /// Cancels both sides and hands back the downstream. Returns `None` if the
  /// operator already ended.
  fn tear_down(&self) -> Option<SharedSubscriber<(A, B), E>> {
    let (downstream, source, other) = {
      let mut state = self.state.lock();
      if state.terminated {
        return None;
      }
      state.terminated = true;
      state.latest = None;
      (state.downstream.take(), state.source.take(), state.other.take())
    };
    for subscription in [source, other].into_iter().flatten() {
      subscription.cancel();
    }
    downstream
  }

  fn terminate(&self, completion: Completion<E>) {
    if let Some(downstream) = self.tear_down() {
      trace!(failed = completion.is_failure(), "with_latest_from terminated");
      downstream.receive_completion(completion);
    }
  }
}

struct SourceSubscriber<A, B, E>(Arc<LatestCore<A, B, E>>);

impl<A, B, E> Subscriber<A, E> for SourceSubscriber<A, B, E>
where
  A: Send,
  B: Clone + Send,
  E: Send,
{
  fn receive_subscription(&self, subscription: SharedSubscription) {
    let pending = {
      let mut state = self.0.state.lock();
      if state.terminated || state.source.is_some() {
        None
      } else {
        state.source = Some(subscription.clone());
        Some(std::mem::take(&mut state.pending))
      }
    };
    match pending {
      Some(demand) => subscription.request_if_needed(demand),
      None => subscription.cancel(),
    }
  }

  fn receive(&self, input: A) -> Demand {
    let (downstream, latest) = {
      let mut state = self.0.state.lock();
      let Some(downstream) = state.downstream.clone() else {
        return Demand::NONE;
      };
      let Some(latest) = state.latest.clone() else {
        trace!("with_latest_from has no latest value yet, value dropped");
        // The unit this value used is handed back.
        return Demand::ONE;
      };
      if state.demand.is_none() {
        trace!("with_latest_from has no downstream demand, value dropped");
        return Demand::NONE;
      }
      state.demand -= 1usize;
      (downstream, latest)
    };
    let more = downstream.receive((input, latest));
    if more > Demand::NONE {
      self.0.state.lock().demand += more;
    }
    more
  }

  fn receive_completion(&self, completion: Completion<E>) { self.0.terminate(completion) }
}

struct OtherSubscriber<A, B, E>(Arc<LatestCore<A, B, E>>);

impl<A, B, E> Subscriber<B, E> for OtherSubscriber<A, B, E>
where
  A: Send,
  B: Send,
  E: Send,
{
  fn receive_subscription(&self, subscription: SharedSubscription) {
    let accepted = {
      let mut state = self.0.state.lock();
      let accepted = !state.terminated && state.other.is_none();
      if accepted {
        state.other = Some(subscription.clone());
      }
      accepted
    };
    if accepted {
      subscription.request(Demand::Unlimited);
    } else {
      subscription.cancel();
    }
  }

  fn receive(&self, input: B) -> Demand {
    let mut state = self.0.state.lock();
    if !state.terminated {
      state.latest = Some(input);
    }
    Demand::NONE
  }

  fn receive_completion(&self, completion: Completion<E>) { self.0.terminate(completion) }
}

struct LatestSubscription<A, B, E>(Mutex<Option<Arc<LatestCore<A, B, E>>>>);

impl<A, B, E> Subscription for LatestSubscription<A, B, E>
where
  A: Send,
  B: Send,
  E: Send,
{
  fn request(&self, demand: Demand) {
    demand.assert_non_zero();
    let Some(core) = self.0.lock().clone() else {
      return;
    };
    let source = {
      let mut state = core.state.lock();
      if state.terminated {
        return;
      }
      state.demand += demand;
      if state.source.is_none() {
        state.pending += demand;
      }
      state.source.clone()
    };
    if let Some(source) = source {
      source.request(demand);
    }
  }

  fn cancel(&self) {
    let core = self.0.lock().take();
    if let Some(core) = core {
      core.tear_down();
    }
  }
}
