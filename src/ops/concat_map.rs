//! Sequential flattening.
//!
//! `concat_map` turns every upstream value into an inner publisher and emits
//! the inner publishers' values strictly one publisher after the other: the
//! next inner publisher is subscribed only once the previous one finished.
//!
//! # State machine
//!
//! ```text
//!  Idle ──value──▶ Active(inner) ──inner finished, queue empty──▶ Idle
//!                      │   ▲
//!                      └───┘ inner finished, queue non-empty
//!
//!  any failure / upstream finished while idle / cancel ──▶ Finished
//! ```
//!
//! The first downstream demand asks the upstream for everything. Upstream
//! values arriving while an inner publisher is active wait in an unbounded
//! queue; a hot upstream would otherwise drop them.
//!
//! All inner publishers deliver into one [`DemandBuffer`], so the downstream
//! never receives more than it asked for while demand is relayed to whichever
//! inner publisher is current.

use std::{collections::VecDeque, marker::PhantomData, sync::Arc};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
  completion::Completion,
  demand::Demand,
  demand_buffer::DemandBuffer,
  publisher::Publisher,
  subscriber::{SharedSubscriber, Subscriber},
  subscription::{SharedSubscription, Subscription, SubscriptionExt},
};

/// Publisher created by [`PublisherExt::concat_map`](crate::publisher::PublisherExt::concat_map).
pub struct ConcatMap<S, F, P> {
  source: S,
  transform: Arc<F>,
  _p: PhantomData<fn() -> P>,
}

impl<S, F, P> ConcatMap<S, F, P> {
  pub(crate) fn new(source: S, transform: F) -> Self {
    Self { source, transform: Arc::new(transform), _p: PhantomData }
  }
}

impl<S, F, P> Publisher for ConcatMap<S, F, P>
where
  S: Publisher,
  S::Output: Send + 'static,
  S::Failure: Send + 'static,
  P: Publisher<Failure = S::Failure> + 'static,
  P::Output: Send + 'static,
  F: Fn(S::Output) -> P + Send + Sync + 'static,
{
  type Output = P::Output;
  type Failure = S::Failure;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<P::Output, S::Failure>) {
    let core = Arc::new(ConcatCore {
      transform: self.transform.clone(),
      buffer: DemandBuffer::new(subscriber.clone()),
      state: Mutex::new(ConcatState::default()),
    });
    subscriber.receive_subscription(Arc::new(ConcatSubscription(Mutex::new(Some(core.clone())))));
    self.source.receive_subscriber(Arc::new(OuterSubscriber(core)));
  }
}

// ============================================================================
// Shared core
// ============================================================================

type Transform<T, P> = Arc<dyn Fn(T) -> P + Send + Sync>;

struct ConcatCore<T, P: Publisher> {
  transform: Transform<T, P>,
  buffer: DemandBuffer<P::Output, P::Failure>,
  state: Mutex<ConcatState<T>>,
}

struct ConcatState<T> {
  upstream: Option<SharedSubscription>,
  inner: Option<SharedSubscription>,
  inner_active: bool,
  // Bumped for every inner publisher, so signals of a replaced one are ignored.
  generation: u64,
  queue: VecDeque<T>,
  started: bool,
  upstream_requested: bool,
  upstream_done: bool,
  finished: bool,
}

impl<T> Default for ConcatState<T> {
  fn default() -> Self {
    Self {
      upstream: None,
      inner: None,
      inner_active: false,
      generation: 0,
      queue: VecDeque::new(),
      started: false,
      upstream_requested: false,
      upstream_done: false,
      finished: false,
    }
  }
}

impl<T> ConcatState<T> {
  /// The upstream, the one time it should be asked for values.
  fn upstream_request(&mut self) -> Option<SharedSubscription> {
    if !self.started || self.finished || self.upstream_requested {
      return None;
    }
    let upstream = self.upstream.clone()?;
    self.upstream_requested = true;
    Some(upstream)
  }

  fn is_current(&self, generation: u64) -> bool {
    !self.finished && self.inner_active && self.generation == generation
  }
}

impl<T, P> ConcatCore<T, P>
where
  T: Send + 'static,
  P: Publisher + 'static,
  P::Output: Send + 'static,
  P::Failure: Send + 'static,
{
  fn start_inner(self: &Arc<Self>, value: T, generation: u64) {
    trace!(generation, "concat_map starting inner publisher");
    let publisher = (self.transform)(value);
    publisher.receive_subscriber(Arc::new(InnerSubscriber { core: self.clone(), generation }));
  }

  fn downstream_demand(&self, demand: Demand) {
    let more = self.buffer.demand(demand);
    let (inner, upstream) = {
      let mut state = self.state.lock();
      if state.finished {
        return;
      }
      state.started = true;
      let inner = if state.inner_active { state.inner.clone() } else { None };
      (inner, state.upstream_request())
    };
    if let Some(inner) = inner {
      inner.request_if_needed(more);
    }
    if let Some(upstream) = upstream {
      upstream.request(Demand::Unlimited);
    }
  }

  fn cancel(&self) {
    let (upstream, inner) = {
      let mut state = self.state.lock();
      if state.finished {
        return;
      }
      state.finished = true;
      state.queue.clear();
      (state.upstream.take(), state.inner.take())
    };
    trace!("concat_map cancelled");
    for subscription in [upstream, inner].into_iter().flatten() {
      subscription.cancel();
    }
  }

  fn fail(&self, mut state: parking_lot::MutexGuard<'_, ConcatState<T>>, err: P::Failure) {
    state.finished = true;
    state.queue.clear();
    let upstream = state.upstream.take();
    let inner = state.inner.take();
    drop(state);
    for subscription in [upstream, inner].into_iter().flatten() {
      subscription.cancel();
    }
    self.buffer.try_complete(Completion::Failure(err));
  }
}

// ============================================================================
// Upstream side
// ============================================================================

struct OuterSubscriber<T, P: Publisher>(Arc<ConcatCore<T, P>>);

impl<T, P> Subscriber<T, P::Failure> for OuterSubscriber<T, P>
where
  T: Send + 'static,
  P: Publisher + 'static,
  P::Output: Send + 'static,
  P::Failure: Send + 'static,
{
  fn receive_subscription(&self, subscription: SharedSubscription) {
    let request = {
      let mut state = self.0.state.lock();
      if state.finished || state.upstream.is_some() {
        None
      } else {
        state.upstream = Some(subscription.clone());
        Some(state.upstream_request())
      }
    };
    match request {
      None => subscription.cancel(),
      Some(Some(upstream)) => upstream.request(Demand::Unlimited),
      Some(None) => {}
    }
  }

  fn receive(&self, input: T) -> Demand {
    let generation = {
      let mut state = self.0.state.lock();
      if state.finished {
        return Demand::NONE;
      }
      if state.inner_active {
        state.queue.push_back(input);
        trace!(queued = state.queue.len(), "concat_map queued upstream value");
        return Demand::NONE;
      }
      state.inner_active = true;
      state.generation += 1;
      state.generation
    };
    self.0.start_inner(input, generation);
    Demand::NONE
  }

  fn receive_completion(&self, completion: Completion<P::Failure>) {
    let mut state = self.0.state.lock();
    if state.finished {
      return;
    }
    state.upstream = None;
    match completion {
      Completion::Failure(err) => self.0.fail(state, err),
      Completion::Finished => {
        state.upstream_done = true;
        if state.inner_active {
          trace!("concat_map upstream finished, waiting for inner publisher");
          return;
        }
        state.finished = true;
        drop(state);
        self.0.buffer.try_complete(Completion::Finished);
      }
    }
  }
}

// ============================================================================
// Inner side
// ============================================================================

struct InnerSubscriber<T, P: Publisher> {
  core: Arc<ConcatCore<T, P>>,
  generation: u64,
}

impl<T, P> Subscriber<P::Output, P::Failure> for InnerSubscriber<T, P>
where
  T: Send + 'static,
  P: Publisher + 'static,
  P::Output: Send + 'static,
  P::Failure: Send + 'static,
{
  fn receive_subscription(&self, subscription: SharedSubscription) {
    {
      let mut state = self.core.state.lock();
      if !state.is_current(self.generation) || state.inner.is_some() {
        drop(state);
        subscription.cancel();
        return;
      }
      state.inner = Some(subscription.clone());
    }
    // Everything the downstream is still owed goes to the new inner publisher.
    subscription.request_if_needed(self.core.buffer.take_outstanding());
  }

  fn receive(&self, input: P::Output) -> Demand {
    if !self.core.state.lock().is_current(self.generation) {
      return Demand::NONE;
    }
    self.core.buffer.try_buffer(input).unwrap_or(Demand::NONE)
  }

  fn receive_completion(&self, completion: Completion<P::Failure>) {
    let mut state = self.core.state.lock();
    if !state.is_current(self.generation) {
      return;
    }
    state.inner = None;
    match completion {
      Completion::Failure(err) => self.core.fail(state, err),
      Completion::Finished => {
        if let Some(next) = state.queue.pop_front() {
          state.generation += 1;
          let generation = state.generation;
          drop(state);
          self.core.start_inner(next, generation);
          return;
        }
        state.inner_active = false;
        if state.upstream_done {
          state.finished = true;
          drop(state);
          trace!("concat_map finished");
          self.core.buffer.try_complete(Completion::Finished);
        }
      }
    }
  }
}

// ============================================================================
// Downstream side
// ============================================================================

struct ConcatSubscription<T, P: Publisher>(Mutex<Option<Arc<ConcatCore<T, P>>>>);

impl<T, P> Subscription for ConcatSubscription<T, P>
where
  T: Send + 'static,
  P: Publisher + 'static,
  P::Output: Send + 'static,
  P::Failure: Send + 'static,
{
  fn request(&self, demand: Demand) {
    demand.assert_non_zero();
    let core = self.0.lock().clone();
    if let Some(core) = core {
      core.downstream_demand(demand);
    }
  }

  fn cancel(&self) {
    let core = self.0.lock().take();
    if let Some(core) = core {
      core.cancel();
    }
  }
}
