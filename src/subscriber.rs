//! Subscriber trait and the closure-backed subscriber.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::{Mutex, MutexGuard};

use crate::{
  completion::Completion,
  demand::Demand,
  subscription::{SharedSubscription, SubscriptionHandle},
};

// ============================================================================
// Subscriber Trait
// ============================================================================

/// The consumer side of the protocol.
///
/// A subscriber first receives its subscription, then zero or more values,
/// then at most one completion. Every value consumes one unit of the demand the
/// subscriber requested; the returned [`Demand`] adds to it.
///
/// Methods take `&self` because a subscriber is shared with the publisher that
/// feeds it, so implementations keep their mutable state behind a lock and
/// must not hold it while calling back out.
pub trait Subscriber<Input, Failure>: Send + Sync {
  fn receive_subscription(&self, subscription: SharedSubscription);

  /// Receives one value and returns how much *additional* demand the
  /// subscriber is now willing to accept (may be zero).
  fn receive(&self, input: Input) -> Demand;

  /// Receives the terminal event. Called at most once.
  fn receive_completion(&self, completion: Completion<Failure>);
}

/// Reference-counted subscriber, the form in which publishers hold their
/// downstream.
pub type SharedSubscriber<Input, Failure> = Arc<dyn Subscriber<Input, Failure>>;

impl<S, Input, Failure> Subscriber<Input, Failure> for Arc<S>
where
  S: Subscriber<Input, Failure> + ?Sized,
{
  #[inline]
  fn receive_subscription(&self, subscription: SharedSubscription) {
    (**self).receive_subscription(subscription)
  }

  #[inline]
  fn receive(&self, input: Input) -> Demand { (**self).receive(input) }

  #[inline]
  fn receive_completion(&self, completion: Completion<Failure>) {
    (**self).receive_completion(completion)
  }
}

// ============================================================================
// FnSubscriber - Closure adapter
// ============================================================================

type ValueHandler<T> = Box<dyn FnMut(T) + Send>;
type CompletionHandler<E> = Box<dyn FnOnce(Completion<E>) + Send>;

/// A subscriber that requests unlimited demand and hands every value to a
/// closure.
///
/// No lock is held while the closures run. A value or completion arriving
/// while a closure is running (from inside it, or from another thread) is
/// queued and handed over once the closure returns, so the closures never run
/// concurrently and always see values in arrival order.
pub struct FnSubscriber<T, E> {
  state: Mutex<FnState<T, E>>,
  initial_demand: Demand,
  handle: SubscriptionHandle,
}

struct FnState<T, E> {
  on_value: Option<ValueHandler<T>>,
  on_completion: Option<CompletionHandler<E>>,
  pending: VecDeque<T>,
  completion: Option<Completion<E>>,
  draining: bool,
}

impl<T, E> FnSubscriber<T, E> {
  pub fn new<F, C>(on_value: F, on_completion: C) -> Self
  where
    F: FnMut(T) + Send + 'static,
    C: FnOnce(Completion<E>) + Send + 'static,
  {
    Self::with_demand(Demand::Unlimited, on_value, on_completion)
  }

  /// Like [`FnSubscriber::new`] but starts with a bounded demand; more can be
  /// requested through [`FnSubscriber::handle`].
  pub fn with_demand<F, C>(initial_demand: Demand, on_value: F, on_completion: C) -> Self
  where
    F: FnMut(T) + Send + 'static,
    C: FnOnce(Completion<E>) + Send + 'static,
  {
    Self {
      state: Mutex::new(FnState {
        on_value: Some(Box::new(on_value)),
        on_completion: Some(Box::new(on_completion)),
        pending: VecDeque::new(),
        completion: None,
        draining: false,
      }),
      initial_demand,
      handle: SubscriptionHandle::new(),
    }
  }

  /// Handle controlling the subscription this subscriber receives.
  pub fn handle(&self) -> SubscriptionHandle { self.handle.clone() }

  /// Becomes the drainer unless somebody else already is.
  fn enter(&self, mut state: MutexGuard<'_, FnState<T, E>>) {
    if state.draining {
      return;
    }
    state.draining = true;
    drop(state);
    self.drain();
  }

  fn drain(&self) {
    loop {
      let mut state = self.state.lock();
      if let Some(value) = state.pending.pop_front() {
        let mut on_value = state.on_value.take();
        drop(state);
        if let Some(handler) = on_value.as_mut() {
          // Cancelled from inside an earlier call.
          if !self.handle.is_closed() {
            handler(value);
          }
        }
        self.state.lock().on_value = on_value;
        continue;
      }

      let completion = state.completion.take();
      let on_completion = if completion.is_some() { state.on_completion.take() } else { None };
      state.draining = false;
      drop(state);
      if let Some(completion) = completion {
        self.handle.release();
        if let Some(handler) = on_completion {
          handler(completion);
        }
      }
      return;
    }
  }
}

impl<T: Send, E: Send> Subscriber<T, E> for FnSubscriber<T, E> {
  fn receive_subscription(&self, subscription: SharedSubscription) {
    if self.handle.attach(subscription.clone()) && !self.initial_demand.is_none() {
      subscription.request(self.initial_demand);
    }
  }

  fn receive(&self, input: T) -> Demand {
    if !self.handle.is_closed() {
      let mut state = self.state.lock();
      state.pending.push_back(input);
      self.enter(state);
    }
    Demand::NONE
  }

  fn receive_completion(&self, completion: Completion<E>) {
    let mut state = self.state.lock();
    if state.on_completion.is_none() || state.completion.is_some() {
      return;
    }
    state.completion = Some(completion);
    self.enter(state);
  }
}
