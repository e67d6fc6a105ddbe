use std::{
  collections::VecDeque,
  sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
  completion::Completion,
  conduit::{broadcast_completion, broadcast_value, Conduit, ConduitId, ConduitList},
  demand::Demand,
  demand_buffer::DemandBuffer,
  event::{Event, ObserverType},
  publisher::Publisher,
  subscriber::{SharedSubscriber, Subscriber},
  subscription::{SharedSubscription, Subscription},
};

/// A multicast subject that remembers the last `buffer_size` values.
///
/// Every subscriber gets its own [`DemandBuffer`]. On subscribe the remembered
/// values are queued into it first, so a late subscriber always sees the
/// history (oldest first) before any live value, each delivered only as its
/// demand allows. After termination, new subscribers receive the history
/// followed by the stored completion.
///
/// As a subscriber, the subject requests unlimited demand from every upstream
/// right away.
pub struct ReplaySubject<T, E> {
  inner: Arc<ReplayInner<T, E>>,
}

struct ReplayInner<T, E> {
  buffer_size: usize,
  state: Mutex<ReplayState<T, E>>,
}

struct ReplayState<T, E> {
  active: bool,
  completion: Option<Completion<E>>,
  history: VecDeque<T>,
  conduits: ConduitList<ReplayConduit<T, E>>,
  upstream: Vec<SharedSubscription>,
}

impl<T, E> Clone for ReplaySubject<T, E> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T, E> ReplaySubject<T, E> {
  pub fn new(buffer_size: usize) -> Self {
    Self {
      inner: Arc::new(ReplayInner {
        buffer_size,
        state: Mutex::new(ReplayState {
          active: true,
          completion: None,
          history: VecDeque::with_capacity(buffer_size),
          conduits: ConduitList::new(),
          upstream: vec![],
        }),
      }),
    }
  }

  #[inline]
  pub fn buffer_size(&self) -> usize { self.inner.buffer_size }

  pub fn has_subscribers(&self) -> bool { !self.inner.state.lock().conduits.is_empty() }

  pub fn subscriber_count(&self) -> usize { self.inner.state.lock().conduits.len() }

  pub fn is_terminated(&self) -> bool { !self.inner.state.lock().active }
}

impl<T: Clone + Send, E: Clone + Send> ReplaySubject<T, E> {
  /// Records `value` in the history and fans it out. A no-op once terminated.
  pub fn send(&self, value: T) {
    let snapshot = {
      let mut state = self.inner.state.lock();
      if !state.active {
        return;
      }
      if self.inner.buffer_size > 0 {
        if state.history.len() == self.inner.buffer_size {
          state.history.pop_front();
          trace!(buffer_size = self.inner.buffer_size, "replay history full, oldest evicted");
        }
        state.history.push_back(value.clone());
      }
      state.conduits.snapshot()
    };
    broadcast_value::<T, E, _>(&snapshot, value);
  }

  /// Terminates the subject. Only the first completion has any effect.
  pub fn send_completion(&self, completion: Completion<E>) {
    let snapshot = {
      let mut state = self.inner.state.lock();
      if !state.active {
        return;
      }
      state.active = false;
      state.completion = Some(completion.clone());
      state.conduits.take()
    };
    debug!(subscribers = snapshot.len(), "replay subject terminated");
    broadcast_completion::<T, E, _>(&snapshot, completion);
  }
}

impl<T, E> ReplayInner<T, E> {
  fn disassociate(&self, id: ConduitId) {
    let removed = self.state.lock().conduits.remove(id);
    if removed.is_some() {
      trace!(conduit = %id, "replay conduit removed");
    }
  }
}

impl<T, E> Drop for ReplayInner<T, E> {
  fn drop(&mut self) {
    for subscription in self.state.get_mut().upstream.drain(..) {
      subscription.cancel();
    }
  }
}

impl<T, E> Publisher for ReplaySubject<T, E>
where
  T: Clone + Send + 'static,
  E: Clone + Send + 'static,
{
  type Output = T;
  type Failure = E;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<T, E>) {
    let buffer = Arc::new(DemandBuffer::new(subscriber.clone()));

    let (conduit, completion) = {
      let mut state = self.inner.state.lock();
      // Without demand yet, this only queues.
      for value in state.history.iter() {
        buffer.buffer(value.clone());
      }
      let id = state.conduits.reserve_id();
      let conduit = Arc::new(ReplayConduit {
        id,
        parent: Arc::downgrade(&self.inner),
        state: Mutex::new(ReplayConduitState {
          buffer: Some(buffer),
          subscribed: false,
          pending: None,
        }),
      });
      if state.active {
        state.conduits.insert(id, conduit.clone());
      }
      (conduit, state.completion.clone())
    };

    subscriber.receive_subscription(conduit.clone());
    conduit.mark_subscribed();
    if let Some(completion) = completion {
      conduit.finish(completion);
    }
  }
}

impl<T, E> Subscriber<T, E> for ReplaySubject<T, E>
where
  T: Clone + Send,
  E: Clone + Send,
{
  fn receive_subscription(&self, subscription: SharedSubscription) {
    let accepted = {
      let mut state = self.inner.state.lock();
      if state.active {
        state.upstream.push(subscription.clone());
      }
      state.active
    };
    if accepted {
      subscription.request(Demand::Unlimited);
    } else {
      subscription.cancel();
    }
  }

  fn receive(&self, input: T) -> Demand {
    self.send(input);
    Demand::NONE
  }

  fn receive_completion(&self, completion: Completion<E>) { self.send_completion(completion) }
}

impl<T, E> ObserverType<T, E> for ReplaySubject<T, E>
where
  T: Clone + Send,
  E: Clone + Send,
{
  fn on(&self, event: Event<T, E>) {
    match event {
      Event::Next(value) => self.send(value),
      Event::Error(err) => self.send_completion(Completion::Failure(err)),
      Event::Completed => self.send_completion(Completion::Finished),
    }
  }
}

// ============================================================================
// ReplayConduit
// ============================================================================

/// One downstream subscriber of a [`ReplaySubject`], delivering through its
/// own [`DemandBuffer`].
pub struct ReplayConduit<T, E> {
  id: ConduitId,
  parent: Weak<ReplayInner<T, E>>,
  state: Mutex<ReplayConduitState<T, E>>,
}

struct ReplayConduitState<T, E> {
  buffer: Option<Arc<DemandBuffer<T, E>>>,
  subscribed: bool,
  // A completion that arrived before the subscriber got its subscription.
  pending: Option<Completion<E>>,
}

impl<T, E> ReplayConduit<T, E> {
  pub fn id(&self) -> ConduitId { self.id }

  fn mark_subscribed(&self) {
    let (buffer, pending) = {
      let mut state = self.state.lock();
      state.subscribed = true;
      (state.buffer.clone(), state.pending.take())
    };
    if let (Some(buffer), Some(completion)) = (buffer, pending) {
      buffer.try_complete(completion);
      self.release_if_terminated(&buffer);
    }
  }

  /// Drops the buffer once the subscriber has seen its completion, which
  /// breaks the subscriber → subscription → buffer → subscriber cycle.
  fn release_if_terminated(&self, buffer: &DemandBuffer<T, E>) {
    if buffer.is_terminated() {
      self.state.lock().buffer = None;
    }
  }
}

impl<T, E> Subscription for ReplayConduit<T, E>
where
  T: Send,
  E: Send,
{
  fn request(&self, demand: Demand) {
    demand.assert_non_zero();
    let buffer = self.state.lock().buffer.clone();
    if let Some(buffer) = buffer {
      buffer.demand(demand);
      self.release_if_terminated(&buffer);
    }
  }

  fn cancel(&self) {
    let buffer = self.state.lock().buffer.take();
    if buffer.is_some() {
      if let Some(parent) = self.parent.upgrade() {
        parent.disassociate(self.id);
      }
    }
  }
}

impl<T, E> Conduit<T, E> for ReplayConduit<T, E>
where
  T: Send,
  E: Send,
{
  fn offer(&self, value: T) {
    let buffer = self.state.lock().buffer.clone();
    if let Some(buffer) = buffer {
      buffer.try_buffer(value);
    }
  }

  fn finish(&self, completion: Completion<E>) {
    let buffer = {
      let mut state = self.state.lock();
      if !state.subscribed {
        state.pending = Some(completion);
        return;
      }
      state.buffer.clone()
    };
    if let Some(buffer) = buffer {
      buffer.try_complete(completion);
      self.release_if_terminated(&buffer);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{SpySubscription, Recorder};

  type Rec = Recorder<&'static str, &'static str>;
  type Subj = ReplaySubject<&'static str, &'static str>;

  #[test]
  fn late_subscriber_sees_bounded_history() {
    let subject = Subj::new(2);
    subject.send("A");
    subject.send("B");
    subject.send("C");

    let late = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(late.clone());
    assert_eq!(late.values(), vec!["B", "C"]);

    subject.send("D");
    assert_eq!(late.values(), vec!["B", "C", "D"]);
  }

  #[test]
  fn history_is_delivered_before_live_values() {
    let subject = Subj::new(3);
    subject.send("A");
    subject.send("B");

    let rec = Rec::new();
    subject.receive_subscriber(rec.clone());
    subject.send("live");

    rec.request(Demand::ONE);
    assert_eq!(rec.values(), vec!["A"]);
    rec.request(Demand::max(5));
    assert_eq!(rec.values(), vec!["A", "B", "live"]);
  }

  #[test]
  fn terminated_subject_replays_then_completes() {
    let subject = Subj::new(2);
    subject.send("A");
    subject.send_completion(Completion::Failure("boom"));

    let late = Rec::new();
    subject.receive_subscriber(late.clone());
    assert!(late.events().is_empty());
    assert_eq!(subject.subscriber_count(), 0);

    late.request(Demand::ONE);
    assert_eq!(late.events(), vec![Event::Next("A"), Event::Error("boom")]);
  }

  #[test]
  fn completion_without_history_is_immediate() {
    let subject = Subj::new(0);
    subject.send("A");
    subject.send_completion(Completion::Finished);

    let late = Rec::new();
    subject.receive_subscriber(late.clone());
    assert_eq!(late.events(), vec![Event::Completed]);
  }

  #[test]
  fn live_completion_waits_for_pending_values() {
    let subject = Subj::new(4);
    let rec = Rec::new();
    subject.receive_subscriber(rec.clone());

    subject.send("A");
    subject.send_completion(Completion::Finished);
    subject.send_completion(Completion::Failure("late"));
    assert!(rec.events().is_empty());

    rec.request(Demand::ONE);
    assert_eq!(rec.events(), vec![Event::Next("A"), Event::Completed]);
  }

  #[test]
  fn cancel_removes_conduit() {
    let subject = Subj::new(1);
    let rec = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(rec.clone());
    assert!(subject.has_subscribers());

    rec.cancel();
    subject.send("A");

    assert!(!subject.has_subscribers());
    assert!(rec.values().is_empty());
  }

  #[test]
  fn requests_unlimited_from_upstream_immediately() {
    let subject = Subj::new(1);
    let upstream = SpySubscription::new();
    subject.receive_subscription(upstream.clone());
    assert_eq!(upstream.requests(), vec![Demand::Unlimited]);

    subject.send_completion(Completion::Finished);
    let late_upstream = SpySubscription::new();
    subject.receive_subscription(late_upstream.clone());
    assert_eq!(late_upstream.cancels(), 1);
  }

  #[test]
  fn subscribers_are_independent() {
    let subject = Subj::new(2);
    let fast = Rec::with_demand(Demand::Unlimited);
    let slow = Rec::new();
    subject.receive_subscriber(fast.clone());
    subject.receive_subscriber(slow.clone());

    subject.send("A");
    subject.send("B");
    assert_eq!(fast.values(), vec!["A", "B"]);
    assert!(slow.values().is_empty());

    slow.request(Demand::max(2));
    assert_eq!(slow.values(), vec!["A", "B"]);
  }

  #[test]
  fn receive_reply_drains_history() {
    let subject = Subj::new(3);
    for v in ["A", "B", "C"] {
      subject.send(v);
    }
    let rec = Rec::with_demand(Demand::ONE);
    rec.reply_with(Demand::ONE);
    subject.receive_subscriber(rec.clone());
    assert_eq!(rec.values(), vec!["A", "B", "C"]);
  }
}
