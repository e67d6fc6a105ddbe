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
  event::{Event, ObserverType},
  publisher::Publisher,
  subscriber::{SharedSubscriber, Subscriber},
  subscription::{EmptySubscription, SharedSubscription, Subscription},
};

/// A hot multicast subject.
///
/// Values are delivered only to subscribers that have outstanding demand at
/// the time of the send; the others silently miss them. The subject starts
/// pulling from its own upstreams (with unlimited demand) the first time any
/// of its subscribers requests something.
///
/// Cloning yields another handle to the same subject. Dropping the last handle
/// cancels the upstream subscriptions the subject holds.
///
/// # Examples
///
/// ```rust
/// use rxdemand::prelude::*;
///
/// let subject = PublishSubject::<i32, ()>::new();
/// let values = std::sync::Arc::new(parking_lot::Mutex::new(vec![]));
/// let c_values = values.clone();
/// let _handle = subject.sink(move |v| c_values.lock().push(v), |_| {});
///
/// subject.send(1);
/// subject.send(2);
/// subject.send_completion(Completion::Finished);
/// assert_eq!(*values.lock(), vec![1, 2]);
/// ```
pub struct PublishSubject<T, E> {
  inner: Arc<SubjectInner<T, E>>,
}

struct SubjectInner<T, E> {
  state: Mutex<SubjectState<T, E>>,
}

struct SubjectState<T, E> {
  active: bool,
  completion: Option<Completion<E>>,
  conduits: ConduitList<PublishConduit<T, E>>,
  upstream: Vec<SharedSubscription>,
  has_downstream_demand: bool,
}

impl<T, E> Clone for PublishSubject<T, E> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T, E> Default for PublishSubject<T, E> {
  fn default() -> Self {
    Self {
      inner: Arc::new(SubjectInner {
        state: Mutex::new(SubjectState {
          active: true,
          completion: None,
          conduits: ConduitList::new(),
          upstream: vec![],
          has_downstream_demand: false,
        }),
      }),
    }
  }
}

impl<T, E> PublishSubject<T, E> {
  pub fn new() -> Self { Self::default() }

  pub fn has_subscribers(&self) -> bool { !self.inner.state.lock().conduits.is_empty() }

  pub fn subscriber_count(&self) -> usize { self.inner.state.lock().conduits.len() }

  pub fn is_terminated(&self) -> bool { !self.inner.state.lock().active }
}

impl<T: Clone + Send, E: Clone + Send> PublishSubject<T, E> {
  /// Fans `value` out to the current subscribers. A no-op once terminated.
  pub fn send(&self, value: T) {
    let snapshot = {
      let state = self.inner.state.lock();
      if !state.active {
        return;
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
    debug!(subscribers = snapshot.len(), "publish subject terminated");
    broadcast_completion::<T, E, _>(&snapshot, completion);
  }
}

impl<T, E> SubjectInner<T, E> {
  /// Turns the upstreams on the first time any conduit records demand.
  fn acknowledge_downstream_demand(&self) {
    let upstream = {
      let mut state = self.state.lock();
      if state.has_downstream_demand {
        return;
      }
      state.has_downstream_demand = true;
      state.upstream.clone()
    };
    debug!(upstreams = upstream.len(), "first downstream demand, requesting upstream");
    for subscription in upstream {
      subscription.request(Demand::Unlimited);
    }
  }

  fn disassociate(&self, id: ConduitId) {
    let removed = self.state.lock().conduits.remove(id);
    if removed.is_some() {
      trace!(conduit = %id, "conduit removed");
    }
  }
}

impl<T, E> Drop for SubjectInner<T, E> {
  fn drop(&mut self) {
    for subscription in self.state.get_mut().upstream.drain(..) {
      subscription.cancel();
    }
  }
}

impl<T, E> Publisher for PublishSubject<T, E>
where
  T: Send + 'static,
  E: Clone + Send + 'static,
{
  type Output = T;
  type Failure = E;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<T, E>) {
    let mut state = self.inner.state.lock();
    if !state.active {
      let completion = state.completion.clone();
      drop(state);
      subscriber.receive_subscription(EmptySubscription::shared());
      if let Some(completion) = completion {
        subscriber.receive_completion(completion);
      }
      return;
    }

    let id = state.conduits.reserve_id();
    let conduit = Arc::new(PublishConduit {
      id,
      parent: Arc::downgrade(&self.inner),
      state: Mutex::new(ConduitState {
        downstream: Some(subscriber.clone()),
        demand: Demand::NONE,
        pending: VecDeque::new(),
        completion: None,
        // Nothing reaches the subscriber before its subscription does.
        draining: true,
      }),
    });
    state.conduits.insert(id, conduit.clone());
    drop(state);
    trace!(conduit = %id, "conduit registered");
    subscriber.receive_subscription(conduit.clone());
    conduit.drain();
  }
}

impl<T, E> Subscriber<T, E> for PublishSubject<T, E>
where
  T: Clone + Send,
  E: Clone + Send,
{
  fn receive_subscription(&self, subscription: SharedSubscription) {
    let request_now = {
      let mut state = self.inner.state.lock();
      if !state.active {
        None
      } else {
        state.upstream.push(subscription.clone());
        Some(state.has_downstream_demand)
      }
    };
    match request_now {
      None => subscription.cancel(),
      Some(true) => subscription.request(Demand::Unlimited),
      Some(false) => {}
    }
  }

  fn receive(&self, input: T) -> Demand {
    self.send(input);
    Demand::NONE
  }

  fn receive_completion(&self, completion: Completion<E>) { self.send_completion(completion) }
}

impl<T, E> ObserverType<T, E> for PublishSubject<T, E>
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
// PublishConduit
// ============================================================================

/// One downstream subscriber of a [`PublishSubject`].
///
/// Delivery into the subscriber is serialized without holding a lock across
/// the call: a value accepted while another one is being delivered (from
/// inside the subscriber, or from another thread) waits in `pending` and is
/// handed over by whoever is delivering.
pub struct PublishConduit<T, E> {
  id: ConduitId,
  parent: Weak<SubjectInner<T, E>>,
  state: Mutex<ConduitState<T, E>>,
}

struct ConduitState<T, E> {
  downstream: Option<SharedSubscriber<T, E>>,
  demand: Demand,
  // Accepted values, already paid for with demand.
  pending: VecDeque<T>,
  completion: Option<Completion<E>>,
  draining: bool,
}

impl<T, E> PublishConduit<T, E> {
  pub fn id(&self) -> ConduitId { self.id }

  fn drain(&self) {
    loop {
      let mut state = self.state.lock();
      let Some(downstream) = state.downstream.clone() else {
        state.pending.clear();
        state.completion = None;
        state.draining = false;
        return;
      };
      if let Some(value) = state.pending.pop_front() {
        drop(state);
        let more = downstream.receive(value);
        if more > Demand::NONE {
          self.state.lock().demand += more;
        }
        continue;
      }
      state.draining = false;
      if let Some(completion) = state.completion.take() {
        state.downstream = None;
        drop(state);
        downstream.receive_completion(completion);
      }
      return;
    }
  }
}

impl<T, E> Subscription for PublishConduit<T, E>
where
  T: Send,
  E: Send,
{
  fn request(&self, demand: Demand) {
    demand.assert_non_zero();
    {
      let mut state = self.state.lock();
      if state.downstream.is_none() {
        return;
      }
      state.demand += demand;
    }
    if let Some(parent) = self.parent.upgrade() {
      parent.acknowledge_downstream_demand();
    }
  }

  fn cancel(&self) {
    let downstream = self.state.lock().downstream.take();
    if downstream.is_some() {
      if let Some(parent) = self.parent.upgrade() {
        parent.disassociate(self.id);
      }
    }
  }
}

impl<T, E> Conduit<T, E> for PublishConduit<T, E>
where
  T: Send,
  E: Send,
{
  fn offer(&self, value: T) {
    let mut state = self.state.lock();
    if state.downstream.is_none() {
      return;
    }
    if state.demand.is_none() {
      trace!(conduit = %self.id, "no demand, value dropped");
      return;
    }
    state.demand -= 1usize;
    state.pending.push_back(value);
    if state.draining {
      return;
    }
    state.draining = true;
    drop(state);
    self.drain();
  }

  fn finish(&self, completion: Completion<E>) {
    let mut state = self.state.lock();
    if state.downstream.is_none() || state.completion.is_some() {
      return;
    }
    state.completion = Some(completion);
    if state.draining {
      return;
    }
    state.draining = true;
    drop(state);
    self.drain();
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Barrier, thread};

  use super::*;
  use crate::{
    publisher::PublisherExt,
    test_support::{SpySubscription, Recorder},
  };

  type Rec = Recorder<i32, &'static str>;
  type Subj = PublishSubject<i32, &'static str>;

  #[test]
  fn multicasts_to_subscribers_with_demand() {
    let subject = Subj::new();
    let a = Rec::with_demand(Demand::Unlimited);
    let b = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(a.clone());
    subject.receive_subscriber(b.clone());

    subject.send(1);
    subject.send(2);

    assert_eq!(a.values(), vec![1, 2]);
    assert_eq!(b.values(), vec![1, 2]);
    assert_eq!(subject.subscriber_count(), 2);
  }

  #[test]
  fn zero_demand_drops_values() {
    let subject = Subj::new();
    let slow = Rec::new();
    subject.receive_subscriber(slow.clone());

    subject.send(1);
    slow.request(Demand::ONE);
    subject.send(2);
    subject.send(3);

    assert_eq!(slow.values(), vec![2]);
  }

  #[test]
  fn receive_reply_extends_demand() {
    let subject = Subj::new();
    let rec = Rec::with_demand(Demand::ONE);
    rec.reply_with(Demand::ONE);
    subject.receive_subscriber(rec.clone());

    for v in 0..3 {
      subject.send(v);
    }
    assert_eq!(rec.values(), vec![0, 1, 2]);
  }

  #[test]
  fn completion_is_delivered_once_and_clears_subscribers() {
    let subject = Subj::new();
    let rec = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(rec.clone());

    subject.send_completion(Completion::Failure("boom"));
    subject.send_completion(Completion::Finished);
    subject.send(1);

    assert_eq!(rec.events(), vec![Event::Error("boom")]);
    assert!(!subject.has_subscribers());
    assert!(subject.is_terminated());
  }

  #[test]
  fn late_subscriber_gets_stored_completion() {
    let subject = Subj::new();
    subject.send(1);
    subject.send_completion(Completion::Finished);

    let late = Rec::new();
    subject.receive_subscriber(late.clone());

    assert!(late.has_subscription());
    assert_eq!(late.events(), vec![Event::Completed]);
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[test]
  fn cancel_removes_conduit() {
    let subject = Subj::new();
    let rec = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(rec.clone());
    assert!(subject.has_subscribers());

    rec.cancel();
    rec.cancel();
    subject.send(1);

    assert!(!subject.has_subscribers());
    assert!(rec.events().is_empty());
  }

  #[test]
  fn upstream_is_requested_on_first_demand() {
    let subject = Subj::new();
    let upstream = SpySubscription::new();
    subject.receive_subscription(upstream.clone());
    assert!(upstream.requests().is_empty());

    let rec = Rec::new();
    subject.receive_subscriber(rec.clone());
    rec.request(Demand::ONE);
    rec.request(Demand::ONE);
    assert_eq!(upstream.requests(), vec![Demand::Unlimited]);

    // upstreams arriving after demand was seen are turned on right away
    let late_upstream = SpySubscription::new();
    subject.receive_subscription(late_upstream.clone());
    assert_eq!(late_upstream.requests(), vec![Demand::Unlimited]);
  }

  #[test]
  fn dropping_the_subject_cancels_upstream() {
    let upstream = SpySubscription::new();
    {
      let subject = Subj::new();
      subject.receive_subscription(upstream.clone());
      let _another = subject.clone();
    }
    assert_eq!(upstream.cancels(), 1);
  }

  #[test]
  fn cancel_from_inside_receive() {
    let subject = Subj::new();
    let rec = Rec::with_demand(Demand::Unlimited);
    let other = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(rec.clone());
    subject.receive_subscriber(other.clone());

    let c_rec = rec.clone();
    rec.on_value(move |_| c_rec.cancel());

    subject.send(1);
    subject.send(2);

    assert_eq!(rec.values(), vec![1]);
    assert_eq!(other.values(), vec![1, 2]);
    assert_eq!(subject.subscriber_count(), 1);
  }

  #[test]
  fn subscribe_and_send_from_inside_receive() {
    let subject = Subj::new();
    let rec = Rec::with_demand(Demand::Unlimited);
    let late = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(rec.clone());

    let (c_subject, c_late) = (subject.clone(), late.clone());
    rec.on_value(move |v| {
      if *v == 1 {
        c_subject.receive_subscriber(c_late.clone());
        c_subject.send(10);
      }
    });

    subject.send(1);
    subject.send(2);

    // 10 waits until the delivery of 1 returned
    assert_eq!(late.values(), vec![10, 2]);
    assert_eq!(rec.values(), vec![1, 10, 2]);
  }

  #[test]
  fn cross_wired_subjects_on_two_threads() {
    let left = PublishSubject::<u32, ()>::new();
    let right = PublishSubject::<u32, ()>::new();
    let barrier = Arc::new(Barrier::new(2));

    // Each side forwards into the other until the value reaches 3. Both
    // deliveries of 1 are in flight on different threads at the same time.
    let wire = |from: &PublishSubject<u32, ()>, to: &PublishSubject<u32, ()>| {
      let seen = Arc::new(Mutex::new(vec![]));
      let (c_seen, to, barrier) = (seen.clone(), to.clone(), barrier.clone());
      let handle = from.sink(
        move |v| {
          c_seen.lock().push(v);
          if v == 1 {
            barrier.wait();
          }
          if v < 3 {
            to.send(v + 1);
          }
        },
        |_| {},
      );
      (seen, handle)
    };
    let (left_seen, left_handle) = wire(&left, &right);
    let (right_seen, right_handle) = wire(&right, &left);

    let (c_left, c_right) = (left.clone(), right.clone());
    let a = thread::spawn(move || c_left.send(1));
    let b = thread::spawn(move || c_right.send(1));
    a.join().unwrap();
    b.join().unwrap();

    let mut left_seen = left_seen.lock().clone();
    let mut right_seen = right_seen.lock().clone();
    left_seen.sort_unstable();
    right_seen.sort_unstable();
    assert_eq!(left_seen, vec![1, 2, 3]);
    assert_eq!(right_seen, vec![1, 2, 3]);
    left_handle.cancel();
    right_handle.cancel();
  }

  #[test]
  fn completion_waits_behind_value_in_delivery() {
    let subject = Subj::new();
    let rec = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(rec.clone());

    let c_subject = subject.clone();
    rec.on_value(move |v| {
      if *v == 1 {
        c_subject.send_completion(Completion::Finished);
      }
    });
    subject.send(1);

    assert_eq!(rec.events(), vec![Event::Next(1), Event::Completed]);
  }

  #[test]
  fn observer_facade_drives_subject() {
    let subject = Subj::new();
    let rec = Rec::with_demand(Demand::Unlimited);
    subject.receive_subscriber(rec.clone());

    subject.on(Event::Next(4));
    subject.on(Event::Completed);
    assert_eq!(rec.events(), vec![Event::Next(4), Event::Completed]);
  }

  #[test]
  #[should_panic(expected = "demand must not be zero")]
  fn zero_request_is_fatal() {
    let subject = Subj::new();
    let rec = Rec::new();
    subject.receive_subscriber(rec.clone());
    rec.request(Demand::NONE);
  }
}
