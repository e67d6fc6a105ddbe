//! Basic sources.
//!
//! | Source | Emits |
//! |---|---|
//! | [`from_iter`] | the items of an iterator, as demand allows, then finishes |
//! | [`just`] | a single value, then finishes |
//! | [`empty`] | nothing, finishes right away |
//! | [`fail`] | nothing, fails right away |

use std::{iter::Peekable, marker::PhantomData, sync::Arc};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
  completion::Completion,
  demand::Demand,
  publisher::Publisher,
  subscriber::SharedSubscriber,
  subscription::{EmptySubscription, Subscription},
};

// ============================================================================
// from_iter / just
// ============================================================================

/// Creates a publisher that emits the items of `iter`.
///
/// Every subscriber iterates its own clone of `iter`. Items are pulled only
/// as the subscriber requests them; the source finishes as soon as the
/// iterator is exhausted, even without outstanding demand.
///
/// # Examples
///
/// ```
/// use rxdemand::prelude::*;
///
/// let values = std::sync::Arc::new(parking_lot::Mutex::new(vec![]));
/// let c_values = values.clone();
/// publishers::from_iter::<_, ()>(0..3).sink(move |v| c_values.lock().push(v), |_| {});
/// assert_eq!(*values.lock(), vec![0, 1, 2]);
/// ```
pub fn from_iter<I, E>(iter: I) -> FromIter<I, E>
where
  I: IntoIterator + Clone,
{
  FromIter { iter, _p: PhantomData }
}

/// Creates a publisher that emits `value` once, then finishes.
pub fn just<T: Clone, E>(value: T) -> FromIter<Option<T>, E> { from_iter(Some(value)) }

#[derive(Clone)]
pub struct FromIter<I, E> {
  iter: I,
  _p: PhantomData<fn() -> E>,
}

impl<I, E> Publisher for FromIter<I, E>
where
  I: IntoIterator + Clone + Send + Sync + 'static,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
  E: 'static,
{
  type Output = I::Item;
  type Failure = E;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<I::Item, E>) {
    let subscription = Arc::new(IterSubscription {
      downstream: Mutex::new(Some(subscriber.clone())),
      state: Mutex::new(IterState {
        iter: self.iter.clone().into_iter().peekable(),
        demand: Demand::NONE,
        emitting: false,
      }),
    });
    subscriber.receive_subscription(subscription.clone());
    // An empty iterator finishes without waiting for demand.
    subscription.emit(Demand::NONE);
  }
}

struct IterSubscription<It: Iterator, E> {
  downstream: Mutex<Option<SharedSubscriber<It::Item, E>>>,
  state: Mutex<IterState<It>>,
}

struct IterState<It: Iterator> {
  iter: Peekable<It>,
  demand: Demand,
  emitting: bool,
}

impl<It: Iterator, E> IterSubscription<It, E> {
  /// Adds `demand` and emits until it runs out. A call arriving while another
  /// one emits (from inside the subscriber, or from another thread) only adds
  /// its demand.
  fn emit(&self, demand: Demand) {
    let mut state = self.state.lock();
    state.demand += demand;
    if state.emitting {
      return;
    }
    state.emitting = true;

    loop {
      let Some(downstream) = self.downstream.lock().clone() else {
        state.emitting = false;
        return;
      };
      if state.iter.peek().is_none() {
        state.emitting = false;
        drop(state);
        if self.downstream.lock().take().is_some() {
          trace!("iterator exhausted");
          downstream.receive_completion(Completion::Finished);
        }
        return;
      }
      if state.demand.is_none() {
        state.emitting = false;
        return;
      }
      let Some(value) = state.iter.next() else {
        continue;
      };
      state.demand -= 1usize;
      drop(state);
      let more = downstream.receive(value);
      state = self.state.lock();
      state.demand += more;
    }
  }
}

impl<It, E> Subscription for IterSubscription<It, E>
where
  It: Iterator + Send,
  It::Item: Send,
{
  fn request(&self, demand: Demand) {
    demand.assert_non_zero();
    self.emit(demand);
  }

  fn cancel(&self) {
    let downstream = self.downstream.lock().take();
    if downstream.is_some() {
      trace!("iterator source cancelled");
    }
  }
}

// ============================================================================
// empty / fail
// ============================================================================

/// Creates a publisher that finishes immediately.
pub fn empty<T, E>() -> Empty<T, E> { Empty(PhantomData) }

pub struct Empty<T, E>(PhantomData<fn() -> (T, E)>);

impl<T, E> Clone for Empty<T, E> {
  fn clone(&self) -> Self { Empty(PhantomData) }
}

impl<T, E> Publisher for Empty<T, E> {
  type Output = T;
  type Failure = E;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<T, E>) {
    subscriber.receive_subscription(EmptySubscription::shared());
    subscriber.receive_completion(Completion::Finished);
  }
}

/// Creates a publisher that fails immediately with `err`.
pub fn fail<T, E: Clone>(err: E) -> Fail<T, E> { Fail { err, _p: PhantomData } }

#[derive(Clone)]
pub struct Fail<T, E> {
  err: E,
  _p: PhantomData<fn() -> T>,
}

impl<T, E> Publisher for Fail<T, E>
where
  E: Clone + Send + Sync,
{
  type Output = T;
  type Failure = E;

  fn receive_subscriber(&self, subscriber: SharedSubscriber<T, E>) {
    subscriber.receive_subscription(EmptySubscription::shared());
    subscriber.receive_completion(Completion::Failure(self.err.clone()));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{event::Event, publisher::PublisherExt, test_support::Recorder};

  type Rec = Recorder<i32, ()>;

  #[test]
  fn from_iter_respects_demand() {
    let rec = Rec::new();
    from_iter::<_, ()>(vec![1, 2, 3]).subscribe(rec.clone());
    assert!(rec.events().is_empty());

    rec.request(Demand::max(2));
    assert_eq!(rec.values(), vec![1, 2]);

    rec.request(Demand::ONE);
    assert_eq!(rec.events(), vec![Event::Next(1), Event::Next(2), Event::Next(3), Event::Completed]);
  }

  #[test]
  fn from_iter_restarts_per_subscriber() {
    let source = from_iter::<_, ()>(0..2);
    let first = Rec::with_demand(Demand::Unlimited);
    let second = Rec::with_demand(Demand::Unlimited);
    source.subscribe(first.clone());
    source.subscribe(second.clone());
    assert_eq!(first.values(), vec![0, 1]);
    assert_eq!(second.values(), vec![0, 1]);
  }

  #[test]
  fn from_iter_stops_on_cancel() {
    let rec = Rec::with_demand(Demand::Unlimited);
    let c_rec = rec.clone();
    rec.on_value(move |v| {
      if *v == 2 {
        c_rec.cancel();
      }
    });
    from_iter::<_, ()>(1..100).subscribe(rec.clone());
    assert_eq!(rec.events(), vec![Event::Next(1), Event::Next(2)]);
  }

  #[test]
  fn reentrant_request_keeps_order() {
    let rec = Rec::with_demand(Demand::ONE);
    let c_rec = rec.clone();
    rec.on_value(move |_| c_rec.request(Demand::ONE));
    from_iter::<_, ()>(0..5).subscribe(rec.clone());
    assert_eq!(rec.values(), vec![0, 1, 2, 3, 4]);
    assert_eq!(rec.completions(), vec![Completion::Finished]);
  }

  #[test]
  fn empty_iterator_finishes_without_demand() {
    let rec = Rec::new();
    from_iter::<_, ()>(Vec::<i32>::new()).subscribe(rec.clone());
    assert_eq!(rec.events(), vec![Event::Completed]);
  }

  #[test]
  fn just_empty_and_fail() {
    let rec = Rec::with_demand(Demand::ONE);
    just::<_, ()>(7).subscribe(rec.clone());
    assert_eq!(rec.events(), vec![Event::Next(7), Event::Completed]);

    let rec = Rec::new();
    empty::<i32, ()>().subscribe(rec.clone());
    assert!(rec.has_subscription());
    assert_eq!(rec.events(), vec![Event::Completed]);

    let rec = Recorder::<i32, &'static str>::new();
    fail::<i32, _>("nope").subscribe(rec.clone());
    assert_eq!(rec.events(), vec![Event::Error("nope")]);
  }
}
