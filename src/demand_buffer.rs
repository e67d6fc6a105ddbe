//! Per-subscriber flow control.
//!
//! A [`DemandBuffer`] sits between a source that may produce faster than its
//! consumer can accept and exactly one downstream subscriber. Values are queued
//! in arrival order and handed out only while the subscriber has outstanding
//! demand, so the subscriber never sees more than it asked for even when the
//! source ignores backpressure.
//!
//! # Delivery
//!
//! The buffer's lock is never held while calling the subscriber. Instead one
//! caller at a time becomes the *drainer*: it pops a value, releases the lock,
//! delivers, re-acquires and repeats. A `buffer`/`demand` call arriving while
//! somebody else drains (on another thread, or reentrantly from inside the
//! subscriber's `receive`) only updates the queue and counters; the active
//! drainer picks the change up on its next iteration. Delivery to the
//! subscriber is therefore serialized and FIFO.
//!
//! The buffer lets go of its subscriber once the completion was delivered.

use std::collections::VecDeque;

use parking_lot::{Mutex, MutexGuard};

use crate::{
  completion::Completion,
  demand::Demand,
  error::contract_violation,
  subscriber::SharedSubscriber,
};

/// Demand bookkeeping of a [`DemandBuffer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DemandState {
  /// Values delivered to the subscriber.
  pub processed: Demand,
  /// Total demand the subscriber granted.
  pub requested: Demand,
  /// Demand already reported to the upstream.
  pub sent: Demand,
}

impl DemandState {
  #[inline]
  pub fn remaining(&self) -> Demand { self.requested - self.sent }

  fn take_remaining(&mut self) -> Demand {
    let remaining = self.remaining();
    self.sent += remaining;
    remaining
  }
}

struct BufferState<T, E> {
  subscriber: Option<SharedSubscriber<T, E>>,
  queue: VecDeque<T>,
  completion: Option<Completion<E>>,
  completed: bool,
  draining: bool,
  demand: DemandState,
}

pub struct DemandBuffer<T, E> {
  state: Mutex<BufferState<T, E>>,
}

impl<T, E> DemandBuffer<T, E> {
  pub fn new(subscriber: SharedSubscriber<T, E>) -> Self {
    Self {
      state: Mutex::new(BufferState {
        subscriber: Some(subscriber),
        queue: VecDeque::new(),
        completion: None,
        completed: false,
        draining: false,
        demand: DemandState::default(),
      }),
    }
  }

  /// Queues `value` and delivers whatever the current demand allows.
  ///
  /// Returns the demand that became available for the upstream to request.
  ///
  /// Buffering after a completion was recorded is a contract violation.
  pub fn buffer(&self, value: T) -> Demand {
    match self.try_buffer(value) {
      Some(demand) => demand,
      None => contract_violation("Completed publisher can't send values"),
    }
  }

  /// Like [`DemandBuffer::buffer`], but drops the value and returns `None` if
  /// a completion was already recorded. For callers whose values may race
  /// with termination.
  pub fn try_buffer(&self, value: T) -> Option<Demand> {
    let mut state = self.state.lock();
    if state.completed {
      return None;
    }
    state.queue.push_back(value);
    Some(self.flush(state, None))
  }

  /// Adds `demand`, delivers queued values it covers, and returns the demand
  /// the upstream may now request.
  pub fn demand(&self, demand: Demand) -> Demand { self.flush(self.state.lock(), Some(demand)) }

  /// Records the terminal event. It reaches the subscriber right away if the
  /// queue is empty, otherwise once later demand drains the queue.
  ///
  /// Completing twice is a contract violation.
  pub fn complete(&self, completion: Completion<E>) {
    if !self.try_complete(completion) {
      contract_violation("Completion has already occurred");
    }
  }

  /// Like [`DemandBuffer::complete`], returning `false` instead of halting when
  /// a completion was already recorded.
  pub fn try_complete(&self, completion: Completion<E>) -> bool {
    let mut state = self.state.lock();
    if state.completed {
      return false;
    }
    state.completed = true;
    state.completion = Some(completion);
    self.flush(state, None);
    true
  }

  /// Demand owed to the subscriber that is covered neither by delivered nor
  /// by queued values. Marks it as sent, so a fresh upstream taking over can
  /// be asked for exactly this much.
  pub fn take_outstanding(&self) -> Demand {
    let mut state = self.state.lock();
    let owed = state.demand.requested - state.demand.processed - state.queue.len();
    state.demand.sent = state.demand.requested;
    owed
  }

  pub fn demand_state(&self) -> DemandState { self.state.lock().demand }

  /// `true` once the completion has been handed to the subscriber.
  pub fn is_terminated(&self) -> bool {
    let state = self.state.lock();
    state.completed && state.completion.is_none()
  }

  fn flush<'a>(
    &'a self, mut state: MutexGuard<'a, BufferState<T, E>>, adding: Option<Demand>,
  ) -> Demand {
    if let Some(demand) = adding {
      state.demand.requested += demand;
    }
    if state.draining {
      return state.demand.take_remaining();
    }
    state.draining = true;

    loop {
      if state.demand.processed < state.demand.requested {
        if let Some(value) = state.queue.pop_front() {
          let Some(subscriber) = state.subscriber.clone() else {
            break;
          };
          state.demand.processed += 1usize;
          drop(state);
          let more = subscriber.receive(value);
          state = self.state.lock();
          state.demand.requested += more;
          continue;
        }
      }

      if state.queue.is_empty() {
        if let Some(completion) = state.completion.take() {
          state.demand = DemandState::default();
          state.draining = false;
          let subscriber = state.subscriber.take();
          drop(state);
          if let Some(subscriber) = subscriber {
            subscriber.receive_completion(completion);
          }
          return Demand::NONE;
        }
      }

      break;
    }
    state.draining = false;
    state.demand.take_remaining()
  }
}
