//! Per-subscriber records kept by the subjects.
//!
//! A subject hands every downstream subscriber its own [`Conduit`]: the
//! conduit is the subscriber's [`Subscription`] and, from the subject's side,
//! the place to push values and the terminal event into.
//!
//! Conduits live in a [`ConduitList`], an arena keyed by an explicit
//! [`ConduitId`]. Two conduits wrapping structurally identical subscribers are
//! still two records, and a conduit removes itself by id on cancel.
//!
//! # Design
//!
//! - **SmallVec Optimization**: most subjects have one or two subscribers, so
//!   the arena stays inline for up to two entries.
//! - **Pre-allocation Pattern**: [`ConduitList::reserve_id`] +
//!   [`ConduitList::insert`] let a conduit know its own id before it is
//!   registered.

use std::{fmt::Display, sync::Arc};

use smallvec::SmallVec;

use crate::{completion::Completion, subscription::Subscription};

/// Identity of a conduit inside one [`ConduitList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConduitId(usize);

impl Display for ConduitId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "conduit#{}", self.0)
  }
}

/// Subject-side view of one downstream subscriber.
pub trait Conduit<T, E>: Subscription {
  /// Pushes a value towards the subscriber, subject to its demand.
  fn offer(&self, value: T);

  /// Pushes the terminal event towards the subscriber.
  fn finish(&self, completion: Completion<E>);
}

/// Snapshot of a [`ConduitList`], taken under the subject's lock so that
/// delivery can happen after it is released.
pub type ConduitSnapshot<C> = SmallVec<[Arc<C>; 2]>;

pub struct ConduitList<C: ?Sized> {
  next_id: usize,
  items: SmallVec<[(ConduitId, Arc<C>); 2]>,
}

impl<C: ?Sized> Default for ConduitList<C> {
  fn default() -> Self { Self { next_id: 0, items: SmallVec::new() } }
}

impl<C: ?Sized> ConduitList<C> {
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Reserves the next id without registering anything.
  #[inline]
  pub fn reserve_id(&mut self) -> ConduitId {
    let id = ConduitId(self.next_id);
    self.next_id += 1;
    id
  }

  /// Registers a conduit under an id obtained from `reserve_id()`.
  #[inline]
  pub fn insert(&mut self, id: ConduitId, conduit: Arc<C>) { self.items.push((id, conduit)); }

  pub fn remove(&mut self, id: ConduitId) -> Option<Arc<C>> {
    self
      .items
      .iter()
      .position(|(i, _)| *i == id)
      .map(|pos| self.items.remove(pos).1)
  }

  #[inline]
  pub fn contains(&self, id: ConduitId) -> bool { self.items.iter().any(|(i, _)| *i == id) }

  #[inline]
  pub fn len(&self) -> usize { self.items.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  /// Clones the current registrations in insertion order.
  pub fn snapshot(&self) -> ConduitSnapshot<C> {
    self.items.iter().map(|(_, c)| c.clone()).collect()
  }

  /// Empties the list, returning what was registered.
  pub fn take(&mut self) -> ConduitSnapshot<C> {
    self.items.drain(..).map(|(_, c)| c).collect()
  }
}

/// Offers `value` to every conduit in `snapshot`.
///
/// The value is cloned for all conduits except the last one, which receives
/// the moved value.
pub fn broadcast_value<T, E, C>(snapshot: &[Arc<C>], value: T)
where
  T: Clone,
  C: Conduit<T, E> + ?Sized,
{
  let mut iter = snapshot.iter().peekable();
  while let Some(conduit) = iter.next() {
    if iter.peek().is_some() {
      conduit.offer(value.clone());
    } else {
      conduit.offer(value);
      break;
    }
  }
}

/// Finishes every conduit in `snapshot` with the same completion.
pub fn broadcast_completion<T, E, C>(snapshot: &[Arc<C>], completion: Completion<E>)
where
  E: Clone,
  C: Conduit<T, E> + ?Sized,
{
  let mut iter = snapshot.iter().peekable();
  while let Some(conduit) = iter.next() {
    if iter.peek().is_some() {
      conduit.finish(completion.clone());
    } else {
      conduit.finish(completion);
      break;
    }
  }
}
