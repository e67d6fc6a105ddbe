//! Demand: the subscriber-granted permission to receive more values.
//!
//! A [`Demand`] is either a bounded count or [`Demand::Unlimited`]. Demands
//! combine by saturating addition, so once a subscriber has asked for
//! everything no later request can shrink it back to a bounded value.

use std::{
  cmp::Ordering,
  fmt::{Display, Formatter},
  ops::{Add, AddAssign, Sub, SubAssign},
};

use crate::error::contract_violation;

/// Requested number of items, sent from a subscriber to a publisher through a
/// subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Demand {
  /// A bounded number of items.
  Max(usize),
  /// As many items as the publisher can produce.
  Unlimited,
}

impl Demand {
  /// A demand for no items.
  pub const NONE: Demand = Demand::Max(0);

  /// A demand for exactly one item.
  pub const ONE: Demand = Demand::Max(1);

  #[inline]
  pub fn max(count: usize) -> Self { Demand::Max(count) }

  #[inline]
  pub fn is_unlimited(&self) -> bool { matches!(self, Demand::Unlimited) }

  #[inline]
  pub fn is_none(&self) -> bool { *self == Demand::NONE }

  /// Bounded count, `None` for unlimited.
  #[inline]
  pub fn count(&self) -> Option<usize> {
    match self {
      Demand::Max(n) => Some(*n),
      Demand::Unlimited => None,
    }
  }

  /// Halts if this demand is zero.
  ///
  /// Requesting nothing through a subscription is a programming error, not a
  /// runtime condition.
  #[track_caller]
  pub fn assert_non_zero(&self) {
    if self.is_none() {
      contract_violation("API Violation: demand must not be zero");
    }
  }
}

impl Default for Demand {
  fn default() -> Self { Demand::NONE }
}

impl From<usize> for Demand {
  fn from(count: usize) -> Self { Demand::Max(count) }
}

impl Display for Demand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Demand::Max(n) => write!(f, "max({n})"),
      Demand::Unlimited => f.write_str("unlimited"),
    }
  }
}

// ============================================================================
// Arithmetic
// ============================================================================

impl Add for Demand {
  type Output = Demand;

  fn add(self, rhs: Demand) -> Demand {
    match (self, rhs) {
      (Demand::Max(a), Demand::Max(b)) => match a.checked_add(b) {
        Some(sum) => Demand::Max(sum),
        None => Demand::Unlimited,
      },
      _ => Demand::Unlimited,
    }
  }
}

impl Add<usize> for Demand {
  type Output = Demand;

  fn add(self, rhs: usize) -> Demand { self + Demand::Max(rhs) }
}

impl AddAssign for Demand {
  fn add_assign(&mut self, rhs: Demand) { *self = *self + rhs; }
}

impl AddAssign<usize> for Demand {
  fn add_assign(&mut self, rhs: usize) { *self = *self + rhs; }
}

/// Saturates at zero; anything subtracted from unlimited stays unlimited.
impl Sub for Demand {
  type Output = Demand;

  fn sub(self, rhs: Demand) -> Demand {
    match (self, rhs) {
      (Demand::Unlimited, _) => Demand::Unlimited,
      (Demand::Max(_), Demand::Unlimited) => Demand::NONE,
      (Demand::Max(a), Demand::Max(b)) => Demand::Max(a.saturating_sub(b)),
    }
  }
}

impl Sub<usize> for Demand {
  type Output = Demand;

  fn sub(self, rhs: usize) -> Demand { self - Demand::Max(rhs) }
}

impl SubAssign for Demand {
  fn sub_assign(&mut self, rhs: Demand) { *self = *self - rhs; }
}

impl SubAssign<usize> for Demand {
  fn sub_assign(&mut self, rhs: usize) { *self = *self - rhs; }
}

// ============================================================================
// Ordering
// ============================================================================

impl PartialOrd for Demand {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Demand {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Demand::Unlimited, Demand::Unlimited) => Ordering::Equal,
      (Demand::Unlimited, Demand::Max(_)) => Ordering::Greater,
      (Demand::Max(_), Demand::Unlimited) => Ordering::Less,
      (Demand::Max(a), Demand::Max(b)) => a.cmp(b),
    }
  }
}

impl PartialEq<usize> for Demand {
  fn eq(&self, other: &usize) -> bool { *self == Demand::Max(*other) }
}

impl PartialOrd<usize> for Demand {
  fn partial_cmp(&self, other: &usize) -> Option<Ordering> {
    Some(self.cmp(&Demand::Max(*other)))
  }
}
