//! The live link between one publisher and one subscriber.
//!
//! A downstream subscriber uses its [`Subscription`] to ask for more values
//! ([`Subscription::request`]) or to stop receiving them
//! ([`Subscription::cancel`]). Both methods take `&self` because the handle is
//! shared between the subscriber, the publisher calling into it, and possibly
//! other threads.

use std::{
  fmt::{Debug, Formatter},
  sync::Arc,
};

use parking_lot::Mutex;

use crate::demand::Demand;

pub trait Subscription: Send + Sync {
  /// Asks the publisher for `demand` more values. Demand is additive.
  ///
  /// A demand of zero is a contract violation.
  fn request(&self, demand: Demand);

  /// Stops delivery. Safe to call any number of times.
  fn cancel(&self);
}

/// Reference-counted subscription, the form in which subscriptions are handed
/// to subscribers.
pub type SharedSubscription = Arc<dyn Subscription>;

/// Requests only when there is something to request.
pub trait SubscriptionExt {
  fn request_if_needed(&self, demand: Demand);
}

impl<S: Subscription + ?Sized> SubscriptionExt for S {
  #[inline]
  fn request_if_needed(&self, demand: Demand) {
    if demand > Demand::NONE {
      self.request(demand);
    }
  }
}

impl<S: Subscription + ?Sized> Subscription for Arc<S> {
  #[inline]
  fn request(&self, demand: Demand) { (**self).request(demand) }

  #[inline]
  fn cancel(&self) { (**self).cancel() }
}

impl Debug for dyn Subscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str("Subscription") }
}

/// A subscription that has nothing to deliver, handed to subscribers of a
/// publisher that is already terminated.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySubscription;

impl EmptySubscription {
  pub fn shared() -> SharedSubscription { Arc::new(EmptySubscription) }
}

impl Subscription for EmptySubscription {
  fn request(&self, demand: Demand) { demand.assert_non_zero(); }

  fn cancel(&self) {}
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Caller-side handle returned from the convenience subscribe methods.
///
/// The subscription itself arrives asynchronously from the publisher, so the
/// handle starts out empty. Cancelling before the subscription arrives cancels
/// it on arrival.
#[derive(Clone, Default)]
pub struct SubscriptionHandle(Arc<Mutex<HandleState>>);

#[derive(Default)]
struct HandleState {
  subscription: Option<SharedSubscription>,
  cancelled: bool,
}

impl SubscriptionHandle {
  pub(crate) fn new() -> Self { Self::default() }

  /// Stores the upstream subscription. Returns `false` (after cancelling it)
  /// if the handle is already cancelled or already holds one.
  pub(crate) fn attach(&self, subscription: SharedSubscription) -> bool {
    let mut state = self.0.lock();
    if state.cancelled || state.subscription.is_some() {
      drop(state);
      subscription.cancel();
      return false;
    }
    state.subscription = Some(subscription);
    true
  }

  /// Drops the stored subscription without cancelling it, once the upstream
  /// has terminated on its own.
  pub(crate) fn release(&self) {
    let mut state = self.0.lock();
    state.cancelled = true;
    state.subscription = None;
  }

  pub fn request(&self, demand: Demand) {
    let subscription = self.0.lock().subscription.clone();
    if let Some(subscription) = subscription {
      subscription.request(demand);
    }
  }

  /// Cancels the subscription. Idempotent.
  pub fn cancel(&self) {
    let subscription = {
      let mut state = self.0.lock();
      state.cancelled = true;
      state.subscription.take()
    };
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
  }

  pub fn is_closed(&self) -> bool { self.0.lock().cancelled }

  /// Activates "RAII" behavior for this subscription. That means `cancel()`
  /// will be called automatically as soon as the returned value goes out of
  /// scope.
  ///
  /// **Attention:** If you don't assign the return value to a variable,
  /// `cancel()` is called immediately, which is probably not what you want!
  pub fn unsubscribe_when_dropped(self) -> SubscriptionGuard { SubscriptionGuard(self) }
}

impl Debug for SubscriptionHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SubscriptionHandle")
      .field("is_closed", &self.is_closed())
      .finish()
  }
}

/// An RAII implementation of a "scoped subscribed" of a subscription.
/// When this structure is dropped (falls out of scope), the subscription will
/// be cancelled.
///
/// If you want to drop it immediately, wrap it in its own scope
#[derive(Debug)]
#[must_use]
pub struct SubscriptionGuard(SubscriptionHandle);

impl SubscriptionGuard {
  pub fn new(handle: SubscriptionHandle) -> SubscriptionGuard { SubscriptionGuard(handle) }
}

impl Drop for SubscriptionGuard {
  #[inline]
  fn drop(&mut self) { self.0.cancel() }
}
