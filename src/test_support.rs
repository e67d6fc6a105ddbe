//! Recording subscriber shared by the unit tests.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  completion::Completion,
  demand::Demand,
  event::Event,
  subscriber::Subscriber,
  subscription::{SharedSubscription, Subscription},
};

type Hook<T> = Box<dyn FnMut(&T) + Send>;

/// Records everything it receives and exposes its subscription so tests can
/// drive demand by hand.
pub struct Recorder<T, E> {
  events: Mutex<Vec<Event<T, E>>>,
  subscription: Mutex<Option<SharedSubscription>>,
  initial: Demand,
  reply: Mutex<Demand>,
  hook: Mutex<Option<Hook<T>>>,
}

impl<T: Clone, E: Clone> Recorder<T, E> {
  /// A recorder that requests nothing on subscription.
  pub fn new() -> Arc<Self> { Self::with_demand(Demand::NONE) }

  pub fn with_demand(initial: Demand) -> Arc<Self> {
    Arc::new(Self {
      events: Mutex::new(vec![]),
      subscription: Mutex::new(None),
      initial,
      reply: Mutex::new(Demand::NONE),
      hook: Mutex::new(None),
    })
  }

  /// Demand returned from every `receive`.
  pub fn reply_with(&self, demand: Demand) { *self.reply.lock() = demand; }

  /// Runs `hook` on every received value, before it is recorded.
  pub fn on_value(&self, hook: impl FnMut(&T) + Send + 'static) {
    *self.hook.lock() = Some(Box::new(hook));
  }

  pub fn request(&self, demand: Demand) {
    let subscription = self.subscription.lock().clone();
    if let Some(subscription) = subscription {
      subscription.request(demand);
    }
  }

  pub fn cancel(&self) {
    let subscription = self.subscription.lock().clone();
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
  }

  pub fn has_subscription(&self) -> bool { self.subscription.lock().is_some() }

  pub fn events(&self) -> Vec<Event<T, E>> { self.events.lock().clone() }

  pub fn values(&self) -> Vec<T> {
    self
      .events
      .lock()
      .iter()
      .filter_map(|event| match event {
        Event::Next(value) => Some(value.clone()),
        _ => None,
      })
      .collect()
  }

  pub fn completions(&self) -> Vec<Completion<E>> {
    self
      .events
      .lock()
      .iter()
      .filter_map(|event| event.clone().into_completion())
      .collect()
  }
}

impl<T, E> Subscriber<T, E> for Recorder<T, E>
where
  T: Clone + Send,
  E: Clone + Send,
{
  fn receive_subscription(&self, subscription: SharedSubscription) {
    *self.subscription.lock() = Some(subscription.clone());
    if !self.initial.is_none() {
      subscription.request(self.initial);
    }
  }

  fn receive(&self, input: T) -> Demand {
    let hook = self.hook.lock().take();
    if let Some(mut hook) = hook {
      hook(&input);
      let mut slot = self.hook.lock();
      if slot.is_none() {
        *slot = Some(hook);
      }
    }
    self.events.lock().push(Event::Next(input));
    *self.reply.lock()
  }

  fn receive_completion(&self, completion: Completion<E>) {
    self.events.lock().push(completion.into());
  }
}

/// Subscription that records what is asked of it.
#[derive(Default)]
pub struct SpySubscription {
  requests: Mutex<Vec<Demand>>,
  cancels: AtomicUsize,
}

impl SpySubscription {
  pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

  pub fn requests(&self) -> Vec<Demand> { self.requests.lock().clone() }

  pub fn cancels(&self) -> usize { self.cancels.load(Ordering::SeqCst) }
}

impl Subscription for SpySubscription {
  fn request(&self, demand: Demand) {
    demand.assert_non_zero();
    self.requests.lock().push(demand);
  }

  fn cancel(&self) { self.cancels.fetch_add(1, Ordering::SeqCst); }
}
