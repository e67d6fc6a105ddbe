//! Observer-style facade over the subscriber protocol.
//!
//! Callers that do not care about demand can push plain [`Event`]s into
//! anything implementing [`ObserverType`]: subjects, or an [`AnyObserver`]
//! built from a closure. `Error` and `Completed` both end the stream.

use std::sync::Arc;

use crate::completion::Completion;

/// A single notification flowing through a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event<T, E> {
  Next(T),
  Error(E),
  Completed,
}

impl<T, E> Event<T, E> {
  /// Transforms the carried value; terminal events pass through.
  pub fn map<R, F>(self, f: F) -> Event<R, E>
  where
    F: FnOnce(T) -> R,
  {
    match self {
      Event::Next(value) => Event::Next(f(value)),
      Event::Error(err) => Event::Error(err),
      Event::Completed => Event::Completed,
    }
  }

  /// Like [`Event::map`], but a failing transform turns the event into an
  /// `Error`.
  pub fn try_map<R, F>(self, f: F) -> Event<R, E>
  where
    F: FnOnce(T) -> Result<R, E>,
  {
    match self {
      Event::Next(value) => match f(value) {
        Ok(mapped) => Event::Next(mapped),
        Err(err) => Event::Error(err),
      },
      Event::Error(err) => Event::Error(err),
      Event::Completed => Event::Completed,
    }
  }

  #[inline]
  pub fn is_stop_event(&self) -> bool { !matches!(self, Event::Next(_)) }

  /// The terminal completion this event represents, if any.
  pub fn into_completion(self) -> Option<Completion<E>> {
    match self {
      Event::Next(_) => None,
      Event::Error(err) => Some(Completion::Failure(err)),
      Event::Completed => Some(Completion::Finished),
    }
  }
}

impl<T, E> From<Completion<E>> for Event<T, E> {
  fn from(completion: Completion<E>) -> Self {
    match completion {
      Completion::Finished => Event::Completed,
      Completion::Failure(err) => Event::Error(err),
    }
  }
}

/// Something that accepts events.
pub trait ObserverType<T, E>: Send + Sync {
  fn on(&self, event: Event<T, E>);

  #[inline]
  fn on_next(&self, value: T) { self.on(Event::Next(value)) }

  #[inline]
  fn on_error(&self, err: E) { self.on(Event::Error(err)) }

  #[inline]
  fn on_completed(&self) { self.on(Event::Completed) }
}

type EventHandler<T, E> = Arc<dyn Fn(Event<T, E>) + Send + Sync>;

/// Type-erased observer backed by an event handler closure.
pub struct AnyObserver<T, E> {
  handler: EventHandler<T, E>,
}

impl<T, E> AnyObserver<T, E> {
  pub fn new<F>(handler: F) -> Self
  where
    F: Fn(Event<T, E>) + Send + Sync + 'static,
  {
    Self { handler: Arc::new(handler) }
  }
}

impl<T, E> Clone for AnyObserver<T, E> {
  fn clone(&self) -> Self { Self { handler: self.handler.clone() } }
}

impl<T, E> ObserverType<T, E> for AnyObserver<T, E> {
  fn on(&self, event: Event<T, E>) { (self.handler)(event) }
}
