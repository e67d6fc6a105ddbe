//! IntoStream Operator
//!
//! Converts a [`Publisher`] into a `futures::Stream`, so its values can be
//! consumed with the usual async patterns like `while let` loops.
//!
//! The stream pulls: every poll that finds nothing buffered requests exactly
//! one value from the publisher, so a slow consumer never has more than one
//! value in flight.
//!
//! # Example
//!
//! ```rust
//! use futures::StreamExt;
//! use rxdemand::prelude::*;
//!
//! # futures::executor::block_on(async {
//! let mut stream = publishers::just::<_, ()>(1).into_stream();
//!
//! if let Some(Ok(value)) = stream.next().await {
//!   println!("Received: {}", value);
//! }
//! # });
//! ```

use std::{
  collections::VecDeque,
  pin::Pin,
  sync::Arc,
  task::{Context as AsyncContext, Poll, Waker},
};

use futures::Stream;
use parking_lot::Mutex;

use crate::{
  completion::Completion,
  demand::Demand,
  publisher::Publisher,
  subscriber::Subscriber,
  subscription::SharedSubscription,
};

/// State shared between the subscriber side and the stream consumer.
struct StreamState<T, E> {
  /// Items and the failure waiting to be polled.
  queue: VecDeque<Result<T, E>>,
  waker: Option<Waker>,
  subscription: Option<SharedSubscription>,
  /// A value was requested and has not arrived yet.
  requested: bool,
  is_closed: bool,
}

/// A `Stream` that yields the values of a [`Publisher`].
///
/// - `Ok(T)`: one per value.
/// - `Err(E)`: when the publisher fails.
/// - `None`: end of stream, after completion or after the failure.
///
/// Dropping the stream cancels the subscription.
pub struct PublisherStream<T, E> {
  state: Arc<Mutex<StreamState<T, E>>>,
}

impl<T, E> PublisherStream<T, E>
where
  T: Send + 'static,
  E: Send + 'static,
{
  pub fn new<P>(publisher: &P) -> Self
  where
    P: Publisher<Output = T, Failure = E> + ?Sized,
  {
    let state = Arc::new(Mutex::new(StreamState {
      queue: VecDeque::new(),
      waker: None,
      subscription: None,
      requested: false,
      is_closed: false,
    }));
    publisher.receive_subscriber(Arc::new(StreamSubscriber { state: state.clone() }));
    PublisherStream { state }
  }
}

impl<T, E> PublisherStream<T, E> {
  fn pop(&self) -> Option<Poll<Option<Result<T, E>>>> {
    let mut state = self.state.lock();
    if let Some(item) = state.queue.pop_front() {
      return Some(Poll::Ready(Some(item)));
    }
    if state.is_closed {
      return Some(Poll::Ready(None));
    }
    None
  }
}

impl<T, E> Stream for PublisherStream<T, E> {
  type Item = Result<T, E>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut AsyncContext<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if let Some(ready) = this.pop() {
      return ready;
    }

    let subscription = {
      let mut state = this.state.lock();
      state.waker = Some(cx.waker().clone());
      if state.requested {
        None
      } else {
        state.requested = state.subscription.is_some();
        state.subscription.clone()
      }
    };
    if let Some(subscription) = subscription {
      subscription.request(Demand::ONE);
    }

    // Synchronous publishers answer inside `request`.
    this.pop().unwrap_or(Poll::Pending)
  }
}

impl<T, E> Drop for PublisherStream<T, E> {
  fn drop(&mut self) {
    let subscription = {
      let mut state = self.state.lock();
      state.is_closed = true;
      state.subscription.take()
    };
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
  }
}

/// Forwards a publisher's signals into the shared stream state.
struct StreamSubscriber<T, E> {
  state: Arc<Mutex<StreamState<T, E>>>,
}

impl<T, E> StreamSubscriber<T, E> {
  fn wake(waker: Option<Waker>) {
    if let Some(waker) = waker {
      waker.wake();
    }
  }
}

impl<T: Send, E: Send> Subscriber<T, E> for StreamSubscriber<T, E> {
  fn receive_subscription(&self, subscription: SharedSubscription) {
    let mut state = self.state.lock();
    if state.is_closed || state.subscription.is_some() {
      drop(state);
      subscription.cancel();
      return;
    }
    state.subscription = Some(subscription);
  }

  fn receive(&self, input: T) -> Demand {
    let waker = {
      let mut state = self.state.lock();
      state.requested = false;
      state.queue.push_back(Ok(input));
      state.waker.take()
    };
    Self::wake(waker);
    Demand::NONE
  }

  fn receive_completion(&self, completion: Completion<E>) {
    let waker = {
      let mut state = self.state.lock();
      if let Completion::Failure(err) = completion {
        state.queue.push_back(Err(err));
      }
      state.is_closed = true;
      state.subscription = None;
      state.waker.take()
    };
    Self::wake(waker);
  }
}

#[cfg(test)]
mod tests {
  use futures::{executor::block_on, StreamExt};

  use super::*;
  use crate::{
    publisher::PublisherExt,
    publishers::{fail, from_iter, just},
    subject::PublishSubject,
  };

  #[test]
  fn into_stream_receive_all_values() {
    let values: Vec<i32> = block_on(async {
      let mut stream = from_iter::<_, ()>(vec![1, 2, 3]).into_stream();
      let mut values = vec![];
      while let Some(Ok(x)) = stream.next().await {
        values.push(x);
      }
      values
    });
    assert_eq!(values, vec![1, 2, 3]);
  }

  #[test]
  fn into_stream_single_value() {
    let mut stream = just::<_, ()>(123).into_stream();
    assert_eq!(block_on(stream.next()), Some(Ok(123)));
    assert_eq!(block_on(stream.next()), None);
  }

  #[test]
  fn into_stream_failure() {
    let mut stream = fail::<i32, _>("error").into_stream();
    assert_eq!(block_on(stream.next()), Some(Err("error")));
    assert_eq!(block_on(stream.next()), None);
  }

  #[test]
  fn into_stream_cancels_on_drop() {
    let subject = PublishSubject::<i32, ()>::new();
    let stream = subject.clone().into_stream();
    assert!(subject.has_subscribers());
    drop(stream);
    assert!(!subject.has_subscribers());
  }

  #[test]
  fn into_stream_pulls_one_at_a_time() {
    let subject = PublishSubject::<i32, ()>::new();
    let mut stream = subject.clone().into_stream();

    let feeder = {
      let subject = subject.clone();
      std::thread::spawn(move || {
        // only values sent while the stream waits for one get through
        while subject.has_subscribers() {
          subject.send(7);
          std::thread::yield_now();
        }
      })
    };

    assert_eq!(block_on(stream.next()), Some(Ok(7)));
    assert_eq!(block_on(stream.next()), Some(Ok(7)));
    drop(stream);
    feeder.join().unwrap();
  }
}
