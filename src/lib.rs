//! # rxdemand: Reactive streams with backpressure
//!
//! Publishers, subscribers and subscriptions where nothing flows until it was
//! asked for. Every subscriber states how many values it can take through a
//! [`Demand`]; publishers, subjects and operators never deliver more.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxdemand::prelude::*;
//!
//! let subject = ReplaySubject::<i32, ()>::new(2);
//! subject.send(1);
//! subject.send(2);
//! subject.send(3);
//!
//! // A late subscriber sees the last two values first.
//! let seen = std::sync::Arc::new(parking_lot::Mutex::new(vec![]));
//! let c_seen = seen.clone();
//! let _handle = subject.sink(move |v| c_seen.lock().push(v), |_| {});
//! subject.send(4);
//!
//! assert_eq!(*seen.lock(), vec![2, 3, 4]);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | Produces values for subscribers, on demand |
//! | [`Subscriber`] | Receives a subscription, values and one completion |
//! | [`Subscription`] | Requests demand and cancels |
//! | [`DemandBuffer`] | Queues values until the downstream asks for them |
//! | [`PublishSubject`] / [`ReplaySubject`] | Multicast into many subscribers |
//!
//! ## Feature Flags
//!
//! - **`stream`** (default): [`PublisherExt::into_stream`] bridges a publisher
//!   into a `futures::Stream`.
//!
//! [`Publisher`]: publisher::Publisher
//! [`Subscriber`]: subscriber::Subscriber
//! [`Subscription`]: subscription::Subscription
//! [`Demand`]: demand::Demand
//! [`DemandBuffer`]: demand_buffer::DemandBuffer
//! [`PublishSubject`]: subject::PublishSubject
//! [`ReplaySubject`]: subject::ReplaySubject
//! [`PublisherExt::into_stream`]: publisher::PublisherExt::into_stream

pub mod completion;
pub mod conduit;
pub mod demand;
pub mod demand_buffer;
pub mod error;
pub mod event;
pub mod ops;
pub mod prelude;
pub mod publisher;
pub mod publishers;
pub mod sink;
pub mod subject;
pub mod subscriber;
pub mod subscription;

#[cfg(test)]
mod test_support;

// Re-export the prelude module
pub use prelude::*;

// Bring the README into Cargo-driven doctests.
#[cfg(doctest)]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}
