//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Operators
#[cfg(feature = "stream")]
pub use crate::ops::PublisherStream;
pub use crate::ops::{ConcatMap, FilterMap, MapFailure, ShareReplay, WithLatestFrom};
// Sources
pub use crate::publishers;
// Subject
pub use crate::subject::*;
// Subscription
pub use crate::subscription::*;
pub use crate::{
  completion::Completion,
  conduit::{Conduit, ConduitId, ConduitList},
  demand::Demand,
  demand_buffer::{DemandBuffer, DemandState},
  error::{cast_or_fail, ReactiveError},
  event::{AnyObserver, Event, ObserverType},
  publisher::{BoxedPublisher, Publisher, PublisherExt},
  sink::{Sink, SinkSubscription},
  subscriber::{FnSubscriber, SharedSubscriber, Subscriber},
};
