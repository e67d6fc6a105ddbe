//! Multicast subjects.
//!
//! A subject is both a [`Subscriber`](crate::subscriber::Subscriber) and a
//! [`Publisher`](crate::publisher::Publisher): values sent into it, directly
//! or from an upstream it is subscribed to, are fanned out to every
//! registered downstream subscriber. Each downstream subscriber is tracked by
//! its own conduit.
//!
//! | Subject | Late subscriber sees |
//! |---|---|
//! | [`PublishSubject`] | only values sent after it requested demand |
//! | [`ReplaySubject`] | the last `buffer_size` values, then live values |
//!
//! Once terminated, both subjects hand new subscribers the stored completion
//! right away (after the replay history, for [`ReplaySubject`]).

mod publish_subject;
mod replay_subject;

pub use publish_subject::{PublishConduit, PublishSubject};
pub use replay_subject::{ReplayConduit, ReplaySubject};
