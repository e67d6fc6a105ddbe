pub mod concat_map;
pub mod filter_map;
#[cfg(feature = "stream")]
pub mod into_stream;
pub mod share_replay;
pub mod with_latest_from;

pub use concat_map::ConcatMap;
pub use filter_map::{FilterMap, MapFailure};
#[cfg(feature = "stream")]
pub use into_stream::PublisherStream;
pub use share_replay::ShareReplay;
pub use with_latest_from::WithLatestFrom;
