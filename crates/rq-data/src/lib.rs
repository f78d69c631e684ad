pub mod codec;
pub mod journal;
pub mod vec_feed;

pub use codec::{BinaryFeed, BinaryFeedReader, BinaryFeedWriter, BlockIndexEntry, FeedIndex, FeedRecord};
pub use journal::{InMemoryJournal, TrackedStep};
pub use vec_feed::VecFeed;
