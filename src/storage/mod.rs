//! Response cache for finished feed documents.

mod feed_cache;

pub use feed_cache::{CacheError, FeedCache};
