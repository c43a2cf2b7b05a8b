pub mod cache_key;

pub use cache_key::{CacheKey, FeedScope};
