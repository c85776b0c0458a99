pub mod cache_service;
pub mod models;

pub use cache_service::{CacheError, MemoryCache, ResultCache, connect};
pub use models::{CachedPrediction, cache_key};
