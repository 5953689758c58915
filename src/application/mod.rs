pub mod api_keys;
pub mod cache_key;
pub mod delegate;
pub mod error;
pub mod repos;
pub mod scrape;
