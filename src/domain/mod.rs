pub mod api_keys;
pub mod scrape;
pub mod usage;
