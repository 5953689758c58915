//! Lettura is an authenticated gateway in front of a remote page-scraping
//! engine. Requests flow through API-key authentication and per-key rate
//! limiting into a cache-aside orchestrator that serves previously scraped
//! pages from Postgres and delegates misses to the reader engine.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
