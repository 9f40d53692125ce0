// src/ingest/providers/mod.rs
pub mod reddit;
pub mod rss;

pub use reddit::RedditProvider;
pub use rss::RssFeedProvider;
