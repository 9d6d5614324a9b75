pub mod rss;

pub use rss::{parse_rss, HttpRssFeed, StaticFeed};
