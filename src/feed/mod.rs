//! Feed ingestion: format detection, normalization and the fetch cycle.
//!
//! - [`decoder`] - turns a document body into raw per-format entries
//! - [`normalizer`] - maps raw entries onto [`CanonicalItem`]
//! - [`fetcher`] - HTTP retrieval and the fetch, decode, store, record cycle
//!
//! # Example
//!
//! ```
//! use siphon::feed::{decode, normalize};
//!
//! let doc = br#"<rss version="2.0"><channel>
//!   <item><guid>1</guid><title> Hello </title></item>
//! </channel></rss>"#;
//!
//! let feed = decode(doc).unwrap();
//! let items: Vec<_> = feed.entries.iter().map(normalize).collect();
//! assert_eq!(items[0].title, "Hello");
//! assert_eq!(items[0].dedupe_key, "1");
//! ```

pub mod decoder;
pub mod fetcher;
pub mod normalizer;
mod types;

pub use decoder::decode;
pub use fetcher::{
    build_client, refresh_feeds, refresh_one, synthesize_key, FetchError, FetchResult,
    MAX_FEED_SIZE,
};
pub use normalizer::{normalize, parse_timestamp};
pub use types::{
    AtomEntry, AtomLink, CanonicalItem, DecodeError, DecodedFeed, FeedFormat, JsonEntry,
    RawEntry, RssEntry,
};
