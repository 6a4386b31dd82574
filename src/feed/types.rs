use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while turning a fetched body into raw entries.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Body was empty or whitespace-only.
    #[error("feed document is empty")]
    EmptyDocument,

    /// XML parsed, but the root element is not one we know how to read.
    #[error("unsupported feed root: {0}")]
    UnsupportedFormat(String),

    /// XML or JSON could not be parsed.
    #[error("malformed feed document: {0}")]
    MalformedDocument(String),
}

// ============================================================================
// Formats
// ============================================================================

/// Wire format a document was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// RSS 2.0 and RSS 1.0 (RDF).
    Rss,
    Atom,
    JsonFeed,
}

impl FeedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFormat::Rss => "rss",
            FeedFormat::Atom => "atom",
            FeedFormat::JsonFeed => "json",
        }
    }
}

// ============================================================================
// Raw Entries
// ============================================================================

/// One `<item>` of an RSS-family document, fields as literal text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub guid: String,
    pub pub_date: String,
}

/// A `<link>` element inside an Atom entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomLink {
    pub href: String,
    pub rel: String,
}

/// One `<entry>` of an Atom document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomEntry {
    pub title: String,
    pub id: String,
    pub summary: String,
    pub content: String,
    pub updated: String,
    pub published: String,
    pub links: Vec<AtomLink>,
}

/// One element of a JSON Feed `items` array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub external_url: String,
    pub summary: String,
    pub content_text: String,
    pub content_html: String,
    pub date_published: String,
    pub date_modified: String,
}

/// Untyped entry produced by the decoder. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEntry {
    Rss(RssEntry),
    Atom(AtomEntry),
    Json(JsonEntry),
}

impl RawEntry {
    pub fn format(&self) -> FeedFormat {
        match self {
            RawEntry::Rss(_) => FeedFormat::Rss,
            RawEntry::Atom(_) => FeedFormat::Atom,
            RawEntry::Json(_) => FeedFormat::JsonFeed,
        }
    }
}

/// Result of decoding a whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFeed {
    pub format: FeedFormat,
    pub entries: Vec<RawEntry>,
}

// ============================================================================
// Canonical Item
// ============================================================================

/// Normalized item, the unit handed to storage.
///
/// All text fields are trimmed. `dedupe_key` is empty only for RSS items with
/// neither guid nor link; the fetcher synthesizes a key for those before
/// anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub dedupe_key: String,
    pub published_at: Option<DateTime<Utc>>,
}
