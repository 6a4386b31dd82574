//! Format detection and raw extraction for RSS, Atom and JSON Feed documents.
//!
//! The decoder only pulls literal field text out of each entry. Fallback
//! chains, trimming and timestamp parsing belong to [`super::normalizer`].

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use serde::Deserialize;

use super::types::{
    AtomEntry, AtomLink, DecodeError, DecodedFeed, FeedFormat, JsonEntry, RawEntry, RssEntry,
};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Detect the format of `bytes` and extract one [`RawEntry`] per source entry.
///
/// JSON is chosen when the first non-whitespace byte is `{` or `[`; anything
/// else is read as XML and dispatched on the root element's local name.
pub fn decode(bytes: &[u8]) -> Result<DecodedFeed, DecodeError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let trimmed = bytes.trim_ascii();
    match trimmed.first() {
        None => Err(DecodeError::EmptyDocument),
        Some(b'{') | Some(b'[') => decode_json_feed(trimmed),
        Some(_) => decode_xml(trimmed),
    }
}

// ============================================================================
// JSON Feed
// ============================================================================

#[derive(Debug, Deserialize)]
struct JsonFeedDocument {
    items: Option<Vec<JsonFeedItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonFeedId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Deserialize)]
struct JsonFeedItem {
    id: Option<JsonFeedId>,
    title: Option<String>,
    url: Option<String>,
    external_url: Option<String>,
    summary: Option<String>,
    content_text: Option<String>,
    content_html: Option<String>,
    date_published: Option<String>,
    date_modified: Option<String>,
}

impl From<JsonFeedItem> for JsonEntry {
    fn from(item: JsonFeedItem) -> Self {
        let id = match item.id {
            Some(JsonFeedId::Text(text)) => text,
            Some(JsonFeedId::Number(number)) => number.to_string(),
            None => String::new(),
        };
        JsonEntry {
            id,
            title: item.title.unwrap_or_default(),
            url: item.url.unwrap_or_default(),
            external_url: item.external_url.unwrap_or_default(),
            summary: item.summary.unwrap_or_default(),
            content_text: item.content_text.unwrap_or_default(),
            content_html: item.content_html.unwrap_or_default(),
            date_published: item.date_published.unwrap_or_default(),
            date_modified: item.date_modified.unwrap_or_default(),
        }
    }
}

fn decode_json_feed(bytes: &[u8]) -> Result<DecodedFeed, DecodeError> {
    let document: JsonFeedDocument = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::MalformedDocument(e.to_string()))?;

    let entries = document
        .items
        .unwrap_or_default()
        .into_iter()
        .map(|item| RawEntry::Json(item.into()))
        .collect();

    Ok(DecodedFeed {
        format: FeedFormat::JsonFeed,
        entries,
    })
}

// ============================================================================
// XML (RSS family and Atom)
// ============================================================================

fn decode_xml(bytes: &[u8]) -> Result<DecodedFeed, DecodeError> {
    // SEC-002: quick-xml never expands <!ENTITY> declarations, so a hostile
    // DOCTYPE cannot pull in external content here.
    let mut reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut collector: Option<EntryCollector> = None;
    let mut depth: usize = 0;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| DecodeError::MalformedDocument(e.to_string()))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                match collector.as_mut() {
                    None => collector = Some(EntryCollector::for_root(&e)?),
                    Some(c) => c.open(&e, depth, &reader),
                }
            }
            Event::Empty(e) => match collector.as_mut() {
                None => collector = Some(EntryCollector::for_root(&e)?),
                Some(c) => c.empty(&e, depth + 1, &reader),
            },
            Event::Text(e) => {
                if let Some(c) = collector.as_mut() {
                    c.text(&unescape_text(&e));
                }
            }
            Event::CData(e) => {
                if let Some(c) = collector.as_mut() {
                    c.text(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                if let Some(c) = collector.as_mut() {
                    c.close(depth);
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(DecodeError::MalformedDocument(
            "unexpected end of document".to_string(),
        ));
    }

    collector
        .map(EntryCollector::finish)
        .ok_or_else(|| DecodeError::MalformedDocument("no root element".to_string()))
}

/// Unknown entities (`&nbsp;` outside CDATA) are common in the wild; keep the
/// raw text rather than failing the whole document.
fn unescape_text(e: &BytesText<'_>) -> String {
    match e.unescape() {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(e).into_owned(),
    }
}

fn is_unprefixed(e: &BytesStart<'_>) -> bool {
    e.name().prefix().is_none()
}

/// Text being captured for one field of the open entry.
struct OpenField {
    key: &'static str,
    depth: usize,
    text: String,
}

/// Entry element currently being read.
struct OpenEntry {
    depth: usize,
    entry: RawEntry,
    field: Option<OpenField>,
}

impl OpenEntry {
    fn assign(&mut self, key: &'static str, value: String) {
        let slot = match &mut self.entry {
            RawEntry::Rss(item) => match key {
                "title" => &mut item.title,
                "link" => &mut item.link,
                "description" => &mut item.description,
                "guid" => &mut item.guid,
                "pubDate" => &mut item.pub_date,
                _ => return,
            },
            RawEntry::Atom(entry) => match key {
                "title" => &mut entry.title,
                "id" => &mut entry.id,
                "summary" => &mut entry.summary,
                "content" => &mut entry.content,
                "updated" => &mut entry.updated,
                "published" => &mut entry.published,
                _ => return,
            },
            RawEntry::Json(_) => return,
        };
        // First non-blank occurrence wins when an element is repeated.
        if slot.trim().is_empty() {
            *slot = value;
        }
    }

    fn push_link(&mut self, link: AtomLink) {
        if let RawEntry::Atom(entry) = &mut self.entry {
            entry.links.push(link);
        }
    }
}

/// Walks XML events for one document family and gathers its entries.
struct EntryCollector {
    format: FeedFormat,
    current: Option<OpenEntry>,
    entries: Vec<RawEntry>,
}

impl EntryCollector {
    fn for_root(root: &BytesStart<'_>) -> Result<Self, DecodeError> {
        let local = root.local_name();
        let name = String::from_utf8_lossy(local.as_ref());
        let format = match name.to_ascii_lowercase().as_str() {
            "rss" | "rdf" => FeedFormat::Rss,
            "feed" => FeedFormat::Atom,
            _ => return Err(DecodeError::UnsupportedFormat(name.into_owned())),
        };
        Ok(Self {
            format,
            current: None,
            entries: Vec::new(),
        })
    }

    fn entry_element(&self) -> &'static [u8] {
        match self.format {
            FeedFormat::Atom => &b"entry"[..],
            _ => &b"item"[..],
        }
    }

    fn field_key(&self, local: &[u8]) -> Option<&'static str> {
        let key = match (self.format, local) {
            (FeedFormat::Rss, b"title") => "title",
            (FeedFormat::Rss, b"link") => "link",
            (FeedFormat::Rss, b"description") => "description",
            (FeedFormat::Rss, b"guid") => "guid",
            (FeedFormat::Rss, b"pubDate") => "pubDate",
            (FeedFormat::Atom, b"title") => "title",
            (FeedFormat::Atom, b"id") => "id",
            (FeedFormat::Atom, b"summary") => "summary",
            (FeedFormat::Atom, b"content") => "content",
            (FeedFormat::Atom, b"updated") => "updated",
            (FeedFormat::Atom, b"published") => "published",
            _ => return None,
        };
        Some(key)
    }

    fn new_entry(&self, depth: usize) -> OpenEntry {
        let entry = match self.format {
            FeedFormat::Atom => RawEntry::Atom(AtomEntry::default()),
            _ => RawEntry::Rss(RssEntry::default()),
        };
        OpenEntry {
            depth,
            entry,
            field: None,
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, depth: usize, reader: &Reader<&[u8]>) {
        let local = e.local_name();

        let Some(open) = self.current.as_ref() else {
            if is_unprefixed(e) && local.as_ref() == self.entry_element() {
                self.current = Some(self.new_entry(depth));
            }
            return;
        };

        // Markup nested inside a field only contributes its text.
        if open.field.is_some() || depth != open.depth + 1 || !is_unprefixed(e) {
            return;
        }

        if self.format == FeedFormat::Atom && local.as_ref() == b"link" {
            let link = atom_link(e, reader);
            if let Some(open) = self.current.as_mut() {
                open.push_link(link);
            }
            return;
        }

        if let Some(key) = self.field_key(local.as_ref()) {
            if let Some(open) = self.current.as_mut() {
                open.field = Some(OpenField {
                    key,
                    depth,
                    text: String::new(),
                });
            }
        }
    }

    /// Self-closing element at `depth`. An empty entry still counts as one;
    /// inside an entry only Atom `<link/>` carries data.
    fn empty(&mut self, e: &BytesStart<'_>, depth: usize, reader: &Reader<&[u8]>) {
        if !is_unprefixed(e) {
            return;
        }
        if self.current.is_none() {
            if e.local_name().as_ref() == self.entry_element() {
                let done = self.new_entry(depth);
                self.entries.push(done.entry);
            }
            return;
        }
        if self.format != FeedFormat::Atom {
            return;
        }
        if e.local_name().as_ref() != b"link" {
            return;
        }
        let link = atom_link(e, reader);
        if let Some(open) = self.current.as_mut() {
            if open.field.is_none() && depth == open.depth + 1 {
                open.push_link(link);
            }
        }
    }

    fn text(&mut self, text: &str) {
        let Some(field) = self.current.as_mut().and_then(|o| o.field.as_mut()) else {
            return;
        };
        field.text.push_str(text);
    }

    fn close(&mut self, depth: usize) {
        let Some(open) = self.current.as_mut() else {
            return;
        };

        if open.field.as_ref().is_some_and(|f| f.depth == depth) {
            if let Some(field) = open.field.take() {
                open.assign(field.key, field.text);
            }
            return;
        }

        if open.depth == depth {
            if let Some(done) = self.current.take() {
                self.entries.push(done.entry);
            }
        }
    }

    fn finish(self) -> DecodedFeed {
        DecodedFeed {
            format: self.format,
            entries: self.entries,
        }
    }
}

fn atom_link(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> AtomLink {
    let mut link = AtomLink::default();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed Atom link attribute");
                continue;
            }
        };
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(value) => value.into_owned(),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable Atom link attribute");
                continue;
            }
        };
        match attr.key.local_name().as_ref() {
            b"href" => link.href = value,
            b"rel" => link.rel = value,
            _ => {}
        }
    }
    link
}
