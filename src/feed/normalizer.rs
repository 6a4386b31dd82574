//! Maps raw entries of every family onto [`CanonicalItem`].

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use super::types::{AtomEntry, CanonicalItem, JsonEntry, RawEntry, RssEntry};

/// Normalize one raw entry. Pure; never fails.
pub fn normalize(entry: &RawEntry) -> CanonicalItem {
    match entry {
        RawEntry::Rss(item) => normalize_rss(item),
        RawEntry::Atom(entry) => normalize_atom(entry),
        RawEntry::Json(item) => normalize_json(item),
    }
}

fn normalize_rss(item: &RssEntry) -> CanonicalItem {
    let link = item.link.trim().to_string();
    let dedupe_key = first_non_empty(&[item.guid.as_str(), link.as_str()]);
    CanonicalItem {
        title: item.title.trim().to_string(),
        summary: item.description.trim().to_string(),
        published_at: parse_timestamp(&item.pub_date),
        link,
        dedupe_key,
    }
}

fn normalize_atom(entry: &AtomEntry) -> CanonicalItem {
    let link = entry
        .links
        .iter()
        .find(|l| {
            let rel = l.rel.trim();
            rel.is_empty() || rel == "alternate"
        })
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
        .unwrap_or_else(|| entry.id.trim().to_string());

    let dedupe_key = first_non_empty(&[entry.id.as_str(), link.as_str()]);
    let published_at =
        parse_timestamp(&entry.published).or_else(|| parse_timestamp(&entry.updated));

    CanonicalItem {
        title: entry.title.trim().to_string(),
        summary: first_non_empty(&[entry.summary.as_str(), entry.content.as_str()]),
        link,
        dedupe_key,
        published_at,
    }
}

fn normalize_json(item: &JsonEntry) -> CanonicalItem {
    let link = first_non_empty(&[item.url.as_str(), item.external_url.as_str()]);
    let dedupe_key = first_non_empty(&[item.id.as_str(), link.as_str()]);
    let published_at =
        parse_timestamp(&item.date_published).or_else(|| parse_timestamp(&item.date_modified));

    CanonicalItem {
        title: item.title.trim().to_string(),
        summary: first_non_empty(&[
            item.summary.as_str(),
            item.content_text.as_str(),
            item.content_html.as_str(),
        ]),
        link,
        dedupe_key,
        published_at,
    }
}

/// First candidate that is non-empty after trimming, trimmed.
fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Timestamps
// ============================================================================

/// Numeric-offset layouts, tried after RFC 3339 and with any leading weekday
/// removed.
///
/// Two-digit-year layouts come first: `%Y` would happily read `06` as year 6.
const OFFSET_LAYOUTS: &[&str] = &[
    "%d %b %y %H:%M %z", // RFC 822 with numeric zone
    "%d %b %y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z", // RFC 1123 with numeric zone
];

/// Layouts whose zone is a trailing abbreviation such as `GMT` or `PST`.
const NAMED_ZONE_LAYOUTS: &[&str] = &[
    "%d %b %y %H:%M", // RFC 822
    "%d %b %y %H:%M:%S",
    "%d-%b-%y %H:%M:%S", // RFC 850
    "%d %b %Y %H:%M:%S", // RFC 1123
];

/// Parse a feed timestamp, returning UTC.
///
/// Accepts RFC 3339 (with or without fractional seconds), RFC 1123, RFC 822
/// and RFC 850, each with a numeric offset or a zone abbreviation. Returns
/// `None` when no layout matches; the item is still stored without a time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let body = strip_weekday(raw);

    for layout in OFFSET_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(body, layout) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let (rest, zone) = body.rsplit_once(' ')?;
    let offset = zone_offset(zone)?;
    for layout in NAMED_ZONE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(rest, layout) {
            return offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    None
}

/// Drop a leading `Mon, ` / `Monday, `. The weekday name is not checked
/// against the date.
fn strip_weekday(raw: &str) -> &str {
    match raw.split_once(',') {
        Some((day, rest)) if !day.is_empty() && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => raw,
    }
}

/// Offset for a trailing zone abbreviation. Alphabetic names we do not know
/// are read as UTC.
fn zone_offset(zone: &str) -> Option<FixedOffset> {
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let hours = match zone.to_ascii_uppercase().as_str() {
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    };
    FixedOffset::east_opt(hours * 3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::AtomLink;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_rss_uses_guid_then_link() {
        let item = RssEntry {
            title: "  Hello  ".into(),
            link: " https://example.com/1 ".into(),
            description: " body ".into(),
            guid: "  ".into(),
            pub_date: "Mon, 02 Jan 2006 15:04:05 -0700".into(),
        };
        let canonical = normalize(&RawEntry::Rss(item));
        assert_eq!(canonical.title, "Hello");
        assert_eq!(canonical.link, "https://example.com/1");
        assert_eq!(canonical.summary, "body");
        assert_eq!(canonical.dedupe_key, "https://example.com/1");
        assert_eq!(
            canonical.published_at,
            Some(utc("2006-01-02T15:04:05-07:00"))
        );
    }

    #[test]
    fn test_rss_without_guid_or_link_has_empty_key() {
        let item = RssEntry {
            title: "A".into(),
            ..Default::default()
        };
        let canonical = normalize(&RawEntry::Rss(item));
        assert_eq!(canonical.dedupe_key, "");
        assert_eq!(canonical.published_at, None);
    }

    #[test]
    fn test_atom_prefers_alternate_link() {
        let entry = AtomEntry {
            id: "urn:1".into(),
            links: vec![
                AtomLink {
                    href: "https://example.com/self".into(),
                    rel: "self".into(),
                },
                AtomLink {
                    href: "https://example.com/page".into(),
                    rel: "alternate".into(),
                },
            ],
            ..Default::default()
        };
        let canonical = normalize(&RawEntry::Atom(entry));
        assert_eq!(canonical.link, "https://example.com/page");
        assert_eq!(canonical.dedupe_key, "urn:1");
    }

    #[test]
    fn test_atom_link_falls_back_to_id() {
        let entry = AtomEntry {
            id: "https://example.com/by-id".into(),
            links: vec![AtomLink {
                href: "https://example.com/feed.xml".into(),
                rel: "self".into(),
            }],
            ..Default::default()
        };
        let canonical = normalize(&RawEntry::Atom(entry));
        assert_eq!(canonical.link, "https://example.com/by-id");
    }

    #[test]
    fn test_atom_empty_id_keys_on_link() {
        let entry = AtomEntry {
            links: vec![AtomLink {
                href: "https://x/1".into(),
                rel: String::new(),
            }],
            ..Default::default()
        };
        let canonical = normalize(&RawEntry::Atom(entry));
        assert_eq!(canonical.dedupe_key, "https://x/1");
    }

    #[test]
    fn test_atom_summary_and_time_fallbacks() {
        let entry = AtomEntry {
            id: "urn:2".into(),
            content: " full content ".into(),
            published: "not a date".into(),
            updated: "2025-03-04T05:06:07.123Z".into(),
            ..Default::default()
        };
        let canonical = normalize(&RawEntry::Atom(entry));
        assert_eq!(canonical.summary, "full content");
        assert_eq!(
            canonical.published_at,
            Some(utc("2025-03-04T05:06:07.123Z"))
        );
    }

    #[test]
    fn test_json_fallbacks() {
        let item = JsonEntry {
            id: String::new(),
            external_url: "https://elsewhere/1".into(),
            content_html: "<p>x</p>".into(),
            date_modified: "2024-01-02T00:00:00Z".into(),
            ..Default::default()
        };
        let canonical = normalize(&RawEntry::Json(item));
        assert_eq!(canonical.link, "https://elsewhere/1");
        assert_eq!(canonical.dedupe_key, "https://elsewhere/1");
        assert_eq!(canonical.summary, "<p>x</p>");
        assert_eq!(canonical.published_at, Some(utc("2024-01-02T00:00:00Z")));
    }

    #[test]
    fn test_json_summary_wins_over_content() {
        let item = JsonEntry {
            id: "7".into(),
            summary: "short".into(),
            content_text: "long".into(),
            ..Default::default()
        };
        let canonical = normalize(&RawEntry::Json(item));
        assert_eq!(canonical.summary, "short");
        assert_eq!(canonical.dedupe_key, "7");
    }

    #[test]
    fn test_parse_rfc3339_variants() {
        assert_eq!(
            parse_timestamp("2006-01-02T15:04:05Z"),
            Some(utc("2006-01-02T15:04:05Z"))
        );
        assert_eq!(
            parse_timestamp("2006-01-02T15:04:05.999999999+02:00"),
            Some(utc("2006-01-02T13:04:05.999999999Z"))
        );
    }

    #[test]
    fn test_parse_rfc1123_forms() {
        let expected = Some(utc("2006-01-02T22:04:05Z"));
        assert_eq!(parse_timestamp("Mon, 02 Jan 2006 15:04:05 -0700"), expected);
        assert_eq!(parse_timestamp("Mon, 2 Jan 2006 15:04:05 -0700"), expected);
        assert_eq!(parse_timestamp("Mon, 02 Jan 2006 15:04:05 MST"), expected);
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 GMT"),
            Some(utc("2006-01-02T15:04:05Z"))
        );
    }

    #[test]
    fn test_parse_rfc822_and_rfc850() {
        assert_eq!(
            parse_timestamp("02 Jan 06 15:04 -0700"),
            Some(utc("2006-01-02T22:04:00Z"))
        );
        assert_eq!(
            parse_timestamp("02 Jan 06 15:04 UTC"),
            Some(utc("2006-01-02T15:04:00Z"))
        );
        assert_eq!(
            parse_timestamp("Monday, 02-Jan-06 15:04:05 PST"),
            Some(utc("2006-01-02T23:04:05Z"))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2006-13-45"), None);
        assert_eq!(parse_timestamp("Mon, 02 Jan 2006 15:04:05 +99:99"), None);
    }

    proptest! {
        #[test]
        fn prop_parse_timestamp_never_panics(s in ".{0,64}") {
            let _ = parse_timestamp(&s);
        }

        #[test]
        fn prop_rfc3339_round_trips(secs in 0i64..4_102_444_800) {
            let dt = DateTime::from_timestamp(secs, 0).unwrap();
            prop_assert_eq!(parse_timestamp(&dt.to_rfc3339()), Some(dt));
        }

        #[test]
        fn prop_normalized_fields_are_trimmed(
            title in "\\s{0,3}[a-z]{0,8}\\s{0,3}",
            guid in "\\s{0,3}[a-z0-9]{0,8}\\s{0,3}",
        ) {
            let item = RssEntry { title: title.clone(), guid: guid.clone(), ..Default::default() };
            let canonical = normalize(&RawEntry::Rss(item));
            prop_assert_eq!(canonical.title, title.trim());
            prop_assert_eq!(canonical.dedupe_key, guid.trim());
        }
    }
}
