use feed_rs::parser;
use sha2::{Digest, Sha256};

/// One item of a fetched feed, normalised once at parse time.
///
/// `id` is resolved with a fixed fallback order so the same item yields the
/// same identifier on every poll:
///
/// 1. the feed-provided identifier (RSS `<guid>`, Atom `<id>`, JSON Feed `id`)
/// 2. the entry's first link
/// 3. `sha256(title + "\n" + link)` as lowercase hex
///
/// Values are trimmed before use; blank values count as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub link: Option<String>,
    /// Unix timestamp (seconds). Advisory only, never used for deduplication.
    pub published: Option<i64>,
}

/// Parse a feed document into entries, preserving document order
/// (newest first for practically every publisher).
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<Entry>, parser::ParseFeedError> {
    // feed-rs invents an id when the document has none; blank it so our own
    // fallback order decides instead.
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|href| !href.is_empty());
            let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default();
            let id = resolve_entry_id(Some(entry.id.as_str()), link.as_deref(), &title);

            Entry {
                id,
                title,
                link,
                published,
            }
        })
        .collect();

    Ok(entries)
}

/// Apply the identifier fallback order documented on [`Entry`].
pub fn resolve_entry_id(guid: Option<&str>, link: Option<&str>, title: &str) -> String {
    if let Some(guid) = guid.map(str::trim).filter(|g| !g.is_empty()) {
        return guid.to_string();
    }
    if let Some(link) = link.map(str::trim).filter(|l| !l.is_empty()) {
        return link.to_string();
    }

    let input = format!("{}\n{}", title, link.unwrap_or(""));
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
