//! Feed fetching, RSS/Atom classification, field extraction and the
//! shared text-normalization / best-image-selection helpers.

use std::sync::OnceLock;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use regex::Regex;
use reqwest::Client;

use crate::error::{Error, Result};

const MAX_FEED_BYTES: u64 = 10 * 1024 * 1024;
const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

fn tag_strip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FeedKind {
    Rss,
    Atom,
}

/// A feed fetched and parsed into our own shape, independent of which
/// wire format it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub name: Option<String>,
    pub home_url: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

/// Fetches `feed_url`, follows redirects, classifies the document as
/// RSS or Atom, and extracts feed + item fields. Returns `None` on any
/// non-2xx response, network failure, or parse failure per spec — the
/// caller treats all three identically. Never propagates a parse/fetch
/// error; those are logged here and folded into `None`.
pub async fn parse(client: &Client, feed_url: &str) -> Option<(String, ParsedFeed)> {
    match fetch_and_parse(client, feed_url).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(feed_url, %err, "feed fetch or parse failed");
            None
        }
    }
}

async fn fetch_and_parse(client: &Client, feed_url: &str) -> Result<Option<(String, ParsedFeed)>> {
    let response = match client.get(feed_url).send().await {
        Ok(resp) => resp,
        Err(err) => return Err(Error::Network(err)),
    };

    if !response.status().is_success() {
        return Ok(None);
    }

    let final_url = response.url().to_string();
    let body = read_capped(response).await?;
    let text = String::from_utf8_lossy(&body);

    let parsed = match detect_kind(&text) {
        FeedKind::Atom => parse_atom(&text)?,
        FeedKind::Rss => match parse_rss(&text) {
            Ok(feed) => feed,
            // Fall back to Atom in case detection guessed wrong on an
            // unusual document (matches the teacher's try-RSS-then-Atom
            // fallback, generalized to either direction of mis-detection).
            Err(rss_err) => parse_atom(&text).map_err(|_| rss_err)?,
        },
    };

    Ok(Some((final_url, parsed)))
}

async fn read_capped(response: reqwest::Response) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buf.len() as u64 + chunk.len() as u64 > MAX_FEED_BYTES {
            return Err(Error::TooLarge(MAX_FEED_BYTES));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn detect_kind(body: &str) -> FeedKind {
    if body.contains("<feed") && body.contains(ATOM_NAMESPACE) {
        FeedKind::Atom
    } else {
        FeedKind::Rss
    }
}

fn parse_rss(body: &str) -> Result<ParsedFeed> {
    let channel = rss::Channel::read_from(body.as_bytes())?;

    let image = channel
        .image()
        .map(|img| img.url().to_string())
        .filter(|s| !s.trim().is_empty());

    let items = channel
        .items()
        .iter()
        .filter_map(rss_item_to_parsed)
        .collect();

    Ok(ParsedFeed {
        name: normalize_text(channel.title()),
        home_url: non_empty(channel.link()),
        link: non_empty(channel.link()),
        image,
        items,
    })
}

fn rss_item_to_parsed(item: &rss::Item) -> Option<ParsedItem> {
    let url = non_empty(item.link().unwrap_or_default())?;

    let author = item
        .author()
        .map(ToOwned::to_owned)
        .or_else(|| {
            item.dublin_core_ext()
                .and_then(|dc| dc.creators().first().map(|s| s.to_string()))
        })
        .and_then(|s| non_empty(&s));

    let content = item
        .extensions()
        .get("content")
        .and_then(|m| m.get("encoded"))
        .and_then(|vals| vals.first())
        .and_then(|ext| ext.value.clone());

    let published = item.pub_date().and_then(parse_lenient_date);

    let image_url = best_image(rss_image_candidates(item));

    Some(ParsedItem {
        url,
        title: normalize_text(item.title().unwrap_or_default()),
        description: normalize_text(item.description().unwrap_or_default()),
        content,
        author,
        published,
        image_url,
    })
}

struct ImageCandidate {
    url: String,
    width: u32,
    height: u32,
}

fn rss_image_candidates(item: &rss::Item) -> Vec<ImageCandidate> {
    let mut candidates = Vec::new();

    if let Some(enclosure) = item.enclosure() {
        if enclosure.mime_type().starts_with("image") {
            candidates.push(ImageCandidate {
                url: enclosure.url().to_string(),
                width: 0,
                height: 0,
            });
        }
    }

    for key in ["content", "thumbnail"] {
        if let Some(exts) = item.extensions().get("media").and_then(|m| m.get(key)) {
            for ext in exts {
                if let Some(url) = ext.attrs.get("url") {
                    candidates.push(ImageCandidate {
                        url: url.clone(),
                        width: parse_dim(ext.attrs.get("width")),
                        height: parse_dim(ext.attrs.get("height")),
                    });
                }
            }
        }
    }

    candidates
}

fn parse_atom(body: &str) -> Result<ParsedFeed> {
    let feed = atom_syndication::Feed::read_from(body.as_bytes())?;

    let home_url = feed
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| feed.links().first())
        .map(|l| l.href().to_string());

    let image = non_empty(feed.icon().unwrap_or_default())
        .or_else(|| non_empty(feed.logo().unwrap_or_default()));

    let items = feed.entries().iter().filter_map(atom_entry_to_parsed).collect();

    Ok(ParsedFeed {
        name: normalize_text(feed.title().value.as_str()),
        home_url: home_url.clone(),
        link: home_url,
        image,
        items,
    })
}

fn atom_entry_to_parsed(entry: &atom_syndication::Entry) -> Option<ParsedItem> {
    let url = entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .map(|l| l.href().to_string())
        .and_then(|s| non_empty(&s))?;

    let author = entry
        .authors()
        .first()
        .map(|p| p.name.clone())
        .and_then(|s| non_empty(&s));

    let content = entry.content().and_then(|c| c.value.clone());

    let published = entry
        .published()
        .copied()
        .or_else(|| Some(*entry.updated()))
        .map(|dt| dt.with_timezone(&Utc));

    let image_url = best_image(atom_image_candidates(entry));

    Some(ParsedItem {
        url,
        title: normalize_text(entry.title().value.as_str()),
        description: entry.summary().map(|s| s.value.as_str()).and_then(normalize_text),
        content,
        author,
        published,
        image_url,
    })
}

fn atom_image_candidates(entry: &atom_syndication::Entry) -> Vec<ImageCandidate> {
    let mut candidates = Vec::new();

    if let Some(exts) = entry.extensions().get("media").and_then(|m| m.get("thumbnail")) {
        for ext in exts {
            if let Some(url) = ext.attrs.get("url") {
                candidates.push(ImageCandidate {
                    url: url.clone(),
                    width: parse_dim(ext.attrs.get("width")),
                    height: parse_dim(ext.attrs.get("height")),
                });
            }
        }
    }

    if let Some(exts) = entry.extensions().get("media").and_then(|m| m.get("content")) {
        for ext in exts {
            let is_image = ext
                .attrs
                .get("medium")
                .map(|m| m == "image")
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            if let Some(url) = ext.attrs.get("url") {
                candidates.push(ImageCandidate {
                    url: url.clone(),
                    width: parse_dim(ext.attrs.get("width")),
                    height: parse_dim(ext.attrs.get("height")),
                });
            }
        }
    }

    candidates
}

fn parse_dim(raw: Option<&String>) -> u32 {
    raw.and_then(|s| s.parse::<u32>().ok()).unwrap_or(0)
}

fn score(candidate: &ImageCandidate) -> u64 {
    if candidate.width > 0 && candidate.height > 0 {
        candidate.width as u64 * candidate.height as u64
    } else {
        candidate.width.max(candidate.height) as u64
    }
}

/// Picks the highest-scoring candidate, discovery order breaking ties
/// (first occurrence wins on an exact score tie, since we only replace
/// the running winner on a *strictly greater* score).
fn best_image(candidates: Vec<ImageCandidate>) -> Option<String> {
    let mut winner: Option<(u64, String)> = None;
    for candidate in candidates {
        let s = score(&candidate);
        match &winner {
            Some((best_score, _)) if s <= *best_score => {}
            _ => winner = Some((s, candidate.url)),
        }
    }
    winner.map(|(_, url)| url)
}

/// `entity-decode -> strip tags -> entity-decode -> collapse whitespace
/// -> trim`, per spec. Empty/whitespace-only input becomes `None`.
pub fn normalize_text(input: &str) -> Option<String> {
    let decoded_once = html_escape::decode_html_entities(input);
    let stripped = tag_strip_regex().replace_all(&decoded_once, "");
    let decoded_twice = html_escape::decode_html_entities(&stripped);
    let collapsed = whitespace_regex().replace_all(&decoded_twice, " ");
    let trimmed = collapsed.trim();
    non_empty(trimmed)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_lenient_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}
