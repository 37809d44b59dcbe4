//! Snapshot names and partitions.
//!
//! Names are `{prefix}_snapshot_{YYYYMMDD}_{HHMMSS}.{ext}` in local time;
//! partitions are filesystem-safe directory names derived from the source.

use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::LazyLock;

const MAX_PARTITION_LEN: usize = 64;

static UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid pattern"));

/// Which kind of source produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Browser-rendered webcam page
    Webcam,
    /// Livestream decoded frame by frame
    YouTube,
}

impl SourceKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Webcam => "webcam",
            Self::YouTube => "youtube",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Webcam => "png",
            Self::YouTube => "jpg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Webcam => "image/png",
            Self::YouTube => "image/jpeg",
        }
    }
}

/// An encoded image ready for delivery. Built once per slot; the name is
/// fixed at capture time and reused across delivery retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub kind: SourceKind,
    pub name: String,
    pub partition: Option<String>,
    pub bytes: Vec<u8>,
}

impl Snapshot {
    pub fn new(
        kind: SourceKind,
        partition: Option<String>,
        taken_at: &DateTime<Local>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            name: snapshot_name(kind, taken_at),
            partition,
            bytes,
        }
    }

    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }
}

pub fn snapshot_name(kind: SourceKind, taken_at: &DateTime<Local>) -> String {
    format!(
        "{}_snapshot_{}.{}",
        kind.prefix(),
        taken_at.format("%Y%m%d_%H%M%S"),
        kind.extension()
    )
}

/// Directory name for a source URL: host and path, with every run of unsafe
/// characters collapsed to `_`, at most 64 characters.
pub fn partition_for_url(url: &str) -> String {
    let (netloc, path) = match url.split_once("://") {
        Some((_, rest)) => {
            let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
            let (netloc, tail) = rest.split_at(end);
            (netloc, strip_query(tail))
        }
        None => ("", strip_query(url)),
    };

    let joined = format!("{netloc}{path}");
    let trimmed = joined.trim_matches('/');
    let raw = if !trimmed.is_empty() {
        trimmed
    } else if !netloc.is_empty() {
        netloc
    } else {
        "source"
    };

    sanitize(raw)
}

/// Directory name for a search-resolved source.
pub fn partition_for_query(query: &str) -> String {
    sanitize(&format!("youtube_{}", query.trim()))
}

fn strip_query(s: &str) -> &str {
    let end = s.find(['?', '#']).unwrap_or(s.len());
    &s[..end]
}

fn sanitize(raw: &str) -> String {
    let mut name = UNSAFE_RUN.replace_all(raw, "_").into_owned();
    // Only ASCII survives the substitution, so byte truncation is safe.
    name.truncate(MAX_PARTITION_LEN);
    if name.is_empty() {
        "source".to_string()
    } else {
        name
    }
}

/// Make partitions unique by suffixing repeats with `_2`, `_3`, ... in
/// configuration order.
pub fn disambiguate(partitions: &mut [String]) {
    let mut seen: Vec<String> = Vec::with_capacity(partitions.len());
    for partition in partitions.iter_mut() {
        if seen.contains(partition) {
            let mut n = 2;
            while seen.contains(&format!("{partition}_{n}")) {
                n += 1;
            }
            *partition = format!("{partition}_{n}");
        }
        seen.push(partition.clone());
    }
}
