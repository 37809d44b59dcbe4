//! Turning a livestream URL or search query into a playable media URL.

use crate::error::CaptureError;
use serde::Deserialize;
use std::cmp::Ordering;
use std::process::Command;
use std::time::Duration;

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

/// What the user pointed a stream source at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    Url(String),
    Search(String),
}

impl SourceTarget {
    pub fn label(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Search(query) => query,
        }
    }
}

/// What to do when a broadcast offers no H.264 video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFallback {
    /// Use the best remaining playable format
    #[default]
    Any,
    /// Treat the broadcast as unresolvable
    Fail,
}

/// One entry of the `formats` list reported by yt-dlp.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamFormat {
    pub format_id: Option<String>,
    pub url: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub protocol: Option<String>,
    pub ext: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

impl StreamFormat {
    pub fn is_h264(&self) -> bool {
        let vcodec = self.vcodec.as_deref().unwrap_or_default().to_lowercase();
        vcodec.contains("avc") || vcodec.contains("h264")
    }

    pub fn is_hls(&self) -> bool {
        let protocol = self.protocol.as_deref().unwrap_or_default().to_lowercase();
        let ext = self.ext.as_deref().unwrap_or_default().to_lowercase();
        protocol.contains("m3u8") || ext == "m3u8"
    }

    /// Has a URL and a real video track (storyboards and audio-only
    /// entries are not playable).
    pub fn is_playable(&self) -> bool {
        let has_video = matches!(self.vcodec.as_deref(), Some(v) if !v.is_empty() && v != "none");
        let storyboard = self.protocol.as_deref() == Some("mhtml");
        has_video && !storyboard && self.url.is_some()
    }

    fn rank(&self, other: &Self) -> Ordering {
        self.height
            .unwrap_or(0)
            .cmp(&other.height.unwrap_or(0))
            .then_with(|| self.fps.unwrap_or(0.0).total_cmp(&other.fps.unwrap_or(0.0)))
            .then_with(|| self.is_hls().cmp(&other.is_hls()))
    }
}

/// The parts of `yt-dlp -J` output we use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    pub title: Option<String>,
    pub is_live: Option<bool>,
    #[serde(default)]
    pub formats: Vec<StreamFormat>,
    /// yt-dlp's own pick, reported at the top level
    #[serde(flatten)]
    pub selected: StreamFormat,
}

/// A playable media URL for one broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub watch_url: String,
    pub media_url: String,
    pub format: StreamFormat,
}

/// Choose the media URL to decode from: H.264 first, then by height, frame
/// rate and HLS delivery.
pub fn choose_format(
    watch_url: &str,
    info: &VideoInfo,
    fallback: FormatFallback,
) -> Result<ResolvedStream, CaptureError> {
    if info.is_live == Some(false) {
        return Err(CaptureError::ResolutionFailed(format!(
            "{watch_url} is not a live broadcast"
        )));
    }

    let candidates = if info.formats.is_empty() {
        std::slice::from_ref(&info.selected)
    } else {
        info.formats.as_slice()
    };
    let playable = candidates.iter().filter(|f| f.is_playable());

    let best_h264 = playable.clone().filter(|f| f.is_h264()).max_by(|a, b| a.rank(b));
    let chosen = match (best_h264, fallback) {
        (Some(format), _) => Some(format),
        (None, FormatFallback::Fail) => {
            return Err(CaptureError::ResolutionFailed(format!(
                "{watch_url} offers no H.264 format"
            )))
        }
        (None, FormatFallback::Any) => playable
            .max_by(|a, b| a.rank(b))
            .or_else(|| info.selected.url.as_ref().map(|_| &info.selected)),
    };

    let format = chosen.ok_or_else(|| {
        CaptureError::ResolutionFailed(format!("{watch_url} offers no playable format"))
    })?;
    let media_url = format.url.clone().ok_or_else(|| {
        CaptureError::ResolutionFailed(format!("{watch_url}: chosen format has no URL"))
    })?;

    Ok(ResolvedStream {
        watch_url: watch_url.to_string(),
        media_url,
        format: format.clone(),
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

fn first_watch_url(response: SearchResponse, query: &str) -> Result<String, CaptureError> {
    response
        .items
        .into_iter()
        .find_map(|item| item.id.video_id)
        .map(|id| format!("https://www.youtube.com/watch?v={id}"))
        .ok_or_else(|| CaptureError::ResolutionFailed(format!("no live results for '{query}'")))
}

/// Locates broadcasts and lists their formats.
pub trait BroadcastResolver {
    /// Find a live broadcast for `query` and return its watch URL.
    fn search(&self, query: &str) -> Result<String, CaptureError>;

    /// List the formats a broadcast currently offers.
    fn video_info(&self, watch_url: &str) -> Result<VideoInfo, CaptureError>;
}

/// YouTube Data API search plus `yt-dlp` format listing.
pub struct YtDlpResolver {
    program: String,
    api_key: Option<String>,
    http: reqwest::blocking::Client,
}

impl YtDlpResolver {
    pub fn new(
        program: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CaptureError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptureError::ConfigInvalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            program: program.into(),
            api_key,
            http,
        })
    }
}

impl BroadcastResolver for YtDlpResolver {
    fn search(&self, query: &str) -> Result<String, CaptureError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            CaptureError::ConfigInvalid("YOUTUBE_API_KEY is required for search".into())
        })?;

        tracing::info!(query, "Searching YouTube for a live broadcast");
        let response: SearchResponse = self
            .http
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("eventType", "live"),
                ("maxResults", "1"),
                ("key", key),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| CaptureError::ResolutionFailed(format!("search failed: {e}")))?;

        first_watch_url(response, query)
    }

    fn video_info(&self, watch_url: &str) -> Result<VideoInfo, CaptureError> {
        let output = Command::new(&self.program)
            .args(["-J", "--no-warnings", "--no-playlist", watch_url])
            .output()
            .map_err(|e| {
                CaptureError::ResolutionFailed(format!("failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::ResolutionFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            CaptureError::ResolutionFailed(format!("unreadable {} output: {e}", self.program))
        })
    }
}
