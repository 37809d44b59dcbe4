//! Command-line arguments, the optional `camsnap.toml` file, and the merged
//! [`Settings`] the rest of the program runs from.
//!
//! Precedence is command line, then file, then built-in defaults. Sources
//! given on the command line replace the file's source list entirely.

use crate::capture::{FormatFallback, PageOptions, SourceTarget};
use crate::error::CaptureError;
use crate::lifecycle::RecyclePolicy;
use crate::naming::{disambiguate, partition_for_query, partition_for_url};
use crate::retry::RetryPolicy;
use crate::runner::RunSettings;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "camsnap.toml";
const DEFAULT_OUTPUT_DIR: &str = "images";
const DEFAULT_REGION: &str = "us-east-2";

/// Snapshot names carry whole seconds, so a source must not be visited more
/// often than this.
const MIN_SOURCE_SPACING_SECS: f64 = 1.0;
/// Upper bound for the interval and every single wait.
const MAX_WAIT_SECS: u64 = 24 * 60 * 60;
/// Upper bound for the run budget and session ages.
const MAX_SPAN_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Webcam page to capture; repeat for several pages
    #[arg(long = "webcam", value_name = "URL")]
    pub webcams: Vec<String>,

    /// YouTube livestream to capture; repeat for several streams
    #[arg(long = "youtube", value_name = "URL")]
    pub youtube: Vec<String>,

    /// Find the livestream with a YouTube search instead of a URL
    #[arg(long, value_name = "QUERY")]
    pub youtube_search: Option<String>,

    /// Seconds between consecutive snapshots, across all sources [default: 5]
    #[arg(long, value_name = "SECS")]
    pub interval: Option<f64>,

    /// Total run time in seconds, 0 runs until interrupted [default: 0]
    #[arg(long, value_name = "SECS")]
    pub max_runtime: Option<u64>,

    /// Directory for local snapshots [default: images]
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Upload snapshots to this S3 bucket instead of writing them locally
    #[arg(long, value_name = "BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix for uploads [default: webcam or youtube]
    #[arg(long, value_name = "PREFIX")]
    pub s3_prefix: Option<String>,

    /// AWS region of the bucket [default: us-east-2]
    #[arg(long, value_name = "REGION")]
    pub aws_region: Option<String>,

    /// Scale factor for webcam page captures [default: 1.0]
    #[arg(long)]
    pub zoom: Option<f64>,

    /// Seconds to let a webcam page's player start after loading [default: 15]
    #[arg(long, value_name = "SECS")]
    pub settle_secs: Option<u64>,

    /// Timeout in seconds for page loads and stream reads [default: 30]
    #[arg(long, value_name = "SECS")]
    pub page_timeout_secs: Option<u64>,

    /// Recycle browser sessions after this many hours [default: 12]
    #[arg(long, value_name = "HOURS")]
    pub max_session_age_hours: Option<u64>,

    /// Re-resolve stream URLs after this many minutes [default: 300]
    #[arg(long, value_name = "MINS")]
    pub stream_max_age_minutes: Option<u64>,

    /// Recycle a session after this many consecutive failed captures [default: 3]
    #[arg(long)]
    pub max_failures: Option<u32>,

    /// Attempts per snapshot, including the first [default: 3]
    #[arg(long)]
    pub retries: Option<u32>,

    /// First retry delay in milliseconds, doubled on each retry [default: 2000]
    #[arg(long, value_name = "MS")]
    pub backoff_base_ms: Option<u64>,

    /// Longest retry delay in milliseconds [default: 30000]
    #[arg(long, value_name = "MS")]
    pub backoff_max_ms: Option<u64>,

    /// Largest random delay added to each retry in milliseconds [default: 1000]
    #[arg(long, value_name = "MS")]
    pub jitter_ms: Option<u64>,

    /// What to do when a stream has no H.264 format [default: any]
    #[arg(long, value_enum)]
    pub format_fallback: Option<FormatFallback>,

    /// YouTube Data API key, needed for --youtube-search
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub youtube_api_key: Option<String>,

    /// yt-dlp executable used to list stream formats [default: yt-dlp]
    #[arg(long, value_name = "PATH")]
    pub yt_dlp: Option<String>,

    /// Config file [default: ./camsnap.toml when present]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also append the log to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Contents of a `camsnap.toml` file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub interval: Option<f64>,
    pub max_runtime: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub aws_region: Option<String>,
    pub zoom: Option<f64>,
    pub settle_secs: Option<u64>,
    pub page_timeout_secs: Option<u64>,
    pub max_session_age_hours: Option<u64>,
    pub stream_max_age_minutes: Option<u64>,
    pub max_failures: Option<u32>,
    pub retries: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub format_fallback: Option<FormatFallback>,
    pub youtube_api_key: Option<String>,
    pub yt_dlp: Option<String>,
    pub sources: Vec<SourceEntry>,
}

/// One `[[sources]]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceEntry {
    Webcam {
        url: String,
        zoom: Option<f64>,
    },
    Youtube {
        url: Option<String>,
        query: Option<String>,
    },
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CaptureError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, CaptureError> {
        toml::from_str(contents)
            .map_err(|e| CaptureError::ConfigInvalid(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    Webcam { url: String, zoom: f64 },
    Stream(SourceTarget),
}

impl SourceSpec {
    pub fn label(&self) -> &str {
        match self {
            Self::Webcam { url, .. } => url,
            Self::Stream(target) => target.label(),
        }
    }

    fn partition(&self) -> String {
        match self {
            Self::Webcam { url, .. } | Self::Stream(SourceTarget::Url(url)) => partition_for_url(url),
            Self::Stream(SourceTarget::Search(query)) => partition_for_query(query),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputSpec {
    Local {
        dir: PathBuf,
    },
    S3 {
        bucket: String,
        prefix: Option<String>,
        region: String,
    },
}

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sources: Vec<SourceSpec>,
    pub output: OutputSpec,
    pub run: RunSettings,
    /// Page options shared by webcam sources; zoom is per source
    pub page: PageOptions,
    pub page_policy: RecyclePolicy,
    pub stream_policy: RecyclePolicy,
    pub stream_timeout: Duration,
    pub format_fallback: FormatFallback,
    pub youtube_api_key: Option<String>,
    pub yt_dlp: String,
    /// File the settings were read from, if any
    pub config_file: Option<PathBuf>,
}

impl Settings {
    /// Merge `args` with the config file (explicit `--config`, or
    /// `camsnap.toml` in the working directory) and validate the result.
    pub fn load(args: &Args) -> Result<Self, CaptureError> {
        let path = match &args.config {
            Some(path) if !path.exists() => {
                return Err(CaptureError::ConfigInvalid(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            Some(path) => Some(path.clone()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        let file = match &path {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };

        let mut settings = Self::resolve(args, file)?;
        settings.config_file = path;
        Ok(settings)
    }

    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self, CaptureError> {
        let zoom = args.zoom.or(file.zoom).unwrap_or(1.0);
        check(zoom.is_finite() && zoom > 0.0, "zoom must be greater than 0")?;

        let sources = if has_cli_sources(args) {
            cli_sources(args, zoom)
        } else {
            file_sources(&file.sources, zoom)?
        };
        check(!sources.is_empty(), "no sources configured; use --webcam, --youtube or --youtube-search")?;

        let interval = args.interval.or(file.interval).unwrap_or(5.0);
        check(interval.is_finite() && interval > 0.0, "interval must be greater than 0")?;
        check(
            interval <= MAX_WAIT_SECS as f64,
            &format!("interval must not exceed {MAX_WAIT_SECS}s"),
        )?;
        // Each source takes every n-th slot; two of its snapshots in the same
        // second would share a name and the second would replace the first.
        check(
            interval * sources.len() as f64 >= MIN_SOURCE_SPACING_SECS,
            &format!(
                "interval of {interval}s with {} source(s) would capture a source more than once per second",
                sources.len()
            ),
        )?;

        let max_runtime = args.max_runtime.or(file.max_runtime).unwrap_or(0);
        check(
            max_runtime <= MAX_SPAN_SECS,
            &format!("max-runtime must not exceed {MAX_SPAN_SECS}s"),
        )?;

        let max_attempts = args.retries.or(file.retries).unwrap_or(3);
        check(max_attempts >= 1, "retries must be at least 1")?;

        let max_failures = args.max_failures.or(file.max_failures).unwrap_or(3);
        check(max_failures >= 1, "max-failures must be at least 1")?;

        let base_ms = args.backoff_base_ms.or(file.backoff_base_ms).unwrap_or(2_000);
        let max_ms = args.backoff_max_ms.or(file.backoff_max_ms).unwrap_or(30_000);
        check(
            base_ms <= max_ms,
            "backoff-base-ms must not exceed backoff-max-ms",
        )?;
        let jitter_ms = args.jitter_ms.or(file.jitter_ms).unwrap_or(1_000);
        check(
            max_ms <= MAX_WAIT_SECS * 1_000 && jitter_ms <= MAX_WAIT_SECS * 1_000,
            "backoff-max-ms and jitter-ms must not exceed one day",
        )?;

        let session_hours = args.max_session_age_hours.or(file.max_session_age_hours).unwrap_or(12);
        let stream_minutes = args.stream_max_age_minutes.or(file.stream_max_age_minutes).unwrap_or(300);
        check(
            session_hours > 0 && stream_minutes > 0,
            "session and stream max ages must be greater than 0",
        )?;
        let session_age = session_hours
            .checked_mul(60 * 60)
            .filter(|secs| *secs <= MAX_SPAN_SECS)
            .ok_or_else(|| CaptureError::ConfigInvalid("max-session-age-hours is too large".into()))?;
        let stream_age = stream_minutes
            .checked_mul(60)
            .filter(|secs| *secs <= MAX_SPAN_SECS)
            .ok_or_else(|| CaptureError::ConfigInvalid("stream-max-age-minutes is too large".into()))?;

        let timeout_secs = args.page_timeout_secs.or(file.page_timeout_secs).unwrap_or(30);
        let settle_secs = args.settle_secs.or(file.settle_secs).unwrap_or(15);
        check(
            timeout_secs <= MAX_WAIT_SECS && settle_secs <= MAX_WAIT_SECS,
            "page-timeout-secs and settle-secs must not exceed one day",
        )?;
        let timeout = Duration::from_secs(timeout_secs);
        let youtube_api_key = args
            .youtube_api_key
            .clone()
            .or(file.youtube_api_key)
            .filter(|key| !key.trim().is_empty());

        let needs_key = sources
            .iter()
            .any(|s| matches!(s, SourceSpec::Stream(SourceTarget::Search(_))));
        check(
            !needs_key || youtube_api_key.is_some(),
            "searching for a livestream needs a YouTube API key (--youtube-api-key or YOUTUBE_API_KEY)",
        )?;

        let output = match args.s3_bucket.clone().or(file.s3_bucket) {
            Some(bucket) => {
                check(!bucket.trim().is_empty(), "S3 bucket name must not be empty")?;
                OutputSpec::S3 {
                    bucket,
                    prefix: args.s3_prefix.clone().or(file.s3_prefix),
                    region: args
                        .aws_region
                        .clone()
                        .or(file.aws_region)
                        .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                }
            }
            None => OutputSpec::Local {
                dir: args
                    .output_dir
                    .clone()
                    .or(file.output_dir)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            },
        };

        Ok(Self {
            sources,
            output,
            run: RunSettings {
                interval: Duration::from_secs_f64(interval),
                budget: (max_runtime > 0).then(|| Duration::from_secs(max_runtime)),
                retry: RetryPolicy {
                    max_attempts,
                    base_delay: Duration::from_millis(base_ms),
                    max_delay: Duration::from_millis(max_ms),
                    jitter: Duration::from_millis(jitter_ms),
                },
            },
            page: PageOptions {
                zoom,
                settle: Duration::from_secs(settle_secs),
                load_timeout: timeout,
                ..PageOptions::default()
            },
            page_policy: RecyclePolicy {
                max_age: Duration::from_secs(session_age),
                max_failures,
            },
            stream_policy: RecyclePolicy {
                max_age: Duration::from_secs(stream_age),
                max_failures,
            },
            stream_timeout: timeout,
            format_fallback: args.format_fallback.or(file.format_fallback).unwrap_or_default(),
            youtube_api_key,
            yt_dlp: args
                .yt_dlp
                .clone()
                .or(file.yt_dlp)
                .unwrap_or_else(|| "yt-dlp".to_string()),
            config_file: None,
        })
    }

    /// Partition for each source, in source order. Local output always
    /// groups by source; uploads only do when there is more than one source.
    pub fn partitions(&self) -> Vec<Option<String>> {
        let partitioned = match self.output {
            OutputSpec::Local { .. } => true,
            OutputSpec::S3 { .. } => self.sources.len() > 1,
        };
        if !partitioned {
            return vec![None; self.sources.len()];
        }

        let mut names: Vec<String> = self.sources.iter().map(SourceSpec::partition).collect();
        disambiguate(&mut names);
        names.into_iter().map(Some).collect()
    }
}

fn check(condition: bool, message: &str) -> Result<(), CaptureError> {
    if condition {
        Ok(())
    } else {
        Err(CaptureError::ConfigInvalid(message.to_string()))
    }
}

fn has_cli_sources(args: &Args) -> bool {
    !args.webcams.is_empty() || !args.youtube.is_empty() || args.youtube_search.is_some()
}

fn cli_sources(args: &Args, zoom: f64) -> Vec<SourceSpec> {
    let webcams = args.webcams.iter().map(|url| SourceSpec::Webcam {
        url: url.clone(),
        zoom,
    });
    let streams = args
        .youtube
        .iter()
        .map(|url| SourceSpec::Stream(SourceTarget::Url(url.clone())));
    let search = args
        .youtube_search
        .iter()
        .map(|query| SourceSpec::Stream(SourceTarget::Search(query.clone())));

    webcams.chain(streams).chain(search).collect()
}

fn file_sources(entries: &[SourceEntry], default_zoom: f64) -> Result<Vec<SourceSpec>, CaptureError> {
    entries
        .iter()
        .map(|entry| match entry {
            SourceEntry::Webcam { url, zoom } => {
                check(!url.trim().is_empty(), "webcam source needs a url")?;
                let zoom = zoom.unwrap_or(default_zoom);
                check(zoom.is_finite() && zoom > 0.0, "zoom must be greater than 0")?;
                Ok(SourceSpec::Webcam {
                    url: url.clone(),
                    zoom,
                })
            }
            SourceEntry::Youtube { url, query } => match (url, query) {
                (Some(url), None) => Ok(SourceSpec::Stream(SourceTarget::Url(url.clone()))),
                (None, Some(query)) => Ok(SourceSpec::Stream(SourceTarget::Search(query.clone()))),
                _ => Err(CaptureError::ConfigInvalid(
                    "youtube source needs exactly one of url or query".into(),
                )),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("camsnap").chain(argv.iter().copied())).unwrap()
    }

    fn file(toml: &str) -> FileConfig {
        FileConfig::parse(toml, Path::new("camsnap.toml")).unwrap()
    }

    fn invalid(result: Result<Settings, CaptureError>) -> String {
        match result {
            Err(CaptureError::ConfigInvalid(message)) => message,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn defaults_for_a_single_webcam() {
        let settings = Settings::resolve(&args(&["--webcam", "https://example.com/cam"]), FileConfig::default())
            .unwrap();

        assert_eq!(
            settings.sources,
            vec![SourceSpec::Webcam {
                url: "https://example.com/cam".into(),
                zoom: 1.0
            }]
        );
        assert_eq!(settings.output, OutputSpec::Local { dir: PathBuf::from("images") });
        assert_eq!(settings.run.interval, Duration::from_secs(5));
        assert_eq!(settings.run.budget, None);
        assert_eq!(settings.run.retry, RetryPolicy::default());
        assert_eq!(settings.page_policy, RecyclePolicy::default());
        assert_eq!(settings.stream_policy.max_age, Duration::from_secs(300 * 60));
        assert_eq!(settings.page.settle, Duration::from_secs(15));
        assert_eq!(settings.format_fallback, FormatFallback::Any);
    }

    #[test]
    fn cli_overrides_file() {
        let file = file(
            r#"
            interval = 10.0
            max_runtime = 60
            s3_bucket = "snaps"
            retries = 5

            [[sources]]
            kind = "webcam"
            url = "https://file.example/cam"
            "#,
        );
        let settings = Settings::resolve(
            &args(&["--interval", "2.5", "--youtube", "https://www.youtube.com/watch?v=x"]),
            file,
        )
        .unwrap();

        assert_eq!(settings.run.interval, Duration::from_millis(2500));
        assert_eq!(settings.run.budget, Some(Duration::from_secs(60)));
        assert_eq!(settings.run.retry.max_attempts, 5);
        assert_eq!(
            settings.sources,
            vec![SourceSpec::Stream(SourceTarget::Url(
                "https://www.youtube.com/watch?v=x".into()
            ))]
        );
        assert_eq!(
            settings.output,
            OutputSpec::S3 {
                bucket: "snaps".into(),
                prefix: None,
                region: "us-east-2".into()
            }
        );
    }

    #[test]
    fn file_sources_with_per_source_zoom() {
        let file = file(
            r#"
            zoom = 2.0

            [[sources]]
            kind = "webcam"
            url = "https://a.example/cam"

            [[sources]]
            kind = "webcam"
            url = "https://b.example/cam"
            zoom = 0.5

            [[sources]]
            kind = "youtube"
            query = "maui live cam"
            "#,
        );
        let settings = Settings::resolve(&args(&["--youtube-api-key", "k"]), file).unwrap();

        assert_eq!(
            settings.sources,
            vec![
                SourceSpec::Webcam {
                    url: "https://a.example/cam".into(),
                    zoom: 2.0
                },
                SourceSpec::Webcam {
                    url: "https://b.example/cam".into(),
                    zoom: 0.5
                },
                SourceSpec::Stream(SourceTarget::Search("maui live cam".into())),
            ]
        );
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let err = FileConfig::parse("intervall = 3", Path::new("camsnap.toml")).unwrap_err();
        assert_eq!(err.kind(), "config_invalid");
    }

    #[test]
    fn validation_errors() {
        let none = invalid(Settings::resolve(&args(&[]), FileConfig::default()));
        assert!(none.contains("no sources"));

        let cam = ["--webcam", "https://example.com/cam"];
        let cases: &[(&[&str], &str)] = &[
            (&["--interval", "0"], "interval"),
            (&["--zoom", "0"], "zoom"),
            (&["--retries", "0"], "retries"),
            (&["--max-failures", "0"], "max-failures"),
            (&["--backoff-base-ms", "5000", "--backoff-max-ms", "100"], "backoff"),
            (&["--s3-bucket", " "], "bucket"),
        ];
        for (extra, needle) in cases {
            let argv: Vec<&str> = cam.iter().chain(extra.iter()).copied().collect();
            let message = invalid(Settings::resolve(&args(&argv), FileConfig::default()));
            assert!(message.contains(needle), "{message:?} should mention {needle}");
        }
    }

    #[test]
    fn interval_must_give_each_source_a_distinct_second() {
        let one = ["--webcam", "https://example.com/cam", "--interval", "0.2"];
        let message = invalid(Settings::resolve(&args(&one), FileConfig::default()));
        assert!(message.contains("more than once per second"), "{message:?}");

        // Five sources at 0.2s still visit each one every second.
        let five = [
            "--webcam", "https://a.example/cam",
            "--webcam", "https://b.example/cam",
            "--webcam", "https://c.example/cam",
            "--webcam", "https://d.example/cam",
            "--webcam", "https://e.example/cam",
            "--interval", "0.2",
        ];
        let settings = Settings::resolve(&args(&five), FileConfig::default()).unwrap();
        assert_eq!(settings.run.interval, Duration::from_millis(200));
    }

    #[test]
    fn oversized_time_settings_are_rejected() {
        let cam = ["--webcam", "https://example.com/cam"];
        let max = u64::MAX.to_string();
        let cases: Vec<(Vec<&str>, &str)> = vec![
            (vec!["--interval", "1e20"], "interval"),
            (vec!["--max-runtime", &max], "max-runtime"),
            (vec!["--max-session-age-hours", &max], "max-session-age-hours"),
            (vec!["--stream-max-age-minutes", &max], "stream-max-age-minutes"),
            (vec!["--backoff-max-ms", &max], "backoff-max-ms"),
            (vec!["--jitter-ms", &max], "jitter-ms"),
            (vec!["--settle-secs", &max], "settle-secs"),
            (vec!["--page-timeout-secs", &max], "page-timeout-secs"),
        ];
        for (extra, needle) in cases {
            let argv: Vec<&str> = cam.iter().copied().chain(extra).collect();
            let message = invalid(Settings::resolve(&args(&argv), FileConfig::default()));
            assert!(message.contains(needle), "{message:?} should mention {needle}");
        }

        // Ten years is still accepted.
        let settings = Settings::resolve(
            &args(&["--webcam", "https://example.com/cam", "--max-runtime", "315360000"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(settings.run.budget, Some(Duration::from_secs(MAX_SPAN_SECS)));
    }

    #[test]
    fn search_needs_api_key() {
        let message = invalid(Settings::resolve(
            &args(&["--youtube-search", "maui"]),
            FileConfig::default(),
        ));
        assert!(message.contains("API key"));
    }

    #[test]
    fn youtube_entry_needs_url_or_query() {
        let file = file(
            r#"
            [[sources]]
            kind = "youtube"
            "#,
        );
        let message = invalid(Settings::resolve(&args(&[]), file));
        assert!(message.contains("exactly one"));
    }

    #[test]
    fn partitions_depend_on_output_and_source_count() {
        let local = Settings::resolve(
            &args(&[
                "--youtube",
                "https://www.youtube.com/watch?v=a",
                "--youtube",
                "https://www.youtube.com/watch?v=b",
            ]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(
            local.partitions(),
            vec![
                Some("www.youtube.com_watch".to_string()),
                Some("www.youtube.com_watch_2".to_string()),
            ]
        );

        let single_remote = Settings::resolve(
            &args(&["--webcam", "https://example.com/cam", "--s3-bucket", "b"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(single_remote.partitions(), vec![None]);
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        let argv = ["--config", missing.to_str().unwrap()];
        let message = invalid(Settings::load(&args(&argv)));
        assert!(message.contains("not found"));
    }

    #[test]
    fn loads_explicit_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snap.toml");
        std::fs::write(
            &path,
            "format_fallback = \"fail\"\n[[sources]]\nkind = \"youtube\"\nurl = \"https://www.youtube.com/watch?v=z\"\n",
        )
        .unwrap();

        let settings = Settings::load(&args(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(settings.format_fallback, FormatFallback::Fail);
        assert_eq!(settings.config_file, Some(path));
    }
}
