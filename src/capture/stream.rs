use super::decode::{encode_jpeg, FrameDecoder};
use super::resolve::{choose_format, BroadcastResolver, FormatFallback, ResolvedStream, SourceTarget};
use crate::error::CaptureError;
use crate::lifecycle::SessionDriver;

const JPEG_QUALITY: u8 = 100;

/// Decodes one frame per capture from a resolved livestream URL.
///
/// The session is the resolved media URL itself. It is re-resolved whenever
/// the lifecycle recycles it, which includes every decode failure.
pub struct StreamDriver<R, D> {
    target: SourceTarget,
    resolver: R,
    decoder: D,
    fallback: FormatFallback,
    /// Watch URL found by the last search, reused until it stops resolving
    searched: Option<String>,
}

impl<R: BroadcastResolver, D: FrameDecoder> StreamDriver<R, D> {
    pub fn new(target: SourceTarget, resolver: R, decoder: D, fallback: FormatFallback) -> Self {
        Self {
            target,
            resolver,
            decoder,
            fallback,
            searched: None,
        }
    }

    fn resolve(&self, watch_url: &str) -> Result<ResolvedStream, CaptureError> {
        let info = self.resolver.video_info(watch_url)?;
        let resolved = choose_format(watch_url, &info, self.fallback)?;
        tracing::info!(
            watch_url,
            title = info.title.as_deref().unwrap_or_default(),
            "Chosen format: {}x{} @ {}fps | vcodec={} acodec={} prot={} ext={}",
            fmt_opt(resolved.format.width),
            fmt_opt(resolved.format.height),
            fmt_opt(resolved.format.fps),
            fmt_opt(resolved.format.vcodec.as_deref()),
            fmt_opt(resolved.format.acodec.as_deref()),
            fmt_opt(resolved.format.protocol.as_deref()),
            fmt_opt(resolved.format.ext.as_deref()),
        );
        Ok(resolved)
    }

    #[cfg(test)]
    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

impl<R: BroadcastResolver, D: FrameDecoder> SessionDriver for StreamDriver<R, D> {
    type Session = ResolvedStream;

    fn acquire(&mut self) -> Result<ResolvedStream, CaptureError> {
        let query = match &self.target {
            SourceTarget::Url(url) => return self.resolve(url),
            SourceTarget::Search(query) => query.clone(),
        };

        if let Some(watch_url) = self.searched.clone() {
            match self.resolve(&watch_url) {
                Ok(resolved) => return Ok(resolved),
                Err(e) => {
                    tracing::warn!(
                        query = %query,
                        watch_url = %watch_url,
                        "Cached broadcast no longer resolves ({}); searching again",
                        e
                    );
                    self.searched = None;
                }
            }
        }

        let watch_url = self.resolver.search(&query)?;
        tracing::info!(query = %query, watch_url = %watch_url, "Found live broadcast");
        let resolved = self.resolve(&watch_url)?;
        self.searched = Some(watch_url);
        Ok(resolved)
    }

    fn capture(&mut self, session: &mut ResolvedStream) -> Result<Vec<u8>, CaptureError> {
        tracing::debug!(watch_url = %session.watch_url, "Grabbing one frame");
        let frame = self.decoder.grab(&session.media_url)?;
        encode_jpeg(&frame, JPEG_QUALITY)
    }

    fn release(&mut self, _session: ResolvedStream) -> Result<(), CaptureError> {
        // Nothing stays open between captures.
        Ok(())
    }
}
