mod browser;
mod decode;
mod locate;
mod resolve;
mod stream;
mod warmup;

pub use browser::{BrowserDriver, PageOptions};
pub use decode::FfmpegDecoder;
pub use resolve::{FormatFallback, SourceTarget, YtDlpResolver};
pub use stream::StreamDriver;

use crate::error::CaptureError;
use crate::lifecycle::{Lifecycle, RecyclePolicy, SessionDriver};
use crate::naming::SourceKind;
use std::time::Instant;

/// Something that can produce one encoded still image on demand.
pub trait FrameSource {
    /// Human-readable identifier used in logs
    fn label(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Subdirectory or key segment the snapshots are grouped under
    fn partition(&self) -> Option<&str>;

    /// Make sure the underlying session is usable, recycling it if needed.
    fn ensure_fresh(&mut self, now: Instant) -> Result<u64, CaptureError>;

    /// Capture a single encoded image
    fn capture(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Release every resource held by the source
    fn shutdown(&mut self);
}

/// A frame source whose session is owned by a [`Lifecycle`].
pub struct ManagedSource<D: SessionDriver> {
    label: String,
    kind: SourceKind,
    partition: Option<String>,
    lifecycle: Lifecycle<D>,
}

impl<D: SessionDriver> ManagedSource<D> {
    pub fn new(
        label: impl Into<String>,
        kind: SourceKind,
        partition: Option<String>,
        driver: D,
        policy: RecyclePolicy,
    ) -> Self {
        let label = label.into();
        Self {
            lifecycle: Lifecycle::new(label.clone(), driver, policy),
            label,
            kind,
            partition,
        }
    }

    #[cfg(test)]
    pub fn lifecycle(&self) -> &Lifecycle<D> {
        &self.lifecycle
    }
}

impl<D: SessionDriver> FrameSource for ManagedSource<D> {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    fn ensure_fresh(&mut self, now: Instant) -> Result<u64, CaptureError> {
        self.lifecycle.ensure_fresh(now)
    }

    fn capture(&mut self) -> Result<Vec<u8>, CaptureError> {
        self.lifecycle.capture()
    }

    fn shutdown(&mut self) {
        self.lifecycle.shutdown();
    }
}

/// The capture strategies a run can be configured with.
pub enum Source {
    Page(ManagedSource<BrowserDriver>),
    Stream(ManagedSource<StreamDriver<YtDlpResolver, FfmpegDecoder>>),
}

impl FrameSource for Source {
    fn label(&self) -> &str {
        match self {
            Self::Page(s) => s.label(),
            Self::Stream(s) => s.label(),
        }
    }

    fn kind(&self) -> SourceKind {
        match self {
            Self::Page(s) => s.kind(),
            Self::Stream(s) => s.kind(),
        }
    }

    fn partition(&self) -> Option<&str> {
        match self {
            Self::Page(s) => s.partition(),
            Self::Stream(s) => s.partition(),
        }
    }

    fn ensure_fresh(&mut self, now: Instant) -> Result<u64, CaptureError> {
        match self {
            Self::Page(s) => s.ensure_fresh(now),
            Self::Stream(s) => s.ensure_fresh(now),
        }
    }

    fn capture(&mut self) -> Result<Vec<u8>, CaptureError> {
        match self {
            Self::Page(s) => s.capture(),
            Self::Stream(s) => s.capture(),
        }
    }

    fn shutdown(&mut self) {
        match self {
            Self::Page(s) => s.shutdown(),
            Self::Stream(s) => s.shutdown(),
        }
    }
}
