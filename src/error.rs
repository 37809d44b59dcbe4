use thiserror::Error;

/// Everything that can go wrong while standing up a source, capturing a
/// frame or delivering a snapshot.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to acquire session: {0}")]
    AcquisitionFailed(String),

    #[error("failed to resolve live broadcast: {0}")]
    ResolutionFailed(String),

    #[error("no qualifying media element found on page")]
    ElementNotFound,

    #[error("failed to decode a frame: {0}")]
    DecodeFailed(String),

    #[error("session is unresponsive: {0}")]
    SessionDead(String),

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("delivery failed: {message}")]
    DeliveryFailed { message: String, transient: bool },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl CaptureError {
    pub fn delivery(message: impl Into<String>, transient: bool) -> Self {
        Self::DeliveryFailed {
            message: message.into(),
            transient,
        }
    }

    /// The current session is presumed unusable and must be replaced before
    /// the next capture.
    pub fn forces_recycle(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound | Self::DecodeFailed(_) | Self::SessionDead(_)
        )
    }

    /// Sink-side failure; the snapshot is retried in place and the source is
    /// left alone.
    pub fn is_delivery(&self) -> bool {
        matches!(self, Self::DeliveryFailed { .. })
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::DeliveryFailed { transient, .. } => *transient,
            Self::ConfigInvalid(_) => false,
            _ => true,
        }
    }

    /// Short stable name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AcquisitionFailed(_) => "acquisition_failed",
            Self::ResolutionFailed(_) => "resolution_failed",
            Self::ElementNotFound => "element_not_found",
            Self::DecodeFailed(_) => "decode_failed",
            Self::SessionDead(_) => "session_dead",
            Self::CaptureFailed(_) => "capture_failed",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::ConfigInvalid(_) => "config_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_errors_force_recycle() {
        assert!(CaptureError::ElementNotFound.forces_recycle());
        assert!(CaptureError::DecodeFailed("eof".into()).forces_recycle());
        assert!(CaptureError::SessionDead("gone".into()).forces_recycle());

        assert!(!CaptureError::CaptureFailed("timeout".into()).forces_recycle());
        assert!(!CaptureError::AcquisitionFailed("x".into()).forces_recycle());
        assert!(!CaptureError::delivery("503", true).forces_recycle());
    }

    #[test]
    fn only_sink_errors_are_delivery_errors() {
        assert!(CaptureError::delivery("disk full", false).is_delivery());
        assert!(!CaptureError::ElementNotFound.is_delivery());
    }

    #[test]
    fn delivery_transience_is_explicit() {
        assert!(CaptureError::delivery("503", true).is_transient());
        assert!(!CaptureError::delivery("403", false).is_transient());
        assert!(!CaptureError::ConfigInvalid("no sources".into()).is_transient());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(CaptureError::ElementNotFound.kind(), "element_not_found");
        assert_eq!(CaptureError::delivery("x", true).kind(), "delivery_failed");
    }
}
